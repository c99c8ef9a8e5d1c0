use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use tracing::debug;

use crate::api::{EventMarketsKey, EventMarketsSource, PageSource};
use crate::controller::ListController;
use crate::error::FetchResult;
use crate::filter::FilterState;
use crate::query::QueryCache;
use crate::types::{Event, Market, Page, ResourceKind};

/// Markets nested under one event.
pub type NestedMarkets = FetchResult<Arc<Page<Market>>>;

/// Events listing with expandable per-event markets.
///
/// The date range belongs to the nested markets: changing it keeps the events
/// page where it is and only changes which markets an expanded event shows.
pub struct EventBrowser {
    pub list: ListController<Event>,
    markets: Arc<dyn EventMarketsSource>,
    nested: QueryCache<EventMarketsKey, Arc<Page<Market>>>,
}

impl EventBrowser {
    pub fn new(
        filter: FilterState,
        events: Arc<dyn PageSource<Event>>,
        markets: Arc<dyn EventMarketsSource>,
    ) -> Self {
        Self {
            list: ListController::new(ResourceKind::Events, filter, events),
            markets,
            nested: QueryCache::default(),
        }
    }

    pub fn set_date_range(&mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        self.list.apply_date_range(from, to);
    }

    fn nested_key(&self, event_ticker: &str) -> EventMarketsKey {
        let filter = self.list.filter();
        EventMarketsKey {
            event_ticker: event_ticker.to_string(),
            min_close_ts: filter.min_close_ts,
            max_close_ts: filter.max_close_ts,
        }
    }

    /// Markets under `event_ticker` within the current date range.
    ///
    /// The future does not borrow the browser.
    pub fn markets_for(&self, event_ticker: &str) -> BoxFuture<'static, NestedMarkets> {
        if event_ticker.is_empty() {
            return future::ready(Ok(Arc::new(Page::empty()))).boxed();
        }
        let key = self.nested_key(event_ticker);
        debug!("Loading markets for {event_ticker}");
        let nested = self.nested.clone();
        let source = Arc::clone(&self.markets);
        async move {
            let request = key.clone();
            nested
                .get_or_fetch(key, move || {
                    let fut = source.markets_by_event(&request);
                    async move { fut.await.map(Arc::new) }
                })
                .await
        }
        .boxed()
    }

    /// Event at `row` on the current page.
    pub fn event_at(&self, row: usize) -> Option<&Event> {
        self.list.current()?.items.get(row)
    }

    /// Drop cached nested markets so the next expansion refetches.
    pub fn refresh_nested(&self) {
        self.nested.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchKey;
    use crate::error::FetchError;
    use parking_lot::Mutex;

    struct Events;

    impl PageSource<Event> for Events {
        fn fetch_page(&self, _key: &FetchKey) -> BoxFuture<'static, FetchResult<Page<Event>>> {
            let events = ["E1", "E2"]
                .iter()
                .map(|t| Event {
                    event_ticker: t.to_string(),
                    title: format!("Event {t}"),
                    ..Default::default()
                })
                .collect();
            async move {
                Ok(Page {
                    items: events,
                    cursor: "next".to_string(),
                })
            }
            .boxed()
        }
    }

    #[derive(Default)]
    struct Nested {
        requests: Mutex<Vec<EventMarketsKey>>,
    }

    impl EventMarketsSource for Nested {
        fn markets_by_event(
            &self,
            key: &EventMarketsKey,
        ) -> BoxFuture<'static, FetchResult<Page<Market>>> {
            self.requests.lock().push(key.clone());
            let result = if key.event_ticker == "E2" {
                Err(FetchError::Http {
                    status: 500,
                    message: "Failed to fetch markets for event".to_string(),
                })
            } else {
                Ok(Page {
                    items: vec![Market {
                        ticker: format!("{}-M", key.event_ticker),
                        ..Default::default()
                    }],
                    cursor: String::new(),
                })
            };
            async move { result }.boxed()
        }
    }

    fn browser(nested: &Arc<Nested>) -> EventBrowser {
        let filter = FilterState {
            limit: 10,
            min_close_ts: Some(100),
            max_close_ts: Some(200),
        };
        EventBrowser::new(
            filter,
            Arc::new(Events),
            Arc::clone(nested) as Arc<dyn EventMarketsSource>,
        )
    }

    #[tokio::test]
    async fn nested_markets_use_date_range() {
        let nested = Arc::new(Nested::default());
        let mut b = browser(&nested);
        b.list.load().await;

        let event = b.event_at(0).unwrap();
        assert_eq!(event.event_ticker, "E1");
        let markets = b.markets_for(&event.event_ticker).await;
        assert_eq!(markets.unwrap().items[0].ticker, "E1-M");
        let req = nested.requests.lock()[0].clone();
        assert_eq!((req.min_close_ts, req.max_close_ts), (Some(100), Some(200)));
    }

    #[tokio::test]
    async fn nested_markets_cached_per_range() {
        let nested = Arc::new(Nested::default());
        let mut b = browser(&nested);
        b.list.load().await;

        b.markets_for("E1").await.unwrap();
        b.markets_for("E1").await.unwrap();
        assert_eq!(nested.requests.lock().len(), 1);

        b.set_date_range(DateTime::from_timestamp(150, 0), None);
        b.markets_for("E1").await.unwrap();
        assert_eq!(nested.requests.lock().len(), 2);
        assert_eq!(b.list.page_index(), 0);
    }

    #[tokio::test]
    async fn nested_failure_surfaces() {
        let nested = Arc::new(Nested::default());
        let mut b = browser(&nested);
        b.list.load().await;

        let event = b.event_at(1).unwrap();
        let markets = b.markets_for(&event.event_ticker).await;
        assert_eq!(markets.unwrap_err().status(), Some(500));
    }

    #[tokio::test]
    async fn pending_markets_do_not_hold_browser() {
        let nested = Arc::new(Nested::default());
        let mut b = browser(&nested);
        b.list.load().await;

        let pending = b.markets_for("E1");
        b.set_date_range(DateTime::from_timestamp(150, 0), None);
        assert_eq!(pending.await.unwrap().items[0].ticker, "E1-M");
        // Keyed by the range in force when the request began.
        assert_eq!(nested.requests.lock()[0].min_close_ts, Some(100));
    }

    #[tokio::test]
    async fn empty_ticker_and_missing_row() {
        let nested = Arc::new(Nested::default());
        let mut b = browser(&nested);
        assert!(b.event_at(0).is_none());

        b.list.load().await;
        assert!(b.markets_for("").await.unwrap().items.is_empty());
        assert!(b.event_at(5).is_none());
        assert!(nested.requests.lock().is_empty());
    }
}
