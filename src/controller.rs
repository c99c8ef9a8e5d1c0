use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::{FetchKey, PageSource};
use crate::error::FetchResult;
use crate::filter::FilterState;
use crate::ledger::CursorLedger;
use crate::query::QueryCache;
use crate::types::{Page, ResourceKind};

/// Cache shared by every page of one listing.
pub type PageCache<T> = QueryCache<FetchKey, Arc<Page<T>>>;

/// A finished fetch, to be handed back to [`ListController::complete`].
pub type Completion<T> = (FetchRequest, FetchResult<Arc<Page<T>>>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// A transition the user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Load the current page, from cache when possible.
    Reload,
    /// Re-issue the current page's request.
    Refresh,
    Next,
    Prev,
}

/// What a view needs to draw the pager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub kind: ResourceKind,
    pub page_index: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub filter: FilterState,
    pub status: Status,
}

/// A fetch begun by [`ListController::begin`], awaiting completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: u64,
    pub page: usize,
    pub key: FetchKey,
    pub force: bool,
}

/// Paginated, filterable view over one listing.
///
/// The page index only moves after the target page has loaded; a failure
/// leaves page, ledger and filter as they were so the same navigation can be
/// retried. When several fetches overlap, only the most recently begun one is
/// applied.
pub struct ListController<T> {
    kind: ResourceKind,
    filter: FilterState,
    ledger: CursorLedger,
    page_index: usize,
    status: Status,
    current: Option<Arc<Page<T>>>,
    pending: Option<u64>,
    next_ticket: u64,
    source: Arc<dyn PageSource<T>>,
    cache: PageCache<T>,
    snapshots: watch::Sender<Snapshot>,
}

impl<T> ListController<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(kind: ResourceKind, filter: FilterState, source: Arc<dyn PageSource<T>>) -> Self {
        Self::with_cache(kind, filter, source, QueryCache::default())
    }

    pub fn with_cache(
        kind: ResourceKind,
        filter: FilterState,
        source: Arc<dyn PageSource<T>>,
        cache: PageCache<T>,
    ) -> Self {
        let snapshot = Snapshot {
            kind,
            page_index: 0,
            has_next: false,
            has_prev: false,
            filter,
            status: Status::Idle,
        };
        let (snapshots, _) = watch::channel(snapshot);
        Self {
            kind,
            filter,
            ledger: CursorLedger::new(),
            page_index: 0,
            status: Status::Idle,
            current: None,
            pending: None,
            next_ticket: 0,
            source,
            cache,
            snapshots,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn ledger(&self) -> &CursorLedger {
        &self.ledger
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Last page that loaded successfully.
    pub fn current(&self) -> Option<&Arc<Page<T>>> {
        self.current.as_ref()
    }

    /// True only when the page after the current one has a non-empty cursor.
    pub fn has_next(&self) -> bool {
        self.ledger
            .get(self.page_index + 1)
            .is_some_and(|cursor| !cursor.is_empty())
    }

    pub fn has_prev(&self) -> bool {
        self.page_index > 0
    }

    /// Receives one snapshot per state transition.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            kind: self.kind,
            page_index: self.page_index,
            has_next: self.has_next(),
            has_prev: self.has_prev(),
            filter: self.filter,
            status: self.status.clone(),
        }
    }

    /// Key for `page`, if its cursor is known.
    pub fn key_for(&self, page: usize) -> Option<FetchKey> {
        let cursor = self.ledger.get(page)?;
        Some(FetchKey::new(
            self.kind,
            self.filter.limit,
            cursor,
            self.filter.min_close_ts,
            self.filter.max_close_ts,
        ))
    }

    /// Start a navigation. Returns `None` when it is not currently possible.
    ///
    /// Any fetch begun earlier is superseded.
    pub fn begin(&mut self, nav: Navigation) -> Option<FetchRequest> {
        let (page, force) = match nav {
            Navigation::Reload => (self.page_index, false),
            Navigation::Refresh => (self.page_index, true),
            Navigation::Next if self.has_next() => (self.page_index + 1, false),
            Navigation::Prev if self.has_prev() => (self.page_index - 1, false),
            Navigation::Next | Navigation::Prev => {
                debug!("{} {nav:?} unavailable on page {}", self.kind, self.page_index);
                return None;
            }
        };
        let key = self.key_for(page)?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending = Some(ticket);
        self.set_status(Status::Loading);
        Some(FetchRequest {
            ticket,
            page,
            key,
            force,
        })
    }

    /// Run the request through the cache.
    ///
    /// The returned future does not borrow the controller, so further
    /// navigations can begin while it is pending.
    pub fn execute(
        &self,
        request: &FetchRequest,
    ) -> BoxFuture<'static, FetchResult<Arc<Page<T>>>> {
        let cache = self.cache.clone();
        let source = Arc::clone(&self.source);
        let key = request.key.clone();
        let force = request.force;
        async move {
            let request_key = key.clone();
            let fetch = move || {
                let fut = source.fetch_page(&request_key);
                async move { fut.await.map(Arc::new) }
            };
            if force {
                cache.refresh(key, fetch).await
            } else {
                cache.get_or_fetch(key, fetch).await
            }
        }
        .boxed()
    }

    /// Begin `nav` and run its fetch on a task that reports to `done`.
    ///
    /// Returns false when the navigation is not currently possible.
    pub fn spawn(&mut self, nav: Navigation, done: &mpsc::UnboundedSender<Completion<T>>) -> bool {
        let Some(request) = self.begin(nav) else {
            return false;
        };
        let fetch = self.execute(&request);
        let done = done.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            // The receiver is gone once the view has shut down.
            let _ = done.send((request, result));
        });
        true
    }

    /// Apply the outcome of `request`. Returns false if it was superseded.
    pub fn complete(&mut self, request: &FetchRequest, result: FetchResult<Arc<Page<T>>>) -> bool {
        if self.pending != Some(request.ticket) {
            debug!(
                "Discarding superseded {} response for page {}",
                self.kind, request.page
            );
            return false;
        }
        self.pending = None;
        match result {
            Ok(page) => {
                self.ledger.record(request.page, &page.cursor);
                self.page_index = request.page;
                self.current = Some(page);
                self.set_status(Status::Ready);
            }
            Err(e) => {
                warn!("Failed to load {} page {}: {e}", self.kind, request.page + 1);
                self.set_status(Status::Failed(e.to_string()));
            }
        }
        true
    }

    /// Begin, execute and complete `nav`. Returns false if nothing was fetched.
    pub async fn navigate(&mut self, nav: Navigation) -> bool {
        let Some(request) = self.begin(nav) else {
            return false;
        };
        let result = self.execute(&request).await;
        self.complete(&request, result)
    }

    pub async fn load(&mut self) -> bool {
        self.navigate(Navigation::Reload).await
    }

    pub async fn refresh(&mut self) -> bool {
        self.navigate(Navigation::Refresh).await
    }

    pub async fn next(&mut self) -> bool {
        self.navigate(Navigation::Next).await
    }

    pub async fn prev(&mut self) -> bool {
        self.navigate(Navigation::Prev).await
    }

    /// Change the page size. Always restarts from the first page.
    pub async fn set_limit(&mut self, limit: u32) -> Result<bool> {
        self.apply_limit(limit)?;
        Ok(self.load().await)
    }

    /// Change the page size and reset to an empty first page without
    /// loading it. Any pending fetch is superseded.
    pub fn apply_limit(&mut self, limit: u32) -> Result<()> {
        self.filter.set_limit(limit)?;
        info!("{} page size set to {limit}", self.kind);
        self.reset_pagination();
        Ok(())
    }

    /// Change the close-time range.
    ///
    /// Restarts pagination for listings the backend filters by close time.
    /// Other listings keep their position and issue no request.
    pub async fn set_date_range(
        &mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> bool {
        if !self.apply_date_range(from, to) {
            return false;
        }
        self.load().await
    }

    /// Change the close-time range without loading. Returns true when the
    /// listing was reset and the first page needs loading.
    pub fn apply_date_range(
        &mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> bool {
        self.filter.set_date_range(from, to);
        if !self.kind.supports_close_filter() {
            self.publish();
            return false;
        }
        info!(
            "{} close range set to {:?}..{:?}",
            self.kind, self.filter.min_close_ts, self.filter.max_close_ts
        );
        self.reset_pagination();
        true
    }

    fn reset_pagination(&mut self) {
        self.ledger.reset();
        self.page_index = 0;
        self.current = None;
        self.pending = None;
        self.set_status(Status::Idle);
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
