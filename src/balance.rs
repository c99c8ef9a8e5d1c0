use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::BalanceSource;
use crate::query::QueryCache;
use crate::types::Balance;

/// How often the balance is refetched while a monitor is alive.
pub const BALANCE_REFRESH: Duration = Duration::from_secs(60);

/// How long a fetched balance is served without a new request.
pub const BALANCE_STALE: Duration = Duration::from_secs(30);

const BALANCE_KEY: &str = "balance";

pub type BalanceCache = QueryCache<&'static str, Balance>;

pub fn balance_cache(stale_after: Duration) -> BalanceCache {
    QueryCache::new(Some(stale_after))
}

/// What the header shows. A failed refresh sets `error` but keeps the last
/// good `balance`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceView {
    pub balance: Option<Balance>,
    pub error: Option<String>,
    pub loading: bool,
}

/// Background task that keeps a [`BalanceView`] current. Stops when dropped.
pub struct BalanceMonitor {
    handle: JoinHandle<()>,
    view: watch::Receiver<BalanceView>,
}

impl BalanceMonitor {
    /// Fetch now (from cache if fresh), then refresh every `period`.
    pub fn spawn(source: Arc<dyn BalanceSource>, cache: BalanceCache, period: Duration) -> Self {
        let initial = BalanceView {
            balance: cache.peek(&BALANCE_KEY),
            error: None,
            loading: true,
        };
        let (tx, view) = watch::channel(initial);
        let handle = tokio::spawn(run(source, cache, period, tx));
        Self { handle, view }
    }

    pub fn view(&self) -> BalanceView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BalanceView> {
        self.view.clone()
    }
}

impl Drop for BalanceMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    source: Arc<dyn BalanceSource>,
    cache: BalanceCache,
    period: Duration,
    tx: watch::Sender<BalanceView>,
) {
    let mut ticker = tokio::time::interval(period);
    let mut first = true;
    loop {
        ticker.tick().await;
        let fetch = {
            let source = Arc::clone(&source);
            move || source.balance()
        };
        let result = if first {
            cache.get_or_fetch(BALANCE_KEY, fetch).await
        } else {
            tx.send_modify(|v| v.loading = true);
            cache.refresh(BALANCE_KEY, fetch).await
        };
        first = false;

        tx.send_modify(|view| {
            view.loading = false;
            match result {
                Ok(balance) => {
                    debug!("Balance: {} {}", balance.total_balance, balance.currency);
                    view.balance = Some(balance);
                    view.error = None;
                }
                Err(e) => {
                    warn!("Balance refresh failed: {e}");
                    view.error = Some(e.to_string());
                }
            }
        });
    }
}

/// One-shot read through the cache, for commands that do not stay open.
pub async fn current_balance(
    source: Arc<dyn BalanceSource>,
    cache: &BalanceCache,
) -> crate::error::FetchResult<Balance> {
    cache.get_or_fetch(BALANCE_KEY, move || source.balance()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchResult};
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Scripted {
        results: Mutex<VecDeque<FetchResult<Balance>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(results: Vec<FetchResult<Balance>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    impl BalanceSource for Scripted {
        fn balance(&self) -> BoxFuture<'static, FetchResult<Balance>> {
            *self.calls.lock() += 1;
            let result = self
                .results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("exhausted".to_string())));
            async move { result }.boxed()
        }
    }

    fn usd(cents: i64) -> Balance {
        Balance {
            total_balance: cents,
            currency: "USD".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_last_balance() {
        let source = Scripted::new(vec![
            Ok(usd(1_000)),
            Err(FetchError::Http {
                status: 503,
                message: "Failed to fetch balance".to_string(),
            }),
            Ok(usd(2_500)),
        ]);
        let monitor =
            BalanceMonitor::spawn(source.clone(), balance_cache(BALANCE_STALE), BALANCE_REFRESH);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.view().balance, Some(usd(1_000)));
        assert!(!monitor.view().loading);

        tokio::time::sleep(BALANCE_REFRESH).await;
        let view = monitor.view();
        assert_eq!(view.balance, Some(usd(1_000)));
        assert_eq!(view.error.as_deref(), Some("Failed to fetch balance"));

        tokio::time::sleep(BALANCE_REFRESH).await;
        let view = monitor.view();
        assert_eq!(view.balance, Some(usd(2_500)));
        assert_eq!(view.error, None);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_monitor_stops_refresh() {
        let source = Scripted::new(vec![Ok(usd(1)), Ok(usd(2)), Ok(usd(3))]);
        let monitor =
            BalanceMonitor::spawn(source.clone(), balance_cache(BALANCE_STALE), BALANCE_REFRESH);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(monitor);

        tokio::time::sleep(BALANCE_REFRESH * 3).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cached_balance_served_on_mount() {
        let source = Scripted::new(vec![Ok(usd(7))]);
        let cache = balance_cache(BALANCE_STALE);
        assert_eq!(current_balance(source.clone(), &cache).await, Ok(usd(7)));

        let monitor = BalanceMonitor::spawn(source.clone(), cache, BALANCE_REFRESH);
        assert_eq!(monitor.view().balance, Some(usd(7)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.view().balance, Some(usd(7)));
        assert_eq!(source.calls(), 1);
    }
}
