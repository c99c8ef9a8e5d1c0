use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FetchError, FetchResult};

type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

struct Retained<V> {
    value: V,
    fetched_at: Instant,
}

struct Slot<V> {
    retained: Option<Retained<V>>,
    in_flight: Option<(u64, SharedFetch<V>)>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            retained: None,
            in_flight: None,
        }
    }
}

struct Inner<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    stale_after: Option<Duration>,
    next_generation: AtomicU64,
    network_calls: AtomicU64,
}

/// Keyed memo of backend fetches.
///
/// - At most one request per key is in flight; later callers for the same key
///   await the same result.
/// - Successful results are retained until invalidated, refreshed, or older
///   than `stale_after` (when set).
/// - A failed request never clears a previously retained value.
///
/// Cloning is cheap and clones share state.
pub struct QueryCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for QueryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(None)
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `stale_after = None` keeps results fresh until invalidated or refreshed.
    pub fn new(stale_after: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                stale_after,
                next_generation: AtomicU64::new(0),
                network_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Return the retained value for `key` if fresh, otherwise fetch it.
    ///
    /// `fetch` is only invoked when no request for `key` is already in flight.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let shared = {
            let mut slots = self.inner.slots.lock();
            let slot = slots.entry(key.clone()).or_default();
            if let Some((_, pending)) = slot.in_flight.as_ref() {
                debug!("Joining in-flight request for {key:?}");
                pending.clone()
            } else {
                let fresh = slot
                    .retained
                    .as_ref()
                    .filter(|r| self.is_fresh(r))
                    .map(|r| r.value.clone());
                if let Some(value) = fresh {
                    return Ok(value);
                }
                self.start(key, slot, fetch)
            }
        };
        shared.await
    }

    /// Re-issue the request for `key` regardless of freshness.
    ///
    /// Joins the in-flight request if there is one.
    pub async fn refresh<F, Fut>(&self, key: K, fetch: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let shared = {
            let mut slots = self.inner.slots.lock();
            let slot = slots.entry(key.clone()).or_default();
            let joined = slot.in_flight.as_ref().map(|(_, pending)| pending.clone());
            match joined {
                Some(pending) => pending,
                None => self.start(key, slot, fetch),
            }
        };
        shared.await
    }

    /// Forget `key`. A request still in flight for it completes for its
    /// waiters but is not retained.
    pub fn invalidate(&self, key: &K) {
        self.inner.slots.lock().remove(key);
    }

    pub fn clear(&self) {
        self.inner.slots.lock().clear();
    }

    /// Last good value for `key`, fresh or not.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner
            .slots
            .lock()
            .get(key)
            .and_then(|slot| slot.retained.as_ref())
            .map(|r| r.value.clone())
    }

    pub fn is_fetching(&self, key: &K) -> bool {
        self.inner
            .slots
            .lock()
            .get(key)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Number of underlying requests issued so far.
    pub fn network_calls(&self) -> u64 {
        self.inner.network_calls.load(Ordering::Relaxed)
    }

    fn is_fresh(&self, retained: &Retained<V>) -> bool {
        match self.inner.stale_after {
            Some(ttl) => retained.fetched_at.elapsed() < ttl,
            None => true,
        }
    }

    fn start<F, Fut>(&self, key: K, slot: &mut Slot<V>, fetch: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.network_calls.fetch_add(1, Ordering::Relaxed);
        debug!("Fetching {key:?} (request #{generation})");

        let request = fetch();
        let inner = Arc::clone(&self.inner);
        let shared = async move {
            let result = request.await;
            settle(&inner, &key, generation, &result);
            result
        }
        .boxed()
        .shared();

        slot.in_flight = Some((generation, shared.clone()));
        shared
    }
}

/// Runs exactly once per request, inside the shared future.
fn settle<K, V>(inner: &Inner<K, V>, key: &K, generation: u64, result: &FetchResult<V>)
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    let mut slots = inner.slots.lock();
    let Some(slot) = slots.get_mut(key) else {
        debug!("Dropping result for invalidated key {key:?}");
        return;
    };
    let current = slot.in_flight.as_ref().map(|(g, _)| *g);
    if current != Some(generation) {
        debug!("Dropping superseded result for {key:?} (request #{generation})");
        return;
    }
    slot.in_flight = None;
    match result {
        Ok(value) => {
            slot.retained = Some(Retained {
                value: value.clone(),
                fetched_at: Instant::now(),
            });
        }
        Err(FetchError::Http { status, message }) => {
            debug!("Request for {key:?} failed with HTTP {status}: {message}");
        }
        Err(e) => debug!("Request for {key:?} failed: {e}"),
    }
}
