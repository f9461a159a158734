// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed, deduplicating cache for remote reads.
#[cfg(test)]
use mock_instant::thread_local::Instant;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash as StdHash;
use std::sync::{Arc, Mutex, MutexGuard};
#[cfg(not(test))]
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use podbrowser_core::FetchError;
use tracing::{debug, trace};

use crate::config::{CacheConfig, ReadOptions, Revalidate};

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Entry<V, E> {
    /// A request is in flight, every caller for this key awaits the same future.
    Pending {
        id: u64,
        future: SharedFetch<V, E>,
        subscribers: usize,
    },

    Resolved { value: V, fetched_at: Instant },
}

struct InnerCache<K, V, E> {
    entries: HashMap<K, Entry<V, E>>,
    next_id: u64,
}

enum Lookup<V, E> {
    Hit(V),
    Join(u64, SharedFetch<V, E>),
    Miss,
}

impl<K, V, E> InnerCache<K, V, E>
where
    K: Debug + Eq + StdHash,
    V: Clone,
{
    /// Finds a usable entry for `key`, attaching the caller if it is pending.
    fn lookup(&mut self, key: &K, policy: Revalidate) -> Lookup<V, E> {
        match self.entries.get_mut(key) {
            Some(Entry::Resolved { value, fetched_at })
                if !policy.is_stale(fetched_at.elapsed()) =>
            {
                trace!(?key, "cache hit");
                Lookup::Hit(value.clone())
            }
            Some(Entry::Pending {
                id,
                future,
                subscribers,
            }) => {
                trace!(?key, subscribers = *subscribers + 1, "join in-flight fetch");
                *subscribers += 1;
                Lookup::Join(*id, future.clone())
            }
            _ => Lookup::Miss,
        }
    }

    fn insert_pending(&mut self, key: K, future: SharedFetch<V, E>) -> (u64, SharedFetch<V, E>) {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.insert(
            key,
            Entry::Pending {
                id,
                future: future.clone(),
                subscribers: 1,
            },
        );
        (id, future)
    }
}

/// Cache of in-flight and completed remote reads, addressed by key.
///
/// At most one fetch per key is in flight at any time, concurrent callers attach to the pending
/// entry and receive the same result. Failed fetches are never stored, the next read for that key
/// fetches again. Retrying is left to the caller.
///
/// Futures are lazy: a caller which goes away before the fetch settled simply stops receiving
/// its result. The pending entry stays in place and the next caller for that key drives it to
/// completion and stores the result.
///
/// Cloning is cheap, all clones share the same entries.
pub struct FetchCache<K, V, E = FetchError> {
    inner: Arc<Mutex<InnerCache<K, V, E>>>,
    config: CacheConfig,
}

impl<K, V, E> Clone for FetchCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<K, V, E> Debug for FetchCache<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, V, E> Default for FetchCache<K, V, E> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K, V, E> FetchCache<K, V, E> {
    pub fn new(config: CacheConfig) -> Self {
        let inner = InnerCache {
            entries: HashMap::new(),
            next_id: 0,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock_cache(&self) -> MutexGuard<'_, InnerCache<K, V, E>> {
        self.inner.lock().expect("acquire exclusive access on cache")
    }
}

impl<K, V, E> FetchCache<K, V, E>
where
    K: Clone + Debug + Eq + StdHash,
    V: Clone + Send + Sync + 'static,
    E: Clone + Display + Send + Sync + 'static,
{
    /// Returns the value for `key`, fetching it with `fetcher` if nothing usable is cached.
    ///
    /// A `None` key means "do not fetch": the fetcher is never invoked and no data is returned.
    pub async fn get<F, Fut>(&self, key: Option<K>, fetcher: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_with(key, ReadOptions::default(), fetcher).await
    }

    /// Same as [`FetchCache::get`] with a revalidation policy chosen by the call site.
    pub async fn get_with<F, Fut>(
        &self,
        key: Option<K>,
        options: ReadOptions,
        fetcher: F,
    ) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let Some(key) = key else {
            trace!("no cache key given, skip fetch");
            return Ok(None);
        };

        let policy = options.revalidate.unwrap_or(self.config.revalidate);

        let lookup = self.lock_cache().lookup(&key, policy);
        let (id, future) = match lookup {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Join(id, future) => (id, future),
            Lookup::Miss => {
                // The fetcher runs without holding the lock, another caller might have attached
                // an entry in the meantime.
                let fetch = fetcher().boxed().shared();

                let mut cache = self.lock_cache();
                match cache.lookup(&key, policy) {
                    Lookup::Hit(value) => return Ok(Some(value)),
                    Lookup::Join(id, future) => (id, future),
                    Lookup::Miss => {
                        debug!(?key, "cache miss, fetch");
                        cache.insert_pending(key.clone(), fetch)
                    }
                }
            }
        };

        let subscriber = Subscriber {
            cache: self,
            key: &key,
            id,
        };
        let result = future.await;
        subscriber.settle(&result);

        result.map(Some)
    }

    /// Returns the resolved value for `key` without fetching.
    pub fn peek(&self, key: &K) -> Option<V> {
        match self.lock_cache().entries.get(key) {
            Some(Entry::Resolved { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        matches!(self.lock_cache().entries.get(key), Some(Entry::Pending { .. }))
    }

    /// Number of callers currently waiting for the pending fetch of `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        match self.lock_cache().entries.get(key) {
            Some(Entry::Pending { subscribers, .. }) => *subscribers,
            _ => 0,
        }
    }

    /// Forces the next read of `key` to fetch again.
    ///
    /// Invalidating a pending entry detaches it, its result still reaches the callers waiting for
    /// it but is never stored.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.lock_cache().entries.remove(key).is_some();
        if removed {
            debug!(?key, "invalidate cache entry");
        }
        removed
    }

    /// Invalidates every entry whose key matches the predicate, returns how many were removed.
    pub fn invalidate_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let mut cache = self.lock_cache();
        let before = cache.entries.len();
        cache.entries.retain(|key, _| !predicate(key));
        let removed = before - cache.entries.len();

        if removed > 0 {
            debug!(removed, "invalidate cache entries");
        }

        removed
    }

    pub fn clear(&self) {
        self.lock_cache().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock_cache().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller attached to a pending entry.
///
/// Dropping it before the fetch settled decrements the entry's subscriber count.
struct Subscriber<'a, K, V, E>
where
    K: Clone + Debug + Eq + StdHash,
{
    cache: &'a FetchCache<K, V, E>,
    key: &'a K,
    id: u64,
}

impl<K, V, E> Subscriber<'_, K, V, E>
where
    K: Clone + Debug + Eq + StdHash,
    V: Clone,
    E: Display,
{
    /// Stores the outcome of the fetch if the entry still belongs to it.
    fn settle(&self, result: &Result<V, E>) {
        let mut cache = self.cache.lock_cache();

        let is_current = matches!(
            cache.entries.get(self.key),
            Some(Entry::Pending { id, .. }) if *id == self.id
        );

        if !is_current {
            // Already stored by another subscriber or detached by an invalidation.
            return;
        }

        match result {
            Ok(value) => {
                trace!(key = ?self.key, "store fetched value");
                cache.entries.insert(
                    self.key.clone(),
                    Entry::Resolved {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
            Err(err) => {
                debug!(key = ?self.key, %err, "fetch failed");
                cache.entries.remove(self.key);
            }
        }
    }
}

impl<K, V, E> Drop for Subscriber<'_, K, V, E>
where
    K: Clone + Debug + Eq + StdHash,
{
    fn drop(&mut self) {
        let mut cache = self.cache.lock_cache();

        if let Some(Entry::Pending {
            id, subscribers, ..
        }) = cache.entries.get_mut(self.key)
        {
            if *id == self.id {
                *subscribers = subscribers.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use mock_instant::thread_local::MockClock;
    use podbrowser_core::FetchError;
    use tokio::sync::oneshot;

    use crate::config::{CacheConfig, ReadOptions, Revalidate};

    use super::FetchCache;

    type Cache = FetchCache<&'static str, u32>;

    /// Fetcher which counts its invocations and resolves with the given result.
    fn counting(
        calls: &Arc<AtomicUsize>,
        result: Result<u32, FetchError>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, FetchError>> + use<> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { result }.boxed()
        }
    }

    fn network_error() -> FetchError {
        FetchError::network("https://pod.example.com/", "connection reset")
    }

    #[tokio::test]
    async fn null_key_never_fetches() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache.get(None, counting(&calls, Ok(1))).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn resolved_values_are_served_from_cache() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get(Some("a"), counting(&calls, Ok(1337))).await;
        let second = cache.get(Some("a"), counting(&calls, Ok(1))).await;

        assert_eq!(first, Ok(Some(1337)));
        assert_eq!(second, Ok(Some(1337)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(&"a"), Some(1337));
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let gated = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { rx.await.map_err(|err| network_error_with(err)) }.boxed()
            }
        };

        let (first, second, _) = tokio::join!(
            cache.get(Some("a"), gated),
            cache.get(Some("a"), counting(&calls, Ok(1))),
            async {
                tokio::task::yield_now().await;
                assert!(cache.is_pending(&"a"));
                assert_eq!(cache.subscriber_count(&"a"), 2);
                tx.send(42).unwrap();
            }
        );

        assert_eq!(first, Ok(Some(42)));
        assert_eq!(second, Ok(Some(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.subscriber_count(&"a"), 0);
    }

    fn network_error_with(err: impl std::fmt::Display) -> FetchError {
        FetchError::network("https://pod.example.com/", err)
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(Some("a"), counting(&calls, Ok(1))).await.unwrap();
        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));

        let value = cache.get(Some("a"), counting(&calls, Ok(2))).await.unwrap();
        assert_eq!(value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache
            .get(Some("a"), counting(&calls, Err(network_error())))
            .await;
        assert_eq!(result, Err(network_error()));
        assert!(cache.is_empty());

        // Retrying is a caller decision and fetches again.
        let result = cache.get(Some("a"), counting(&calls, Ok(7))).await;
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_reach_every_subscriber() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<Result<u32, FetchError>>();

        let gated = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { rx.await.map_err(network_error_with)? }.boxed()
            }
        };

        let (first, second, _) = tokio::join!(
            cache.get(Some("a"), gated),
            cache.get(Some("a"), counting(&calls, Ok(1))),
            async {
                tokio::task::yield_now().await;
                tx.send(Err(network_error())).unwrap();
            }
        );

        assert_eq!(first, Err(network_error()));
        assert_eq!(second, Err(network_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidated_pending_fetch_is_not_stored() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let gated = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { rx.await.map_err(network_error_with) }.boxed()
            }
        };

        let (stale, _) = tokio::join!(cache.get(Some("a"), gated), async {
            tokio::task::yield_now().await;
            assert!(cache.invalidate(&"a"));
            tx.send(1).unwrap();
        });

        // The waiting caller still receives its result, but nothing gets stored.
        assert_eq!(stale, Ok(Some(1)));
        assert_eq!(cache.peek(&"a"), None);

        let fresh = cache.get(Some("a"), counting(&calls, Ok(2))).await;
        assert_eq!(fresh, Ok(Some(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_subscribers_leave_pending_entry_for_next_caller() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let gated = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { rx.await.map_err(network_error_with) }.boxed()
            }
        };

        {
            let mut read = Box::pin(cache.get(Some("a"), gated));
            assert!((&mut read).now_or_never().is_none());
            assert_eq!(cache.subscriber_count(&"a"), 1);
        }

        // Caller went away, the fetch is still attached to the key.
        assert_eq!(cache.subscriber_count(&"a"), 0);
        assert!(cache.is_pending(&"a"));

        tx.send(5).unwrap();
        let value = cache.get(Some("a"), counting(&calls, Ok(1))).await;
        assert_eq!(value, Ok(Some(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(&"a"), Some(5));
    }

    #[tokio::test]
    async fn revalidate_after_max_age() {
        MockClock::set_time(Duration::ZERO);

        let cache = Cache::new(CacheConfig::new(Revalidate::After(Duration::from_secs(60))));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(Some("a"), counting(&calls, Ok(1))).await.unwrap();

        MockClock::advance(Duration::from_secs(30));
        let value = cache.get(Some("a"), counting(&calls, Ok(2))).await.unwrap();
        assert_eq!(value, Some(1));

        MockClock::advance(Duration::from_secs(31));
        let value = cache.get(Some("a"), counting(&calls, Ok(3))).await.unwrap();
        assert_eq!(value, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn call_site_can_force_revalidation() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(Some("a"), counting(&calls, Ok(1))).await.unwrap();

        let value = cache
            .get_with(Some("a"), ReadOptions::force(), counting(&calls, Ok(2)))
            .await
            .unwrap();
        assert_eq!(value, Some(2));

        let value = cache.get(Some("a"), counting(&calls, Ok(3))).await.unwrap();
        assert_eq!(value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forced_reads_join_pending_fetch() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let gated = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { rx.await.map_err(network_error_with) }.boxed()
            }
        };

        let (first, forced, _) = tokio::join!(
            cache.get(Some("a"), gated),
            cache.get_with(Some("a"), ReadOptions::force(), counting(&calls, Ok(1))),
            async {
                tokio::task::yield_now().await;
                assert_eq!(cache.subscriber_count(&"a"), 2);
                tx.send(9).unwrap();
            }
        );

        assert_eq!(first, Ok(Some(9)));
        assert_eq!(forced, Ok(Some(9)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetchers_may_use_the_cache() {
        let cache = Cache::default();
        cache.get(Some("b"), || async { Ok(2) }).await.unwrap();

        let value = cache
            .get(Some("a"), || {
                // Must not block on the cache's own lock.
                let b = cache.peek(&"b").unwrap_or_default();
                async move { Ok(b + 1) }
            })
            .await;
        assert_eq!(value, Ok(Some(3)));
    }

    #[tokio::test]
    async fn panicking_fetcher_leaves_cache_usable() {
        let cache = Cache::default();

        let panicking = cache.clone();
        let result = tokio::spawn(async move {
            panicking
                .get(Some("a"), || -> BoxFuture<'static, Result<u32, FetchError>> {
                    panic!("fetcher failed")
                })
                .await
        })
        .await;
        assert!(result.is_err());

        let value = cache.get(Some("a"), || async { Ok(4) }).await;
        assert_eq!(value, Ok(Some(4)));
    }

    #[tokio::test]
    async fn invalidate_where_matches_keys() {
        let cache = Cache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["alice/a", "alice/b", "bob/a"] {
            cache.get(Some(key), counting(&calls, Ok(1))).await.unwrap();
        }

        assert_eq!(cache.invalidate_where(|key| key.starts_with("alice/")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&"bob/a"), Some(1));

        cache.clear();
        assert!(cache.is_empty());
    }
}
