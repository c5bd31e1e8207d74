use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tracing::debug;

use crate::Error;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

/// A bounded, TTL-expiring store that coalesces concurrent lookups for the
/// same key onto a single in-flight computation.
///
/// The first caller for a key installs the pending computation; callers
/// arriving before it settles attach to the same shared future, so N
/// concurrent lookups trigger exactly one fetch. Failed computations are
/// removed immediately, so the next lookup retries from scratch. When
/// inserting would exceed `max`, the oldest-inserted entry is evicted first.
pub struct Cache<T> {
    max: usize,
    ttl: Option<Duration>,
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    /// Insertion order of live entry generations; pairs whose generation no
    /// longer matches the resident entry are skipped during eviction.
    order: VecDeque<(u64, String)>,
    next_generation: u64,
}

struct Entry<T> {
    generation: u64,
    created: Instant,
    fetch: SharedFetch<T>,
}

impl<T: Clone + Send + 'static> Cache<T> {
    /// Creates a cache holding at most `max` entries. Entries older than
    /// `ttl` are treated as misses; `Some(Duration::ZERO)` effectively
    /// disables caching, `None` keeps entries for the process lifetime.
    pub fn new(max: usize, ttl: Option<Duration>) -> Self {
        Cache {
            max: max.max(1),
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_generation: 0,
            }),
        }
    }

    /// Maximum number of resident entries.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Entry lifetime after creation, if entries expire at all.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of resident entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns the unexpired computation stored under `key`, or installs the
    /// one produced by `compute` and awaits it.
    ///
    /// The pending future is stored before it is first polled, so concurrent
    /// callers coalesce no matter when they arrive. The lock around the map
    /// is only held across the synchronous lookup/insert, never across the
    /// awaited fetch.
    pub async fn get_or_create<F>(&self, key: &str, compute: F) -> Result<T, Error>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, Error>>,
    {
        let (fetch, generation) = {
            let mut inner = self.lock();
            match inner.entries.get(key) {
                Some(entry) if !self.expired(entry) => {
                    debug!(key, "serving cached entry");
                    (entry.fetch.clone(), entry.generation)
                }
                _ => {
                    debug!(key, "cache miss, starting fetch");
                    let fetch = compute().shared();
                    let generation = self.insert_locked(&mut inner, key, fetch.clone());
                    (fetch, generation)
                }
            }
        };

        let result = fetch.await;
        if result.is_err() {
            // Failures are never retained; drop the entry so the next call
            // attempts a fresh fetch. Generation-checked so a newer entry
            // under the same key is left alone.
            self.remove_generation(key, generation);
        }
        result
    }

    /// Stores an already-resolved value under `key`, replacing any existing
    /// entry. Useful for cache warm-up and tests.
    pub fn seed(&self, key: &str, value: T) {
        let fetch = futures::future::ready(Ok(value)).boxed().shared();
        let mut inner = self.lock();
        self.insert_locked(&mut inner, key, fetch);
    }

    /// Removes the entry stored under `key`, if any.
    pub fn invalidate(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn expired(&self, entry: &Entry<T>) -> bool {
        match self.ttl {
            Some(ttl) => entry.created.elapsed() > ttl,
            None => false,
        }
    }

    fn insert_locked(&self, inner: &mut Inner<T>, key: &str, fetch: SharedFetch<T>) -> u64 {
        if !inner.entries.contains_key(key) {
            while inner.entries.len() >= self.max {
                match inner.order.pop_front() {
                    Some((generation, oldest)) => {
                        let live = inner
                            .entries
                            .get(&oldest)
                            .is_some_and(|entry| entry.generation == generation);
                        if live {
                            debug!(key = oldest.as_str(), "evicting oldest entry");
                            inner.entries.remove(&oldest);
                        }
                    }
                    None => break,
                }
            }
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.entries.insert(
            key.to_string(),
            Entry {
                generation,
                created: Instant::now(),
                fetch,
            },
        );
        inner.order.push_back((generation, key.to_string()));
        generation
    }

    fn remove_generation(&self, key: &str, generation: u64) {
        let mut inner = self.lock();
        let same = inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if same {
            debug!(key, "removing failed entry");
            inner.entries.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use futures::FutureExt;

    use super::Cache;
    use crate::Error;

    fn counting_compute(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<u32, Error>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing_compute(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<u32, Error>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::KeyNotFound {
                    kid: "missing".to_string(),
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_computation() {
        let cache = Cache::new(100, Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let (first, second, third) = tokio::join!(
            cache.get_or_create("key", counting_compute(&calls, 42)),
            cache.get_or_create("key", counting_compute(&calls, 42)),
            cache.get_or_create("key", counting_compute(&calls, 42)),
        );

        assert_eq!(first.unwrap(), 42);
        assert_eq!(second.unwrap(), 42);
        assert_eq!(third.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_value_served_until_ttl_elapses() {
        let cache = Cache::new(100, Some(Duration::from_millis(80)));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;

        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let cache = Cache::new(100, Some(Duration::ZERO));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_computation_is_not_retained() {
        let cache = Cache::new(100, Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache.get_or_create("key", failing_compute(&calls)).await;
        assert!(matches!(result, Err(Error::KeyNotFound { .. })));
        assert_eq!(cache.len(), 0);

        cache
            .get_or_create("key", counting_compute(&calls, 7))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn inserting_beyond_max_evicts_oldest_first() {
        let cache = Cache::new(2, Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            cache
                .get_or_create(key, counting_compute(&calls, 0))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        // "b" and "c" are still resident, "a" was evicted.
        cache
            .get_or_create("b", counting_compute(&calls, 0))
            .await
            .unwrap();
        cache
            .get_or_create("c", counting_compute(&calls, 0))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache
            .get_or_create("a", counting_compute(&calls, 0))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn seeded_entry_short_circuits_computation() {
        let cache = Cache::new(100, Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.seed("key", 42);
        let value = cache
            .get_or_create("key", counting_compute(&calls, 0))
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_computation() {
        let cache = Cache::new(100, Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        cache.invalidate("key");
        cache
            .get_or_create("key", counting_compute(&calls, 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
