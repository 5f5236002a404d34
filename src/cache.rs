//! Memoization of asynchronous calls with a time-to-live.
//!
//! Concurrent callers asking for the same key while a call is in flight share
//! that call's result. Successes are kept for `ttl` after the call completes;
//! failures are dropped as soon as they are observed so the next caller tries
//! again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

type SharedCall<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Entry<V, E> {
    generation: u64,
    call: SharedCall<V, E>,
    /// `None` while the call is still in flight.
    expires_at: Option<Instant>,
}

impl<V, E> Entry<V, E> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct CallCache<K, V, E> {
    entries: Mutex<HashMap<K, Entry<V, E>>>,
    generation: AtomicU64,
}

impl<K, V, E> Default for CallCache<K, V, E> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K, V, E> CallCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached result for `key`, or run `f` to produce it.
    ///
    /// `f` is only invoked when there is neither a live result nor an
    /// in-flight call for `key`.
    pub async fn cached<F, Fut>(&self, key: K, ttl: Duration, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (generation, call) = {
            let mut entries = self.entries();
            match entries.get(&key) {
                Some(entry) if entry.is_live(Instant::now()) => {
                    (entry.generation, entry.call.clone())
                }
                _ => {
                    let now = Instant::now();
                    entries.retain(|_, entry| entry.is_live(now));
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let call = f().boxed().shared();
                    entries.insert(
                        key.clone(),
                        Entry {
                            generation,
                            call: call.clone(),
                            expires_at: None,
                        },
                    );
                    (generation, call)
                }
            }
        };

        let result = call.await;

        let mut entries = self.entries();
        let current = entries
            .get(&key)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            match &result {
                Ok(_) => {
                    if let Some(entry) = entries.get_mut(&key) {
                        entry
                            .expires_at
                            .get_or_insert_with(|| Instant::now() + ttl);
                    }
                }
                Err(_) => {
                    entries.remove(&key);
                }
            }
        }
        result
    }

    pub fn invalidate(&self, key: &K) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of live or in-flight entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
