//! Run-scoped, single-flight memoisation of remote lookups.
//!
//! The map lock is only held for the check-and-insert window. Resolution runs
//! on its own task outside the lock, and a pending slot makes every concurrent
//! caller for the same key join that one resolution instead of starting
//! another. Failures are handed to every waiter of the failed attempt and then
//! forgotten, so a later caller retries.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::InventoryError;

type Resolution<V> = Shared<BoxFuture<'static, Result<V, InventoryError>>>;

enum Slot<V> {
    Ready(V),
    Pending {
        generation: u64,
        resolution: Resolution<V>,
        abort: AbortHandle,
    },
}

/// Concurrency-safe cache keyed by `K`, discarded when its run closes.
pub struct ResourceCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    generations: AtomicU64,
    closed: AtomicBool,
    cancellation: CancellationToken,
}

impl<K, V> ResourceCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache whose pending resolutions stop when
    /// `cancellation` fires.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            cancellation,
        }
    }

    /// Look up a resolved value without triggering resolution.
    pub fn get(&self, key: &K) -> Result<Option<V>, InventoryError> {
        let slots = self.lock()?;
        Ok(match slots.get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        })
    }

    /// Return the cached value for `key`, resolving it with `resolve` if no
    /// value is cached and no resolution is in flight.
    ///
    /// `resolve` is only invoked by the caller that creates the pending slot.
    pub async fn get_or_resolve<F, Fut>(&self, key: &K, resolve: F) -> Result<V, InventoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, InventoryError>> + Send + 'static,
    {
        let (generation, resolution) = {
            let mut slots = self.lock()?;
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending {
                    generation,
                    resolution,
                    ..
                }) => {
                    trace!(key = ?key, "joining in-flight resolution");
                    (*generation, resolution.clone())
                }
                None => {
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    let (resolution, abort) = self.spawn_resolution(resolve());
                    slots.insert(
                        key.clone(),
                        Slot::Pending {
                            generation,
                            resolution: resolution.clone(),
                            abort,
                        },
                    );
                    debug!(key = ?key, "resolving");
                    (generation, resolution)
                }
            }
        };

        let result = resolution.await;
        self.settle(key, generation, &result);
        result
    }

    /// Discard every entry and stop pending resolutions. Later calls fail
    /// with [`InventoryError::ContextClosed`].
    pub fn close(&self) {
        let drained: Vec<Slot<V>> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in drained {
            if let Slot::Pending { abort, .. } = slot {
                abort.abort();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<K, Slot<V>>>, InventoryError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(InventoryError::ContextClosed);
        }
        Ok(slots)
    }

    fn spawn_resolution<Fut>(&self, resolve: Fut) -> (Resolution<V>, AbortHandle)
    where
        Fut: Future<Output = Result<V, InventoryError>> + Send + 'static,
    {
        let cancellation = self.cancellation.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => Err(InventoryError::Cancelled),
                result = resolve => result,
            }
        });
        let abort = task.abort_handle();
        let resolution = async move {
            match task.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(InventoryError::Cancelled),
                Err(err) => Err(InventoryError::Other(format!("resolver panicked: {err}"))),
            }
        }
        .boxed()
        .shared();
        (resolution, abort)
    }

    /// Replace the pending slot of `generation` with its outcome. A slot that
    /// was already settled or replaced by a newer attempt is left alone.
    fn settle(&self, key: &K, generation: u64, result: &Result<V, InventoryError>) {
        let Ok(mut slots) = self.lock() else {
            return;
        };
        let current = matches!(
            slots.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !current {
            return;
        }
        match result {
            Ok(value) => {
                slots.insert(key.clone(), Slot::Ready(value.clone()));
            }
            Err(err) => {
                trace!(key = ?key, error = %err, "resolution failed, not caching");
                slots.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn cache() -> Arc<ResourceCache<String, u32>> {
        Arc::new(ResourceCache::new(CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_resolution() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(&"datastore-1".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"datastore-1".to_string()), Ok(Some(7)));
    }

    #[tokio::test]
    async fn test_failure_is_shared_but_not_cached() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = "host-24".to_string();

        let first = {
            let calls = Arc::clone(&calls);
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&key, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(InventoryError::Timeout("retrieve host-24".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let joined = cache
            .get_or_resolve(&key, || async { Ok(1) })
            .await;

        assert!(joined.unwrap_err().is_timeout());
        assert!(first.await.unwrap().unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key), Ok(None));

        let retried = cache.get_or_resolve(&key, || async { Ok(2) }).await;
        assert_eq!(retried, Ok(2));
    }

    #[tokio::test]
    async fn test_unrelated_keys_resolve_concurrently() {
        let cache = cache();
        let b_started = Arc::new(Notify::new());

        let a = {
            let cache = Arc::clone(&cache);
            let b_started = Arc::clone(&b_started);
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&"a".to_string(), || async move {
                        b_started.notified().await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = {
            let b_started = Arc::clone(&b_started);
            cache
                .get_or_resolve(&"b".to_string(), || async move {
                    b_started.notify_one();
                    Ok(2)
                })
                .await
        };

        assert_eq!(b, Ok(2));
        let a = tokio::time::timeout(Duration::from_secs(1), a)
            .await
            .expect("resolution of a blocked on b")
            .unwrap();
        assert_eq!(a, Ok(1));
    }

    #[tokio::test]
    async fn test_closed_cache_fails_fast() {
        let cache = cache();
        cache
            .get_or_resolve(&"dc".to_string(), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.close();
        assert!(cache.is_closed());
        assert_eq!(
            cache.get(&"dc".to_string()),
            Err(InventoryError::ContextClosed)
        );
        let result = cache
            .get_or_resolve(&"dc".to_string(), || async { Ok(2) })
            .await;
        assert_eq!(result, Err(InventoryError::ContextClosed));
    }

    #[tokio::test]
    async fn test_close_stops_pending_resolution() {
        let cache = cache();
        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&"slow".to_string(), || {
                        futures::future::pending::<Result<u32, InventoryError>>()
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter hung after close")
            .unwrap();
        assert_eq!(result, Err(InventoryError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_pending_resolution() {
        let token = CancellationToken::new();
        let cache: ResourceCache<String, u32> = ResourceCache::new(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = cache
            .get_or_resolve(&"slow".to_string(), || {
                futures::future::pending::<Result<u32, InventoryError>>()
            })
            .await;
        canceller.await.unwrap();
        assert_eq!(result, Err(InventoryError::Cancelled));
    }
}
