use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

type Pending<T> = Shared<BoxFuture<'static, T>>;
type InFlight<K, T> = Arc<Mutex<HashMap<K, Pending<T>>>>;

/// In-flight call deduplication.
///
/// Concurrent [`run`](Dedup::run) calls sharing a key while an earlier call
/// for that key is pending all resolve to that call's result. The work runs
/// on its own tokio task, so dropping every caller does not cancel it. The
/// key is released as soon as the task settles, success or failure, so a
/// later call starts fresh.
pub struct Dedup<K, T> {
    inflight: InFlight<K, T>,
}

impl<K, T> Default for Dedup<K, T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> fmt::Debug for Dedup<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.inflight.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("Dedup").field("pending", &pending).finish()
    }
}

/// Removes the key when the owning task finishes or unwinds.
struct Release<K: Eq + Hash, T> {
    inflight: InFlight<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Release<K, T> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.inflight.lock() {
            map.remove(&self.key);
        }
    }
}

impl<K, T> Dedup<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` for `key`, or join the call already in flight for it.
    ///
    /// `start` is only invoked when no call for `key` is pending. Must be
    /// called from within a tokio runtime.
    pub fn run<F, Fut>(&self, key: K, start: F) -> Pending<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut map = self.inflight.lock().unwrap();
        if let Some(pending) = map.get(&key) {
            return pending.clone();
        }

        let work = start();
        let release = Release {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
        };
        // The map lock is held until the entry is inserted, so the release
        // below can never run ahead of the insert.
        let handle = tokio::spawn(async move {
            let _release = release;
            work.await
        });

        let pending = async move {
            match handle.await {
                Ok(value) => value,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => panic!("deduplicated task did not complete: {e}"),
            }
        }
        .boxed()
        .shared();

        map.insert(key, pending.clone());
        pending
    }

    /// Whether a call for `key` is currently in flight.
    pub fn is_pending(&self, key: &K) -> bool {
        self.inflight.lock().unwrap().contains_key(key)
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_invocation() {
        let dedup: Dedup<&'static str, usize> = Dedup::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let calls = Arc::clone(&calls);
            dedup.run("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.await;
                42
            })
        };
        let second = {
            let calls = Arc::clone(&calls);
            dedup.run("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                0
            })
        };

        assert!(dedup.is_pending(&"k"));
        release_tx.send(()).unwrap();

        let (a, b) = futures::join!(first, second);
        assert_eq!(a, 42);
        assert_eq!(b, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_released_after_settle() {
        let dedup: Dedup<u32, Result<u32, String>> = Dedup::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected_calls in 1..=2 {
            let calls_in = Arc::clone(&calls);
            let result = dedup
                .run(1, move || async move {
                    calls_in.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("failed".to_string())
                })
                .await;
            assert_eq!(result, Err("failed".to_string()));
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
            assert!(!dedup.is_pending(&1));
        }
        assert!(dedup.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_in_parallel() {
        let dedup: Dedup<u32, u32> = Dedup::new();
        let (tx, rx) = oneshot::channel::<u32>();

        // Key 1 waits on a value only key 2 produces; sequential execution would hang.
        let waiting = dedup.run(1, move || async move { rx.await.unwrap_or(0) + 1 });
        let producing = dedup.run(2, move || async move {
            let _ = tx.send(10);
            10
        });

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            futures::join!(waiting, producing)
        })
        .await
        .unwrap();
        assert_eq!((a, b), (11, 10));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel() {
        let dedup: Dedup<&'static str, ()> = Dedup::new();
        let done = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let done_in = Arc::clone(&done);
        let pending = dedup.run("slow", move || async move {
            let _ = release_rx.await;
            done_in.fetch_add(1, Ordering::SeqCst);
        });
        drop(pending);

        release_tx.send(()).unwrap();
        for _ in 0..100 {
            if done.load(Ordering::SeqCst) == 1 && !dedup.is_pending(&"slow") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(!dedup.is_pending(&"slow"));
    }
}
