//! Per-key operation serializer.
//!
//! At most one operation runs per key at a time. Operations on the same key
//! run in the order [`OperationSerializer::run`] was called; operations on
//! different keys are independent. A key holds state only while it has
//! running or queued work.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

type Queues = Arc<Mutex<HashMap<String, KeyQueue>>>;

/// Waiters behind the operation currently holding a key.
///
/// A key is present in the map exactly while some ticket holds its turn.
#[derive(Debug, Default)]
struct KeyQueue {
    waiters: VecDeque<oneshot::Sender<()>>,
}

fn lock(queues: &Queues) -> MutexGuard<'_, HashMap<String, KeyQueue>> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hand the key to the next live waiter, or forget the key when none is left.
fn release(queues: &mut HashMap<String, KeyQueue>, key: &str) {
    if let Some(queue) = queues.get_mut(key) {
        while let Some(next) = queue.waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }
    }
    queues.remove(key);
}

/// Serializes operations per key.
///
/// Cloning is cheap; clones share the same queues.
///
/// # Example
///
/// ```ignore
/// let serializer = OperationSerializer::new();
/// let first = serializer.run("app/notes", || async { save_note().await });
/// let second = serializer.run("app/notes", || async { list_notes().await });
/// // `second` starts only after `first` has finished, whichever is polled first.
/// let (a, b) = tokio::join!(second, first);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationSerializer {
    queues: Queues,
}

impl OperationSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `op` under `key` and return a future resolving to its output.
    ///
    /// The operation's place in line is taken when `run` is called, not when
    /// the returned future is first polled. The key is released when the
    /// operation finishes, fails, panics, or the future is dropped.
    pub fn run<F, Fut, T>(&self, key: impl Into<String>, op: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut ticket = self.enqueue(key.into());
        async move {
            ticket.wait().await;
            let output = op().await;
            drop(ticket);
            output
        }
    }

    /// Operations queued or running under `key`.
    pub fn pending(&self, key: &str) -> usize {
        lock(&self.queues).get(key).map_or(0, |queue| {
            1 + queue.waiters.iter().filter(|tx| !tx.is_closed()).count()
        })
    }

    /// Keys with queued or running work, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.queues).keys().cloned().collect();
        keys.sort();
        keys
    }

    fn enqueue(&self, key: String) -> Ticket {
        let mut queues = lock(&self.queues);
        let waiting = match queues.get_mut(&key) {
            Some(queue) => {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            }
            None => {
                queues.insert(key.clone(), KeyQueue::default());
                None
            }
        };
        Ticket {
            key,
            queues: Arc::clone(&self.queues),
            waiting,
        }
    }
}

/// A place in one key's line. Holds the turn once `waiting` is `None`.
#[derive(Debug)]
struct Ticket {
    key: String,
    queues: Queues,
    waiting: Option<oneshot::Receiver<()>>,
}

impl Ticket {
    async fn wait(&mut self) {
        if let Some(rx) = self.waiting.as_mut() {
            // Senders are only dropped unsent after this receiver is gone.
            let _ = rx.await;
        }
        self.waiting = None;
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut queues = lock(&self.queues);
        let holds_turn = match self.waiting.take() {
            None => true,
            // Dropping the receiver under the lock means no later release
            // can hand the turn to this ticket.
            Some(mut rx) => rx.try_recv().is_ok(),
        };
        if holds_turn {
            release(&mut queues, &self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: impl Into<String>) {
        log.lock().expect("log lock").push(entry.into());
    }

    #[tokio::test]
    async fn test_same_key_runs_in_call_order() {
        let serializer = OperationSerializer::new();
        let log = Log::default();

        let ops: Vec<_> = [30u64, 10, 0]
            .into_iter()
            .enumerate()
            .map(|(i, delay)| {
                let log = Arc::clone(&log);
                serializer.run("app/notes", move || async move {
                    push(&log, format!("start {}", i));
                    sleep(Duration::from_millis(delay)).await;
                    push(&log, format!("end {}", i));
                    i
                })
            })
            .collect();

        let results = futures_util::future::join_all(ops).await;
        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_order_is_fixed_at_call_time() {
        let serializer = OperationSerializer::new();
        let log = Log::default();

        let first = {
            let log = Arc::clone(&log);
            serializer.run("k", move || async move {
                sleep(Duration::from_millis(10)).await;
                push(&log, "first");
            })
        };
        let second = {
            let log = Arc::clone(&log);
            serializer.run("k", move || async move { push(&log, "second") })
        };

        // Poll the later call first.
        tokio::join!(second, first);
        assert_eq!(*log.lock().expect("log lock"), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let serializer = OperationSerializer::new();
        let (tx, rx) = oneshot::channel::<()>();

        // `a` can only finish once `b` has run, so a global lock would hang.
        let a = serializer.run("a", || async move { rx.await.is_ok() });
        let b = serializer.run("b", || async move { tx.send(()).is_ok() });

        let (a, b) = timeout(Duration::from_secs(1), async { tokio::join!(a, b) })
            .await
            .expect("independent keys should not block each other");
        assert!(a && b);
    }

    #[tokio::test]
    async fn test_failure_releases_key() {
        let serializer = OperationSerializer::new();

        let failing = serializer.run("k", || async { Err::<(), _>("boom") });
        let next = serializer.run("k", || async { Ok::<_, &str>(7) });

        let (failed, next) = tokio::join!(failing, next);
        assert_eq!(failed, Err("boom"));
        assert_eq!(next, Ok(7));
    }

    #[tokio::test]
    async fn test_panic_releases_key() {
        let serializer = OperationSerializer::new();

        let fail = true;
        let panicking = serializer.run("k", move || async move {
            if fail {
                panic!("operation panicked");
            }
        });
        let handle = tokio::spawn(panicking);
        assert!(handle.await.is_err());

        let next = timeout(Duration::from_secs(1), serializer.run("k", || async { 1 }))
            .await
            .expect("key should be released after a panic");
        assert_eq!(next, 1);
    }

    #[tokio::test]
    async fn test_dropped_future_releases_key() {
        let serializer = OperationSerializer::new();

        let holder = serializer.run("k", || async { 0 });
        let abandoned = serializer.run("k", || async { 1 });
        let kept = serializer.run("k", || async { 2 });
        assert_eq!(serializer.pending("k"), 3);

        drop(abandoned);
        assert_eq!(serializer.pending("k"), 2);
        drop(holder);

        let value = timeout(Duration::from_secs(1), kept)
            .await
            .expect("queue should skip dropped operations");
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let serializer = OperationSerializer::new();
        assert_eq!(serializer.pending("k"), 0);

        let running = serializer.run("k", || async { sleep(Duration::from_millis(5)).await });
        let other = serializer.run("j", || async {});
        assert_eq!(serializer.active_keys(), vec!["j".to_string(), "k".to_string()]);

        tokio::join!(running, other);
        assert!(serializer.active_keys().is_empty());
        assert_eq!(serializer.pending("k"), 0);
    }
}
