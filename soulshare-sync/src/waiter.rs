use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use soulshare_model::ShareError;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::wait_key::WaitKey;

type PendingId = u64;

/// Default timeout applied by [`Waiter::wait`] when no per-call override is
/// given. `Waiter::wait_indefinitely` is the only way to bypass it.
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

struct PendingWait<T> {
    id: PendingId,
    tx: oneshot::Sender<std::result::Result<T, ShareError>>,
}

/// Per-key state: a FIFO queue of pending waits guarded by its own mutex,
/// plus an rwlock used purely for enqueue/cleanup coordination. A read
/// lock is held while a `Wait` call enqueues so that
/// `Waiter::remove_key_if_empty`'s write lock can never run concurrently
/// with (and thus race) an in-flight enqueue.
struct KeyState<T> {
    queue: SyncMutex<VecDeque<PendingWait<T>>>,
    gate: SyncRwLock<()>,
}

impl<T> Default for KeyState<T> {
    fn default() -> Self {
        Self {
            queue: SyncMutex::new(VecDeque::new()),
            gate: SyncRwLock::new(()),
        }
    }
}

/// Keyed rendezvous: lets one producer complete, fail, cancel, or time out
/// an awaitable registered by a consumer under a composite [`WaitKey`].
/// Ordering is FIFO per key: `Complete`/`Throw`/`Cancel`/`Timeout` always
/// resolve the oldest pending wait for that key.
pub struct Waiter<T> {
    keys: SyncMutex<HashMap<WaitKey, Arc<KeyState<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for Waiter<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Waiter<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            keys: SyncMutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn entry_for(&self, key: &WaitKey) -> Arc<KeyState<T>> {
        self.keys
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyState::default()))
            .clone()
    }

    /// Registers a pending wait under `key` and returns a future that
    /// resolves when the wait is completed, thrown, cancelled, timed out,
    /// or the caller's `cancel` token fires. `timeout` defaults to
    /// [`DEFAULT_WAIT_TIMEOUT`] when omitted; use [`Waiter::wait_indefinitely`]
    /// for a wait with no timeout at all.
    pub async fn wait(
        &self,
        key: WaitKey,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> std::result::Result<T, ShareError> {
        let (state, id, rx) = self.enqueue(&key);
        let d = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);

        let result = match cancel {
            Some(tok) => {
                tokio::select! {
                    res = rx => res.map_err(|_| ShareError::Cancelled),
                    _ = sleep(d) => Err(ShareError::Timeout),
                    _ = tok.cancelled() => Err(ShareError::Cancelled),
                }
            }
            None => {
                tokio::select! {
                    res = rx => res.map_err(|_| ShareError::Cancelled),
                    _ = sleep(d) => Err(ShareError::Timeout),
                }
            }
        };

        if result.is_err() {
            self.remove_pending(&key, &state, id);
        }
        result.and_then(|inner| inner)
    }

    /// As [`Waiter::wait`] but never times out; only `cancel` firing or the
    /// key being completed/thrown can resolve the returned future.
    pub async fn wait_indefinitely(
        &self,
        key: WaitKey,
        cancel: Option<CancellationToken>,
    ) -> std::result::Result<T, ShareError> {
        let (state, id, rx) = self.enqueue(&key);

        let result = match cancel {
            Some(tok) => {
                tokio::select! {
                    res = rx => res.map_err(|_| ShareError::Cancelled),
                    _ = tok.cancelled() => Err(ShareError::Cancelled),
                }
            }
            None => rx.await.map_err(|_| ShareError::Cancelled),
        };

        if result.is_err() {
            self.remove_pending(&key, &state, id);
        }
        result.and_then(|inner| inner)
    }

    /// Registers a pending wait under `key` under the enqueue read lock and
    /// returns its state handle, id, and completion receiver.
    fn enqueue(
        &self,
        key: &WaitKey,
    ) -> (
        Arc<KeyState<T>>,
        PendingId,
        oneshot::Receiver<std::result::Result<T, ShareError>>,
    ) {
        let state = self.entry_for(key);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        // Enqueue under a read lock so concurrent cleanup (which needs the
        // write lock) cannot observe a torn/empty-then-nonempty queue.
        {
            let _gate = state.gate.read();
            state.queue.lock().push_back(PendingWait { id, tx });
        }

        (state, id, rx)
    }

    fn remove_pending(&self, key: &WaitKey, state: &Arc<KeyState<T>>, id: PendingId) {
        let mut queue = state.queue.lock();
        queue.retain(|p| p.id != id);
        let empty = queue.is_empty();
        drop(queue);
        if empty {
            self.remove_key_if_empty(key, state);
        }
    }

    fn remove_key_if_empty(&self, key: &WaitKey, state: &Arc<KeyState<T>>) {
        let _gate = state.gate.write();
        if state.queue.lock().is_empty() {
            let mut keys = self.keys.lock();
            if let Some(current) = keys.get(key) {
                if Arc::ptr_eq(current, state) {
                    keys.remove(key);
                }
            }
        }
    }

    fn pop_oldest(&self, key: &WaitKey) -> Option<(Arc<KeyState<T>>, PendingWait<T>)> {
        let state = self.keys.lock().get(key).cloned()?;
        let popped = state.queue.lock().pop_front();
        popped.map(|p| (state, p))
    }

    /// Resolves the oldest pending wait under `key` with `value`. A no-op
    /// if nothing is waiting.
    pub fn complete(&self, key: &WaitKey, value: T) {
        if let Some((state, pending)) = self.pop_oldest(key) {
            let _ = pending.tx.send(Ok(value));
            self.remove_key_if_empty(key, &state);
        }
    }

    /// Fails the oldest pending wait under `key` with `err`.
    pub fn throw(&self, key: &WaitKey, err: ShareError) {
        if let Some((state, pending)) = self.pop_oldest(key) {
            let _ = pending.tx.send(Err(err));
            self.remove_key_if_empty(key, &state);
        }
    }

    /// Cancels the oldest pending wait under `key`.
    pub fn cancel(&self, key: &WaitKey) {
        self.throw(key, ShareError::Cancelled);
    }

    /// Times out the oldest pending wait under `key`.
    pub fn timeout(&self, key: &WaitKey) {
        self.throw(key, ShareError::Timeout);
    }

    /// Cancels every pending wait across every key.
    pub fn cancel_all(&self) {
        let states: Vec<(WaitKey, Arc<KeyState<T>>)> = self
            .keys
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, state) in states {
            loop {
                let popped = state.queue.lock().pop_front();
                match popped {
                    Some(pending) => {
                        let _ = pending.tx.send(Err(ShareError::Cancelled));
                    }
                    None => break,
                }
            }
            self.remove_key_if_empty(&key, &state);
        }
    }

    pub fn is_waiting_for(&self, key: &WaitKey) -> bool {
        self.keys
            .lock()
            .get(key)
            .map(|state| !state.queue.lock().is_empty())
            .unwrap_or(false)
    }

    /// Cancels every pending wait. Idempotent.
    pub fn dispose(&self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn complete_resolves_the_wait() {
        let waiter: Arc<Waiter<u32>> = Arc::new(Waiter::new());
        let key = WaitKey::single("k");
        let w = waiter.clone();
        let k2 = key.clone();
        let handle = tokio::spawn(async move { w.wait(k2, None, None).await });
        tokio::task::yield_now().await;
        waiter.complete(&key, 42);
        assert_eq!(handle.await.unwrap().unwrap(), 42);
        assert!(!waiter.is_waiting_for(&key));
    }

    #[tokio::test]
    async fn fifo_per_key() {
        let waiter: Arc<Waiter<u32>> = Arc::new(Waiter::new());
        let key = WaitKey::single("k");
        let (w1, w2) = (waiter.clone(), waiter.clone());
        let (k1, k2) = (key.clone(), key.clone());
        let h1 = tokio::spawn(async move { w1.wait(k1, None, None).await });
        tokio::task::yield_now().await;
        let h2 = tokio::spawn(async move { w2.wait(k2, None, None).await });
        tokio::task::yield_now().await;

        waiter.complete(&key, 1);
        waiter.complete(&key, 2);

        assert_eq!(h1.await.unwrap().unwrap(), 1);
        assert_eq!(h2.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_clears_the_key() {
        let waiter: Arc<Waiter<u32>> = Arc::new(Waiter::new());
        let key = WaitKey::single("k");
        let result = waiter
            .wait(key.clone(), Some(Duration::from_millis(10)), None)
            .await;
        assert!(matches!(result, Err(ShareError::Timeout)));
        assert!(!waiter.is_waiting_for(&key));
    }

    #[tokio::test]
    async fn cancel_token_cancels_the_wait() {
        let waiter: Arc<Waiter<u32>> = Arc::new(Waiter::new());
        let key = WaitKey::single("k");
        let token = CancellationToken::new();
        let w = waiter.clone();
        let k2 = key.clone();
        let t2 = token.clone();
        let handle = tokio::spawn(async move { w.wait(k2, None, Some(t2)).await });
        tokio::task::yield_now().await;
        token.cancel();
        assert!(matches!(handle.await.unwrap(), Err(ShareError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_all_drains_every_key() {
        let waiter: Arc<Waiter<u32>> = Arc::new(Waiter::new());
        let (ka, kb) = (WaitKey::single("a"), WaitKey::single("b"));
        let (w1, w2) = (waiter.clone(), waiter.clone());
        let (ka2, kb2) = (ka.clone(), kb.clone());
        let h1 = tokio::spawn(async move { w1.wait(ka2, None, None).await });
        let h2 = tokio::spawn(async move { w2.wait(kb2, None, None).await });
        tokio::task::yield_now().await;

        waiter.cancel_all();

        assert!(matches!(h1.await.unwrap(), Err(ShareError::Cancelled)));
        assert!(matches!(h2.await.unwrap(), Err(ShareError::Cancelled)));
        assert!(!waiter.is_waiting_for(&ka));
        assert!(!waiter.is_waiting_for(&kb));
    }

    #[tokio::test]
    async fn is_waiting_for_is_false_when_nothing_registered() {
        let waiter: Waiter<u32> = Waiter::new();
        assert!(!waiter.is_waiting_for(&WaitKey::single("none")));
    }
}
