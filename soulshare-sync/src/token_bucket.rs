use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use soulshare_model::ShareError;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Inner {
    capacity: AtomicU32,
    pending_capacity: AtomicU32,
    available: Mutex<u32>,
    refilled: Notify,
    interval_ms: AtomicU64,
}

/// Leaky/token-bucket rate limiter. `available` starts at capacity `C` and
/// is reset to `C` every `interval`. Waiters block on a mutex so tokens are
/// handed out FIFO by arrival order when the bucket is empty.
pub struct TokenBucket {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.inner.capacity.load(Ordering::Relaxed))
            .finish()
    }
}

impl TokenBucket {
    pub fn new(capacity: u32, interval: Duration) -> Arc<Self> {
        assert!(capacity >= 1, "TokenBucket capacity must be >= 1");
        let inner = Arc::new(Inner {
            capacity: AtomicU32::new(capacity),
            pending_capacity: AtomicU32::new(capacity),
            available: Mutex::new(capacity),
            refilled: Notify::new(),
            interval_ms: AtomicU64::new(interval.as_millis() as u64),
        });

        let timer_inner = inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                let interval_ms = timer_inner.interval_ms.load(Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                let fresh_capacity = timer_inner.pending_capacity.load(Ordering::Relaxed);
                timer_inner.capacity.store(fresh_capacity, Ordering::Relaxed);
                *timer_inner.available.lock().await = fresh_capacity;
                timer_inner.refilled.notify_waiters();
            }
        });

        Arc::new(Self {
            inner,
            timer: Mutex::new(Some(handle)),
        })
    }

    /// Returns up to `count` tokens, never more than current capacity.
    /// Blocks on the next refill if the bucket is currently empty.
    pub async fn get(&self, count: u32, cancel: Option<CancellationToken>) -> Result<u32, ShareError> {
        loop {
            let mut guard = self.inner.available.lock().await;
            if *guard > 0 {
                let capacity = self.inner.capacity.load(Ordering::Relaxed);
                let take = count.min(*guard).min(capacity);
                *guard -= take;
                return Ok(take);
            }
            drop(guard);

            match &cancel {
                Some(tok) => {
                    tokio::select! {
                        _ = self.inner.refilled.notified() => {}
                        _ = tok.cancelled() => return Err(ShareError::Cancelled),
                    }
                }
                None => self.inner.refilled.notified().await,
            }
        }
    }

    /// Gives back `count` unused tokens, capped at the current capacity.
    pub async fn return_tokens(&self, count: u32) {
        let mut guard = self.inner.available.lock().await;
        let capacity = self.inner.capacity.load(Ordering::Relaxed);
        *guard = (*guard + count).min(capacity);
    }

    /// Changes capacity; the new ceiling and refill value apply starting at
    /// the next timer reset, not immediately.
    pub fn set_capacity(&self, new_capacity: u32) -> Result<(), ShareError> {
        if new_capacity < 1 {
            return Err(ShareError::ShareInitialization(
                "TokenBucket capacity must be >= 1".to_string(),
            ));
        }
        self.inner.pending_capacity.store(new_capacity, Ordering::Relaxed);
        Ok(())
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity.load(Ordering::Relaxed)
    }

    /// Stops the refill timer and releases anyone blocked in [`TokenBucket::get`].
    pub async fn dispose(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
        self.inner.refilled.notify_waiters();
    }
}
