use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Handler<T> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// A named handle over one bounded channel shared by a handler task.
/// Multiple `ChannelReader`s may wrap the same receiver so several worker
/// tasks fan out over one channel -- this is how the scanner distributes
/// directory-walk work across its worker pool.
pub struct ChannelReader<T> {
    name: String,
    receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>,
    handler: Handler<T>,
    on_error: Option<ErrorCallback>,
    completed_tx: watch::Sender<bool>,
    completed_rx: watch::Receiver<bool>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
    failed: Arc<std::sync::atomic::AtomicBool>,
}

impl<T> fmt::Debug for ChannelReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("name", &self.name)
            .field("failed", &self.failed.load(std::sync::atomic::Ordering::Relaxed))
            .finish()
    }
}

impl<T> ChannelReader<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(
        name: impl Into<String>,
        receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>,
        handler: F,
    ) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (completed_tx, completed_rx) = watch::channel(false);
        Self {
            name: name.into(),
            receiver,
            handler: Arc::new(move |item| Box::pin(handler(item))),
            on_error: None,
            completed_tx,
            completed_rx,
            task: AsyncMutex::new(None),
            failed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn with_error_callback<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Spawns the background drain task. Reads items until the channel is
    /// closed by every sender dropping, invoking the handler on each. A
    /// handler error is reported via the error callback and also fails
    /// [`ChannelReader::completed`], but draining continues so the channel
    /// always empties.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            this.drain().await;
        }));
    }

    async fn drain(&self) {
        loop {
            // The channel may close between this check and the read below;
            // that race is benign, the subsequent recv simply returns None.
            let mut receiver = self.receiver.lock().await;
            let item = receiver.recv().await;
            drop(receiver);
            match item {
                Some(item) => {
                    if let Err(err) = (self.handler)(item).await {
                        warn!(reader = %self.name, error = %err, "channel reader handler failed");
                        self.failed.store(true, std::sync::atomic::Ordering::Relaxed);
                        if let Some(cb) = &self.on_error {
                            cb(&err);
                        }
                    }
                }
                None => break,
            }
        }
        debug!(reader = %self.name, "channel reader drained");
        let _ = self.completed_tx.send(true);
    }

    /// Resolves once draining has finished, regardless of whether any
    /// handler invocation failed. Check [`ChannelReader::has_failed`] for
    /// outcome.
    pub async fn completed(&self) {
        let mut rx = self.completed_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
