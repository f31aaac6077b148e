use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::WorkError;
use crate::headers::HeaderMap;
use crate::timestamp::Timestamp;

/// One unit of work dispatched to a worker.
#[derive(Debug, Clone)]
pub enum WorkItem {
    MigrateObject {
        bucket: String,
        container: String,
        key: String,
        /// Epoch seconds derived from the remote listing entry that produced
        /// this work item, fed into `resolve_write_timestamp` alongside the
        /// HEAD-derived timestamp.
        listing_ts: f64,
    },
    /// A DLO manifest object whose segments have already drained through the
    /// container queue: re-fetched and copied as a plain object, stamped
    /// with the timestamp resolved when the manifest was first deferred.
    MigrateManifestObject {
        bucket: String,
        container: String,
        key: String,
        ts: Timestamp,
    },
    UploadObject {
        container: String,
        key: String,
        headers: HeaderMap,
        body: Vec<u8>,
    },
}

impl WorkItem {
    pub fn container(&self) -> &str {
        match self {
            WorkItem::MigrateObject { container, .. } => container,
            WorkItem::MigrateManifestObject { container, .. } => container,
            WorkItem::UploadObject { container, .. } => container,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            WorkItem::MigrateObject { key, .. } => key,
            WorkItem::MigrateManifestObject { key, .. } => key,
            WorkItem::UploadObject { key, .. } => key,
        }
    }
}

/// The primary queue is bounded to apply backpressure on the enumerator; the
/// verify queue is unbounded because its work is already fully materialized
/// before the verify phase starts.
pub struct Queues {
    pub primary_tx: mpsc::Sender<WorkItem>,
    pub primary_rx: mpsc::Receiver<WorkItem>,
    pub verify_tx: mpsc::UnboundedSender<WorkItem>,
    pub verify_rx: mpsc::UnboundedReceiver<WorkItem>,
}

impl Queues {
    pub fn new(max_conns: usize) -> Self {
        let (primary_tx, primary_rx) = mpsc::channel(2 * max_conns.max(1));
        let (verify_tx, verify_rx) = mpsc::unbounded_channel();
        Self {
            primary_tx,
            primary_rx,
            verify_tx,
            verify_rx,
        }
    }

    /// Best-effort non-blocking enqueue onto the primary queue, falling back
    /// to an awaited send when the queue is full. This is the asynchronous
    /// analogue of the original's `block=False` enqueue with an inline
    /// synchronous fallback: it keeps the enumerator from starving other
    /// primary-queue producers while still guaranteeing delivery.
    pub async fn enqueue_primary(&self, item: WorkItem) {
        match self.primary_tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                let _ = self.primary_tx.send(item).await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("primary queue closed, dropping work item");
            }
        }
    }

    pub fn enqueue_verify(&self, item: WorkItem) {
        let _ = self.verify_tx.send(item);
    }
}

/// Drains `rx` with up to `workers` handler invocations running
/// concurrently, calling `handler` for each item. A handler failure is
/// captured into the returned list rather than propagated — per-item
/// failures must never kill a worker or abort the drain.
pub async fn drain<H, Fut>(mut rx: impl ReceiveWork, workers: usize, handler: Arc<H>) -> Vec<WorkError>
where
    H: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set: JoinSet<Option<WorkError>> = JoinSet::new();
    let mut errors = Vec::new();

    loop {
        tokio::select! {
            biased;
            Some(result) = join_set.join_next(), if !join_set.is_empty() => {
                if let Ok(Some(err)) = result {
                    errors.push(err);
                }
            }
            item = rx.recv() => {
                match item {
                    Some(item) => {
                        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                        let handler = handler.clone();
                        let container = item.container().to_string();
                        let key = item.key().to_string();
                        join_set.spawn(async move {
                            let _permit = permit;
                            handler(item).await.err().map(|error| WorkError { container, key, error })
                        });
                    }
                    None => break,
                }
            }
        }
    }

    while let Some(result) = join_set.join_next().await {
        if let Ok(Some(err)) = result {
            errors.push(err);
        }
    }

    errors
}

/// Abstracts over the bounded/unbounded receiver halves so [`drain`] works
/// against either the primary or the verify queue.
pub trait ReceiveWork: Send {
    fn recv(&mut self) -> impl Future<Output = Option<WorkItem>> + Send;
}

impl ReceiveWork for mpsc::Receiver<WorkItem> {
    fn recv(&mut self) -> impl Future<Output = Option<WorkItem>> + Send {
        mpsc::Receiver::recv(self)
    }
}

impl ReceiveWork for mpsc::UnboundedReceiver<WorkItem> {
    fn recv(&mut self) -> impl Future<Output = Option<WorkItem>> + Send {
        mpsc::UnboundedReceiver::recv(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drains_all_items_and_collects_errors() {
        let queues = Queues::new(2);
        for i in 0..5 {
            queues
                .enqueue_primary(WorkItem::MigrateObject {
                    bucket: "b".into(),
                    container: "c".into(),
                    key: format!("k{i}"),
                    listing_ts: 0.0,
                })
                .await;
        }
        drop(queues.primary_tx);

        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = processed.clone();
        let handler = Arc::new(move |item: WorkItem| {
            let processed = processed_clone.clone();
            async move {
                processed.fetch_add(1, Ordering::SeqCst);
                if item.key() == "k2" {
                    Err(crate::error::Error::Generic("boom".into()))
                } else {
                    Ok(())
                }
            }
        });

        let errors = drain(queues.primary_rx, 3, handler).await;
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "k2");
    }
}
