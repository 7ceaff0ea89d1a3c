use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type BoxedTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// FIFO queue drained by a single worker task.
///
/// Tasks run one at a time, in enqueue order. The worker yields to the
/// executor after each task. Tasks record their own outcome; the queue never
/// sees errors.
#[derive(Clone)]
pub struct SerialTaskQueue {
    sender: flume::Sender<BoxedTask>,
    pending: Arc<AtomicUsize>,
}

impl Default for SerialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded::<BoxedTask>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        async_std::task::spawn(async move {
            while let Ok(task) = receiver.recv_async().await {
                task().await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);
                async_std::task::yield_now().await;
            }
            tracing::debug!("Task queue closed");
        });

        Self { sender, pending }
    }

    /// Append a task. Returns immediately.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let boxed: BoxedTask = Box::new(move || Box::pin(task()));
        if self.sender.send(boxed).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Task queue worker is gone, task dropped");
        }
    }

    /// Number of tasks enqueued but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolves once every task enqueued before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = flume::bounded::<()>(1);
        self.enqueue(move || async move {
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv_async().await;
    }
}
