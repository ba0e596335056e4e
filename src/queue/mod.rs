//! Serial Update Queue
//!
//! Payloads arrive from the transport faster than they can be applied, and
//! applying one is asynchronous. The queue turns that burst into a strictly
//! ordered stream: one task in flight, tasks start in the order they were
//! enqueued, and a failed task only rejects its own result.
//!
//! # Example
//! ```no_run
//! use quicksilver_hmr::queue::SerialQueue;
//!
//! # async fn demo() -> quicksilver_hmr::Result<()> {
//! let queue = SerialQueue::new();
//! let first = queue.enqueue(|| async { Ok(1) });
//! let second = queue.enqueue(|| async { Ok(2) });
//! assert_eq!(first.await? + second.await?, 3);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A queued task, already bound to its result channel
type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Default)]
struct QueueState {
    /// Tasks accepted but not yet started
    pending: AtomicUsize,
    /// Whether a task is currently running
    busy: AtomicBool,
}

/// FIFO executor running one async task at a time
pub struct SerialQueue {
    sender: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
    limit: Option<NonZeroUsize>,
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("pending", &self.pending())
            .field("busy", &self.is_busy())
            .field("limit", &self.limit)
            .finish()
    }
}

impl SerialQueue {
    /// Create an unbounded queue
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a queue holding at most `limit` waiting tasks
    ///
    /// Once the limit is reached the newest task is rejected with
    /// [`Error::QueueFull`]; nothing already queued is dropped. The limit
    /// counts waiting tasks only, so an idle queue always accepts one.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_limit(limit: Option<NonZeroUsize>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(run_worker(receiver, Arc::clone(&state)));
        Self { sender, state, limit }
    }

    /// Append a task and get a future for its result
    ///
    /// The task is queued when this method is called, not when the returned
    /// future is first polled. Dropping the returned future does not cancel
    /// the task.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let queued = self.push(task, result_tx);

        async move {
            queued?;
            result_rx.await.map_err(|_| Error::QueueClosed)?
        }
    }

    fn push<F, Fut, T>(&self, task: F, result_tx: oneshot::Sender<Result<T>>) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.reserve()?;

        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await;
                let result = outcome.unwrap_or_else(|panic| {
                    Err(Error::TaskPanicked(panic_message(panic.as_ref())))
                });
                // The caller may have dropped its handle
                let _ = result_tx.send(result);
            }
            .boxed()
        });

        self.sender.send(job).map_err(|_| {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            Error::QueueClosed
        })
    }

    fn reserve(&self) -> Result<()> {
        let limit = self.limit;
        self.state
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| match limit {
                Some(limit) if pending >= limit.get() => None,
                _ => Some(pending + 1),
            })
            .map(|_| ())
            .map_err(|_| Error::QueueFull {
                limit: limit.map_or(0, NonZeroUsize::get),
            })
    }

    /// Tasks waiting to start
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Whether a task is running right now
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// Maximum number of waiting tasks, if bounded
    pub fn limit(&self) -> Option<NonZeroUsize> {
        self.limit
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<Job>, state: Arc<QueueState>) {
    while let Some(job) = receiver.recv().await {
        state.pending.fetch_sub(1, Ordering::SeqCst);
        state.busy.store(true, Ordering::SeqCst);
        tracing::trace!(pending = state.pending.load(Ordering::SeqCst), "queue task started");
        job().await;
        state.busy.store(false, Ordering::SeqCst);
        tracing::trace!("queue task settled");
    }
    tracing::trace!("update queue closed");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
