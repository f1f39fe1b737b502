//! Serial job queue.
//!
//! Store and installation mutations funnel through one [`JobQueue`]. A
//! single worker thread runs submitted work one item at a time in
//! submission order, so no two sync cycles ever touch the store
//! concurrently. Handler slots are plain locks set by the caller; each
//! cycle reads them once when it starts.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Work = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO execution context backed by one worker thread.
///
/// `submit_sync` blocks on a channel, so it must not be called from inside
/// an async runtime.
pub struct JobQueue {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Work>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl JobQueue {
    /// Starts a queue and its worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(name: impl Into<String>) -> SyncResult<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Work>();
        let queue_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(work) = receiver.blocking_recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                        error!(
                            queue = %queue_name,
                            panic = %panic_message(&*payload),
                            "job panicked"
                        );
                    }
                }
                debug!(queue = %queue_name, "job queue drained");
            })
            .map_err(|e| SyncError::JobPanicked(format!("cannot spawn worker: {e}")))?;

        Ok(Self {
            name,
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when called from the worker thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Returns true once the queue no longer accepts work.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Enqueues `work` and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueClosed`] after shutdown.
    pub fn submit_async(&self, work: impl FnOnce() + Send + 'static) -> SyncResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(SyncError::QueueClosed)?;
        sender
            .send(Box::new(work))
            .map_err(|_| SyncError::QueueClosed)
    }

    /// Runs `work` on the queue and waits for its result.
    ///
    /// Called from the worker thread itself, the work runs inline so that
    /// re-entrant calls cannot deadlock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueClosed`] after shutdown and
    /// [`SyncError::JobPanicked`] if `work` panicked.
    pub fn submit_sync<R: Send + 'static>(
        &self,
        work: impl FnOnce() -> R + Send + 'static,
    ) -> SyncResult<R> {
        if self.is_worker_thread() {
            return Ok(work());
        }

        let (tx, rx) = oneshot::channel();
        self.submit_async(move || {
            let _ = tx.send(work());
        })?;

        rx.blocking_recv().map_err(|_| {
            SyncError::JobPanicked(format!("work on queue {} did not return", self.name))
        })
    }

    /// Stops accepting work, lets queued work finish, and joins the worker.
    ///
    /// Called from the worker thread it only closes the queue.
    pub fn shutdown(&self) {
        let was_open = self.sender.lock().take().is_some();
        if was_open {
            debug!(queue = %self.name, "job queue shutting down");
        }

        if self.is_worker_thread() {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!(queue = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
