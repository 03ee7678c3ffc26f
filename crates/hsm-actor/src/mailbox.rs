//! # Serialized Mailbox
//!
//! A FIFO queue of work items serviced by at most one worker task at a time.
//! Everything enqueued on one mailbox runs sequentially in enqueue order,
//! which turns the owner of the mailbox into a logical single-threaded
//! island: no two of its work items ever overlap.
//!
//! The worker is spawned lazily on the first enqueue and parks itself when
//! the queue stays empty for the configured idle timeout. The next enqueue
//! respawns it. Spawn and park decisions are taken under the queue lock so
//! an enqueue can never race a worker into oblivion.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::trace;

use crate::error::MailboxError;

/// Default time a worker waits for new work before parking.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(20);

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the mailbox whose worker is driving the current task.
    static ACTIVE_MAILBOX: u64;
}

/// Construction options for a [`Mailbox`].
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Name used in worker lifecycle logs.
    pub label: String,
    /// How long an idle worker lingers before parking.
    pub idle_timeout: Duration,
}

impl MailboxConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self::new("mailbox")
    }
}

/// A serialized work queue with a lazily spawned worker.
///
/// Cloning a `Mailbox` clones a handle to the same queue.
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    label: String,
    idle_timeout: Duration,
    queue: Mutex<QueueState>,
    wake: Notify,
}

struct QueueState {
    jobs: VecDeque<Job>,
    worker_live: bool,
}

impl Mailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed),
                label: config.label,
                idle_timeout: config.idle_timeout,
                queue: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    worker_live: false,
                }),
                wake: Notify::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Appends a work item. The item never runs on the calling task; a
    /// worker is spawned if none is live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let spawn_worker = {
            let mut queue = self.inner.queue.lock();
            queue.jobs.push_back(Box::new(job));
            !std::mem::replace(&mut queue.worker_live, true)
        };
        if spawn_worker {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(ACTIVE_MAILBOX.scope(inner.id, run_worker(inner)));
        }
        self.inner.wake.notify_one();
    }

    /// Enqueues `f` and resolves with its result once it has run.
    ///
    /// The returned future fails with [`MailboxError::Discarded`] if the
    /// item is cleared from the queue before it gets a chance to run.
    pub fn execute<R, F>(&self, f: F) -> impl Future<Output = Result<R, MailboxError>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(move || {
            let _ = tx.send(f());
        });
        async move { rx.await.map_err(|_| MailboxError::Discarded) }
    }

    /// Waits until every item enqueued before this call has run, by pushing
    /// a sentinel through the queue and awaiting it.
    pub async fn wait(&self) {
        let _ = self.execute(|| ()).await;
    }

    /// Discards all queued items that have not started. The currently
    /// executing item, if any, is not interrupted. Returns the number of
    /// items dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.queue.lock();
        let dropped = queue.jobs.len();
        queue.jobs.clear();
        dropped
    }

    /// Number of queued items not yet started.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff the caller is running inside this mailbox's worker.
    pub fn is_current(&self) -> bool {
        ACTIVE_MAILBOX
            .try_with(|id| *id == self.inner.id)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("label", &self.inner.label)
            .field("queued", &self.len())
            .finish()
    }
}

async fn run_worker(inner: Arc<Inner>) {
    trace!(mailbox = %inner.label, "worker started");
    loop {
        let job = inner.queue.lock().jobs.pop_front();
        if let Some(job) = job {
            job();
            continue;
        }
        let woken = inner.wake.notified();
        if !inner.queue.lock().jobs.is_empty() {
            continue;
        }
        if tokio::time::timeout(inner.idle_timeout, woken).await.is_err() {
            let mut queue = inner.queue.lock();
            if queue.jobs.is_empty() {
                queue.worker_live = false;
                trace!(mailbox = %inner.label, "worker parked");
                return;
            }
        }
    }
}
