use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::app::config::PoolSettings;
use crate::app::error::AppError;
use crate::app::shell::runner::CancelToken;

pub const POOL_SHUT_DOWN_MESSAGE: &str = "Worker pool shut down";

/// A unit of work. It receives the pool's cancellation token so queued work
/// can bail out once a forced shutdown has begun.
pub type Job = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts running worker threads so shutdown can wait on them with a deadline.
struct LiveWorkers {
    count: Mutex<usize>,
    cv: Condvar,
}

impl LiveWorkers {
    fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut count = lock(&self.count);
        *count = count.saturating_sub(1);
        self.cv.notify_all();
    }

    fn current(&self) -> usize {
        *lock(&self.count)
    }

    /// Returns true when every worker exited within `timeout`.
    fn wait_until_idle(&self, timeout: Duration) -> bool {
        let guard = lock(&self.count);
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == 0
    }
}

struct LivePermit {
    live: Arc<LiveWorkers>,
}

impl Drop for LivePermit {
    fn drop(&mut self) {
        self.live.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker finished inside the grace period.
    pub graceful: bool,
    /// Workers still running after the forced phase; they are detached.
    pub stragglers: usize,
}

/// Fixed set of named worker threads fed from one job queue.
///
/// The pool is an owned value: whoever constructs it is responsible for
/// calling [`WorkerPool::shutdown`] (dropping it does the same).
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    live: Arc<LiveWorkers>,
    cancel: CancelToken,
    grace: Duration,
    forced_grace: Duration,
}

impl WorkerPool {
    pub fn new(settings: &PoolSettings) -> Result<Self, AppError> {
        let size = settings.workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let live = Arc::new(LiveWorkers::new(0));
        let cancel = CancelToken::new();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let cancel = cancel.clone();
            *lock(&live.count) += 1;
            let permit = LivePermit {
                live: Arc::clone(&live),
            };
            let handle = std::thread::Builder::new()
                .name(format!("tuner-worker-{index}"))
                .spawn(move || worker_loop(receiver, cancel, permit))
                .map_err(|err| AppError::system(format!("Failed to spawn worker: {err}"), ""))?;
            workers.push(handle);
        }
        debug!(workers = size, "worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            live,
            cancel,
            grace: Duration::from_millis(settings.shutdown_grace_ms),
            forced_grace: Duration::from_millis(settings.forced_grace_ms),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.sender).is_none()
    }

    pub fn live_workers(&self) -> usize {
        self.live.current()
    }

    pub fn submit(&self, job: Job) -> Result<(), AppError> {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return Err(AppError::system(POOL_SHUT_DOWN_MESSAGE, ""));
        };
        sender
            .send(job)
            .map_err(|_| AppError::system(POOL_SHUT_DOWN_MESSAGE, ""))
    }

    /// Stops accepting work, lets queued and running jobs finish within the
    /// grace period, then cancels whatever is left.
    pub fn shutdown(&self) -> ShutdownReport {
        let had_sender = lock(&self.sender).take().is_some();
        let mut workers = std::mem::take(&mut *lock(&self.workers));
        if !had_sender && workers.is_empty() {
            return ShutdownReport {
                graceful: true,
                stragglers: 0,
            };
        }

        let graceful = self.live.wait_until_idle(self.grace);
        let mut idle = graceful;
        if !graceful {
            warn!(
                grace_ms = self.grace.as_millis() as u64,
                "worker pool did not drain gracefully, forcing shutdown"
            );
            self.cancel.cancel();
            idle = self.live.wait_until_idle(self.forced_grace);
            if !idle {
                error!("worker pool did not terminate after forced shutdown");
            }
        }

        let mut stragglers = 0;
        for handle in workers.drain(..) {
            // Once the live count hits zero every worker is past its loop.
            if idle || handle.is_finished() {
                let _ = handle.join();
            } else {
                stragglers += 1;
            }
        }
        info!(graceful, stragglers, "worker pool shut down");
        ShutdownReport {
            graceful,
            stragglers,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>, cancel: CancelToken, _permit: LivePermit) {
    loop {
        let next = lock(&receiver).recv();
        let Ok(job) = next else {
            break;
        };
        if catch_unwind(AssertUnwindSafe(|| job(&cancel))).is_err() {
            error!("worker job panicked");
        }
    }
}
