//! Background execution of command batches on the worker pool.
//!
//! A batch submitted here runs with exactly the same ordering as
//! [`run_all`](crate::app::shell::batch::run_all), off the caller's thread,
//! and resolves to one [`BatchResult`]. Completion is delivered on a worker
//! thread; callers that need a particular thread must hand the result over
//! themselves.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{error, info};

use crate::app::error::{AppError, ERR_INTERRUPTED};
use crate::app::models::BatchOutcome;
use crate::app::shell::batch::{new_trace_id, run_all};
use crate::app::shell::pool::{WorkerPool, POOL_SHUT_DOWN_MESSAGE};
use crate::app::shell::runner::CommandRunner;

/// A failed batch. `outcome` holds the per-command results when the batch
/// actually ran; it is `None` when it never started or its body panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub error: AppError,
    pub outcome: Option<BatchOutcome>,
}

impl BatchFailure {
    pub fn from_error(error: AppError) -> Self {
        Self {
            error,
            outcome: None,
        }
    }

    fn from_outcome(outcome: BatchOutcome) -> Self {
        match outcome.clone().into_result() {
            Err(error) => Self {
                error,
                outcome: Some(outcome),
            },
            Ok(_) => Self {
                error: AppError::system("Batch reported failure without failed commands", outcome.trace_id.clone()),
                outcome: Some(outcome),
            },
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for BatchFailure {}

impl From<AppError> for BatchFailure {
    fn from(error: AppError) -> Self {
        Self::from_error(error)
    }
}

pub type BatchResult = Result<BatchOutcome, BatchFailure>;

/// Receiving end of a submitted batch.
pub struct BatchTicket {
    trace_id: String,
    receiver: Receiver<BatchResult>,
}

impl BatchTicket {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn dropped(&self) -> BatchResult {
        Err(BatchFailure::from_error(AppError::system(
            "Batch was dropped before completion",
            self.trace_id.clone(),
        )))
    }

    /// Blocks until the batch resolves.
    pub fn wait(self) -> BatchResult {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => self.dropped(),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<BatchResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.dropped()),
        }
    }

    pub fn try_result(&self) -> Option<BatchResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.dropped()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    runner: Arc<dyn CommandRunner>,
}

impl Dispatcher {
    pub fn new(pool: Arc<WorkerPool>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { pool, runner }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Runs `commands` on the pool and hands the result to `on_complete`
    /// exactly once. If the pool no longer accepts work the callback runs
    /// immediately on the caller's thread.
    pub fn run_all_with<F>(&self, commands: Vec<String>, trace_id: String, on_complete: F)
    where
        F: FnOnce(BatchResult) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(on_complete)));
        let deliver = {
            let slot = Arc::clone(&slot);
            move |result: BatchResult| {
                let callback = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(callback) = callback {
                    callback(result);
                }
            }
        };

        let runner = Arc::clone(&self.runner);
        let job_trace = trace_id.clone();
        let job_deliver = deliver.clone();
        let submitted = self.pool.submit(Box::new(move |cancel| {
            if cancel.is_cancelled() {
                job_deliver(Err(BatchFailure::from_error(AppError::new(
                    ERR_INTERRUPTED,
                    POOL_SHUT_DOWN_MESSAGE,
                    job_trace,
                ))));
                return;
            }
            let body = catch_unwind(AssertUnwindSafe(|| run_all(runner.as_ref(), &commands, &job_trace)));
            let result = match body {
                Ok(outcome) if outcome.success() => Ok(outcome),
                Ok(outcome) => Err(BatchFailure::from_outcome(outcome)),
                Err(payload) => {
                    let message = format!("Error executing commands: {}", panic_message(payload.as_ref()));
                    error!(trace_id = %job_trace, "{message}");
                    Err(BatchFailure::from_error(AppError::system(message, job_trace.clone())))
                }
            };
            job_deliver(result);
        }));

        if let Err(err) = submitted {
            info!(trace_id = %trace_id, "batch rejected: {}", err.error);
            deliver(Err(BatchFailure::from_error(AppError::new(
                err.code,
                err.error,
                trace_id,
            ))));
        }
    }

    pub fn run_all_async(&self, commands: Vec<String>) -> BatchTicket {
        self.run_all_async_traced(commands, new_trace_id())
    }

    pub fn run_all_async_traced(&self, commands: Vec<String>, trace_id: String) -> BatchTicket {
        self.run_all_async_inspect(commands, trace_id, |_| {})
    }

    /// Like [`run_all_async_traced`](Self::run_all_async_traced), but `inspect`
    /// sees the result on the worker thread before the ticket resolves.
    pub fn run_all_async_inspect<F>(&self, commands: Vec<String>, trace_id: String, inspect: F) -> BatchTicket
    where
        F: FnOnce(&BatchResult) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        self.run_all_with(commands, trace_id.clone(), move |result| {
            inspect(&result);
            let _ = sender.send(result);
        });
        BatchTicket { trace_id, receiver }
    }

    pub fn run_one_async(&self, command: impl Into<String>) -> BatchTicket {
        self.run_all_async(vec![command.into()])
    }

    /// A ticket that is already resolved, for requests rejected before submission.
    pub fn resolved(trace_id: String, result: BatchResult) -> BatchTicket {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(result);
        BatchTicket { trace_id, receiver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::PoolSettings;
    use crate::app::models::CommandResult;
    use crate::app::shell::testing::ScriptedRunner;
    use std::thread;

    fn dispatcher_with(runner: ScriptedRunner) -> (Dispatcher, Arc<ScriptedRunner>) {
        let pool = Arc::new(WorkerPool::new(&PoolSettings::default()).expect("pool"));
        let runner = Arc::new(runner);
        (Dispatcher::new(pool, runner.clone()), runner)
    }

    #[test]
    fn successful_batch_resolves_with_last_result() {
        let (dispatcher, runner) = dispatcher_with(ScriptedRunner::new(|command| {
            CommandResult::completed(0, format!("ran {command}"), "")
        }));
        let ticket = dispatcher.run_all_async(vec![
            "wm density 320".to_string(),
            "wm size 720x1280".to_string(),
        ]);
        let outcome = ticket.wait().expect("batch success");
        assert_eq!(outcome.summary_result().stdout, "ran wm size 720x1280");
        assert_eq!(runner.calls(), vec!["wm density 320", "wm size 720x1280"]);
    }

    #[test]
    fn failed_batch_keeps_running_and_reports_every_failure() {
        let (dispatcher, runner) = dispatcher_with(ScriptedRunner::new(|command| {
            if command.ends_with("fail") {
                CommandResult::completed(1, "", "nope")
            } else {
                CommandResult::completed(0, "", "")
            }
        }));
        let ticket = dispatcher.run_all_async(vec![
            "settings put global a fail".to_string(),
            "settings put global b 1".to_string(),
            "settings put global c fail".to_string(),
        ]);
        let trace_id = ticket.trace_id().to_string();
        let failure = ticket.wait().expect_err("expected failure");

        assert_eq!(runner.calls().len(), 3);
        assert_eq!(failure.error.trace_id, trace_id);
        assert_eq!(
            failure.error.error,
            "Command failed: settings put global a fail | Error: nope\nCommand failed: settings put global c fail | Error: nope\n"
        );
        let outcome = failure.outcome.expect("outcome");
        assert_eq!(outcome.failures().count(), 2);
    }

    #[test]
    fn panic_in_batch_body_is_routed_to_error() {
        let (dispatcher, _runner) = dispatcher_with(ScriptedRunner::new(|_| panic!("runner exploded")));
        let failure = dispatcher
            .run_one_async("wm size")
            .wait()
            .expect_err("expected failure");
        assert_eq!(failure.error.error, "Error executing commands: runner exploded");
        assert!(failure.outcome.is_none());

        let (ok_dispatcher, _) = dispatcher_with(ScriptedRunner::succeeding());
        assert!(ok_dispatcher.run_one_async("wm size").wait().is_ok());
    }

    #[test]
    fn callback_runs_off_the_caller_thread() {
        let (dispatcher, _runner) = dispatcher_with(ScriptedRunner::succeeding());
        let caller = thread::current().id();
        let (sender, receiver) = mpsc::channel();
        dispatcher.run_all_with(vec!["am kill-all".to_string()], "trace-cb".to_string(), move |result| {
            let _ = sender.send((thread::current().id(), result.is_ok()));
        });
        let (callback_thread, ok) = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("callback");
        assert!(ok);
        assert_ne!(callback_thread, caller);
    }

    #[test]
    fn submission_after_shutdown_resolves_immediately() {
        let (dispatcher, runner) = dispatcher_with(ScriptedRunner::succeeding());
        dispatcher.pool.shutdown();
        let ticket = dispatcher.run_one_async("am kill-all");
        let failure = ticket
            .try_result()
            .expect("resolved")
            .expect_err("expected failure");
        assert_eq!(failure.error.error, POOL_SHUT_DOWN_MESSAGE);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn wait_timeout_returns_none_while_pending() {
        let (dispatcher, _runner) = dispatcher_with(ScriptedRunner::new(|_| {
            thread::sleep(Duration::from_millis(300));
            CommandResult::completed(0, "", "")
        }));
        let ticket = dispatcher.run_one_async("wm size");
        assert!(ticket.wait_timeout(Duration::from_millis(10)).is_none());
        assert!(ticket
            .wait_timeout(Duration::from_secs(5))
            .expect("resolved")
            .is_ok());
    }
}
