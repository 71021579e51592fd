//! Tasks and their completion futures.
//!
//! A [`Task`] is the unit of work the pool schedules: cancellable, runnable,
//! and shared between the producer and the worker that runs it. The
//! [`FunctionTask`] adapter wraps a plain closure and resolves a one-shot
//! [`TaskFuture`] with the closure's value, the contained panic, or
//! [`TaskError::Cancelled`] when a worker skips the task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::TaskError;

/// Hint for long-running tasks on whether to cooperatively break out between
/// sub-units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldMode {
    #[default]
    NoYield,
    Yield,
}

/// A cancellable unit of work.
///
/// Workers check [`Task::cancelled`] immediately before running: a cancelled
/// task is never started, and [`Task::skipped`] is invoked instead so any
/// completion handle still resolves. A task already running is not
/// interrupted.
pub trait Task: Send + Sync {
    /// Executes the unit of work.
    fn run(&self, yield_mode: YieldMode);

    /// Atomically sets the cancellation flag; idempotent.
    fn cancel(&self);

    fn cancelled(&self) -> bool;

    /// Called by a worker that observed the task cancelled and skipped it.
    fn skipped(&self) {}
}

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

#[derive(Debug)]
struct FutureState<T> {
    outcome: Mutex<Option<Result<T, TaskError>>>,
    ready: Condvar,
}

/// One-shot blocking completion handle for a task.
///
/// Resolves after the task's body returns, after the task panics, or after a
/// worker skips the task because it was cancelled.
#[derive(Debug)]
pub struct TaskFuture<T> {
    state: Arc<FutureState<T>>,
}

impl<T> TaskFuture<T> {
    pub fn is_ready(&self) -> bool {
        self.state.outcome.lock().is_some()
    }

    /// Waits up to `timeout` for the task to resolve; does not consume the
    /// outcome. Returns whether the future is ready.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut outcome = self.state.outcome.lock();
        if outcome.is_none() {
            self.state.ready.wait_for(&mut outcome, timeout);
        }
        outcome.is_some()
    }

    /// Blocks until the task resolves and returns its outcome.
    pub fn wait(self) -> Result<T, TaskError> {
        let mut outcome = self.state.outcome.lock();
        while outcome.is_none() {
            self.state.ready.wait(&mut outcome);
        }
        outcome.take().expect("task future resolved without an outcome")
    }
}

/// Adapts a zero-argument closure into a [`Task`].
pub struct FunctionTask<T> {
    body: Mutex<Option<Box<dyn FnOnce() -> T + Send>>>,
    cancelled: AtomicBool,
    state: Arc<FutureState<T>>,
}

impl<T: Send + 'static> FunctionTask<T> {
    pub fn new(body: impl FnOnce() -> T + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Some(Box::new(body))),
            cancelled: AtomicBool::new(false),
            state: Arc::new(FutureState {
                outcome: Mutex::new(None),
                ready: Condvar::new(),
            }),
        })
    }

    /// Returns the completion future for this task.
    pub fn future(&self) -> TaskFuture<T> {
        TaskFuture {
            state: self.state.clone(),
        }
    }

    // First resolution wins; later ones are dropped.
    fn resolve(&self, outcome: Result<T, TaskError>) {
        let mut slot = self.state.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.state.ready.notify_all();
        }
    }
}

impl<T: Send + 'static> Task for FunctionTask<T> {
    fn run(&self, _yield_mode: YieldMode) {
        let Some(body) = self.body.lock().take() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => self.resolve(Ok(value)),
            Err(payload) => self.resolve(Err(TaskError::Panicked(panic_message(&*payload)))),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn skipped(&self) {
        self.resolve(Err(TaskError::Cancelled));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_resolves_the_future_with_the_value() {
        let task = FunctionTask::new(|| 42);
        let future = task.future();
        assert!(!future.is_ready());
        task.run(YieldMode::NoYield);
        assert!(future.is_ready());
        assert_eq!(future.wait(), Ok(42));
    }

    #[test]
    fn skipped_resolves_as_cancelled() {
        let task = FunctionTask::new(|| 1);
        let future = task.future();
        task.cancel();
        assert!(task.cancelled());
        task.skipped();
        assert_eq!(future.wait(), Err(TaskError::Cancelled));
    }

    #[test]
    fn cancel_is_idempotent() {
        let task = FunctionTask::new(|| ());
        task.cancel();
        task.cancel();
        assert!(task.cancelled());
    }

    #[test]
    fn panicking_body_resolves_as_panicked() {
        let task = FunctionTask::new(|| {
            panic!("boom");
        });
        let future = task.future();
        task.run(YieldMode::NoYield);
        assert_eq!(future.wait(), Err(TaskError::Panicked("boom".to_owned())));
    }

    #[test]
    fn wait_timeout_reports_readiness() {
        let task = FunctionTask::new(|| 7);
        let future = task.future();
        assert!(!future.wait_timeout(Duration::from_millis(10)));
        task.run(YieldMode::NoYield);
        assert!(future.wait_timeout(Duration::from_millis(10)));
        assert_eq!(future.wait(), Ok(7));
    }
}
