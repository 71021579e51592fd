//! # Error types for the thread pool and the event system.
//!
//! - [`PoolError`] — failures raised by the thread pool itself.
//! - [`TaskError`] — the failure side of a task's completion future.
//! - [`EventError`] — failures raised by events, handles and queues.

use thiserror::Error;

/// Errors produced by the thread pool.
///
/// `AlreadyActive` and `NoActiveTask` are internal invariant violations: the
/// pool surfaces them by panicking with their message rather than returning
/// them from a public operation.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// `start` was called on a pool with zero worker threads.
    #[error("thread pool has no worker threads")]
    NoThreads,

    /// A worker was asked to promote a task while one was already active.
    #[error("pool worker already has an active task")]
    AlreadyActive,

    /// A worker tried to release its active task slot while it was empty.
    #[error("pool worker has no active task to release")]
    NoActiveTask,
}

/// The failure side of a task's completion future.
///
/// `Cancelled` is not an execution failure: it records that a worker observed
/// the task cancelled and skipped it, so the future still completes.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task was cancelled before a worker ran it.
    #[error("task was cancelled before it ran")]
    Cancelled,

    /// The task body panicked; the payload is the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Errors produced by the event system.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventError {
    /// No handler is registered under the given subscription cookie.
    #[error("no handler is registered for this subscription cookie")]
    HandlerNotFound,

    /// A cross-thread delivery targeted a queue whose thread has exited.
    ///
    /// Suppressed when the event has `ignore_errors` set; the dead handler is
    /// dropped instead.
    #[error("the handler's event queue belongs to a thread that has exited")]
    QueueDestroyed,

    /// A handle operation was attempted after the event behind it was
    /// destroyed.
    #[error("the event behind this handle no longer exists")]
    NoControl,

    /// The event queue has been terminated and no longer accepts callbacks.
    #[error("the event queue has been terminated")]
    QueueTerminated,

    /// A tagged recursion site exceeded its maximum depth.
    #[error("maximum recursion depth for '{site}' exceeded")]
    TooDeep {
        /// The tagged site that tripped the limiter.
        site: &'static str,
    },
}
