//! Priority-based, work-stealing thread pool.

#[allow(clippy::module_inception)]
mod pool;
mod task;
mod worker;

#[cfg(test)]
mod tests;

pub use pool::{PoolBuilder, ThreadPool, default_thread_pool};
pub use task::{FunctionTask, Task, TaskFuture, TaskRef, YieldMode};
