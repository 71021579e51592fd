//! # eventide
//!
//! A concurrency and eventing runtime: a priority-based, work-stealing
//! thread pool executing cancellable tasks, coupled with a typed event
//! system that delivers callbacks across threads through per-thread queues.
//!
//! | Area            | Description                                                    | Key types                                  |
//! |-----------------|----------------------------------------------------------------|--------------------------------------------|
//! | **Thread pool** | Fixed-width pool, per-worker priority queues, work stealing.   | [`ThreadPool`], [`PoolBuilder`]            |
//! | **Tasks**       | Cancellable units of work with one-shot completion futures.    | [`Task`], [`FunctionTask`], [`TaskFuture`] |
//! | **Events**      | Typed multicast with sync/async triggers, filters, acceptance. | [`Event`], [`TriggerType`], [`EventRef`]   |
//! | **Queues**      | Per-thread delivery queues drained from the owner's main loop. | [`AsyncEventQueue`]                        |
//! | **Lifetimes**   | Subscription handles, sinks, destruction observers.            | [`EventHandle`], [`Sink`], [`Lifetime`]    |
//! | **Errors**      | Typed errors per subsystem.                                    | [`PoolError`], [`TaskError`], [`EventError`] |
//!
//! ## Example
//!
//! ```
//! use eventide::{Event, ThreadPool};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ThreadPool::builder().worker_threads(2).build();
//! let (future, _task) = pool.run(|| 2 + 2, 0)?;
//! assert_eq!(future.wait(), Ok(4));
//!
//! let changed = Event::<u32>::new();
//! let seen = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
//! let sink = seen.clone();
//! let _handle = changed.subscribe(move |value| {
//!     sink.store(*value, std::sync::atomic::Ordering::SeqCst);
//! });
//! changed.trigger(7)?;
//! assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 7);
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading model
//!
//! Any thread may trigger any event. A handler runs inline when it was
//! subscribed on the emitting thread (or tagged
//! [`EventHandle::same_thread_as_emitter`]); otherwise a callback record is
//! queued on the subscriber thread's [`AsyncEventQueue`], which that thread
//! drains by calling [`AsyncEventQueue::exec`] from its main loop. Hosts
//! that are strictly single-threaded can elide event locking via
//! [`set_threading_mode`].

pub mod cookie;
pub mod error;
pub mod event;
pub mod lifetime;
pub mod pool;

pub use cookie::Cookie;
pub use error::{EventError, PoolError, TaskError};
pub use event::{
    AsyncEventQueue, ClientId, Event, EventArgs, EventFilter, EventHandle, EventId, EventRef,
    FilterId, Sink, ThreadingMode, TriggerType, set_threading_mode,
};
pub use lifetime::{DestroyedFlag, Lifetime};
pub use pool::{
    FunctionTask, PoolBuilder, Task, TaskFuture, TaskRef, ThreadPool, YieldMode,
    default_thread_pool,
};
