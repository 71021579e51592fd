//! Typed event system with per-thread asynchronous delivery queues.

#[allow(clippy::module_inception)]
mod event;
mod handle;
mod mutex;
mod queue;
mod recursion;


pub use event::{ClientId, Event, EventArgs, EventId, EventRef, TriggerType};
pub use handle::{EventHandle, Sink};
pub use mutex::{ThreadingMode, set_threading_mode};
pub use queue::{AsyncEventQueue, EventFilter, FilterId};
