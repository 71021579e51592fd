//! The process-wide, switchable, recursive event mutex.
//!
//! All event-system state transitions happen under this lock: dispatch
//! bookkeeping, queue mutation, subscription changes. It is recursive so
//! that handlers re-entering the event system (nested triggers, subscribe
//! from a handler) never self-deadlock, and it is *switchable*: a host that
//! is single-threaded can elide locking entirely. The mode freezes at the
//! first lock.
//!
//! The guard is always released around the invocation of user callables.

use std::sync::OnceLock;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Threading mode of the event system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingMode {
    /// Event state is protected by a real recursive mutex.
    MultiThreaded,
    /// Locking is elided; the host guarantees single-threaded use.
    SingleThreaded,
}

static MODE: OnceLock<ThreadingMode> = OnceLock::new();
static GLOBAL: ReentrantMutex<()> = ReentrantMutex::new(());

/// Selects the event system's threading mode.
///
/// Must be called before the event system is first used; returns `false` if
/// the mode was already frozen to a different value.
pub fn set_threading_mode(mode: ThreadingMode) -> bool {
    MODE.set(mode).is_ok() || *MODE.get().expect("threading mode unset after set") == mode
}

pub(crate) fn threading_mode() -> ThreadingMode {
    *MODE.get_or_init(|| ThreadingMode::MultiThreaded)
}

/// Guard over the global event mutex; a no-op in single-threaded mode.
pub(crate) struct EventLock {
    _guard: Option<ReentrantMutexGuard<'static, ()>>,
}

pub(crate) fn event_lock() -> EventLock {
    let guard = match threading_mode() {
        ThreadingMode::MultiThreaded => Some(GLOBAL.lock()),
        ThreadingMode::SingleThreaded => None,
    };
    EventLock { _guard: guard }
}
