//! Destruction observers.
//!
//! A [`Lifetime`] is owned by a watchable object; any number of
//! [`DestroyedFlag`]s can be handed out to observers. The flags become set
//! once the owner begins destruction, either explicitly via
//! [`Lifetime::set_destroying`] or implicitly when the `Lifetime` is dropped.
//! This is how events detect that a target queue's thread has exited, and how
//! queues detect that an event with pending callbacks has been destroyed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The watchable side: owned by the object whose destruction is observed.
#[derive(Debug, Default)]
pub struct Lifetime {
    destroyed: Arc<AtomicBool>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out an observer for this lifetime.
    pub fn destroyed_flag(&self) -> DestroyedFlag {
        DestroyedFlag {
            destroyed: self.destroyed.clone(),
        }
    }

    /// Marks the owner as destroying; every outstanding flag observes it.
    pub fn set_destroying(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn is_destroying(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.set_destroying();
    }
}

/// The observer side: becomes set once the watched object begins destruction.
#[derive(Debug, Clone)]
pub struct DestroyedFlag {
    destroyed: Arc<AtomicBool>,
}

impl DestroyedFlag {
    pub fn is_set(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_clear_while_owner_lives() {
        let lifetime = Lifetime::new();
        let flag = lifetime.destroyed_flag();
        assert!(!flag.is_set());
        assert!(!lifetime.is_destroying());
    }

    #[test]
    fn set_destroying_trips_every_flag() {
        let lifetime = Lifetime::new();
        let a = lifetime.destroyed_flag();
        let b = a.clone();
        lifetime.set_destroying();
        assert!(a.is_set());
        assert!(b.is_set());
    }

    #[test]
    fn dropping_the_owner_trips_flags() {
        let lifetime = Lifetime::new();
        let flag = lifetime.destroyed_flag();
        drop(lifetime);
        assert!(flag.is_set());
    }
}
