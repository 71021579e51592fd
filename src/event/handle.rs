//! Subscription handles and the sink that aggregates them.
//!
//! A handle shares ownership of the event's control point — the only stable
//! thing between a handle and an event that may die first. The control point
//! is the weak side of the event's shared state: once the event is
//! destroyed, every outstanding handle observes `valid() == false` and its
//! drop becomes a no-op.

use std::sync::Weak;

use crate::cookie::Cookie;
use crate::error::EventError;
use crate::event::event::EventTarget;

/// A handle to one event subscription.
///
/// The handle returned by `Event::subscribe` is *primary*: dropping it
/// removes the subscription outright. Clones are non-primary; they only
/// release their cookie reference, and the subscription is removed when the
/// count reaches zero.
pub struct EventHandle {
    control: Weak<dyn EventTarget>,
    cookie: Cookie,
    primary: bool,
}

impl EventHandle {
    pub(crate) fn new(control: Weak<dyn EventTarget>, cookie: Cookie, primary: bool) -> Self {
        Self {
            control,
            cookie,
            primary,
        }
    }

    /// The subscription cookie.
    pub fn id(&self) -> Cookie {
        self.cookie
    }

    /// Whether the event behind this handle still exists.
    pub fn valid(&self) -> bool {
        self.control.upgrade().is_some()
    }

    pub fn primary(&self) -> bool {
        self.primary
    }

    /// Number of live handles sharing this subscription.
    pub fn use_count(&self) -> u32 {
        self.control
            .upgrade()
            .map(|event| event.use_count(self.cookie))
            .unwrap_or(0)
    }

    /// Tags the handler for delivery on the emitter's thread: it is invoked
    /// inline even when the subscribing thread's queue differs.
    pub fn same_thread_as_emitter(self) -> Result<Self, EventError> {
        let event = self.control.upgrade().ok_or(EventError::NoControl)?;
        event.set_same_thread_as_emitter(self.cookie)?;
        Ok(self)
    }

    /// Tags the handler stateless: pending queued deliveries may collapse to
    /// the newest one.
    pub fn stateless(self) -> Result<Self, EventError> {
        let event = self.control.upgrade().ok_or(EventError::NoControl)?;
        event.set_stateless(self.cookie)?;
        Ok(self)
    }
}

impl Clone for EventHandle {
    fn clone(&self) -> Self {
        if let Some(event) = self.control.upgrade() {
            // A stale cookie means the subscription is already gone; the
            // clone is inert but harmless.
            let _ = event.add_ref(self.cookie);
        }
        Self {
            control: self.control.clone(),
            cookie: self.cookie,
            primary: false,
        }
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        let Some(event) = self.control.upgrade() else {
            return;
        };
        if self.primary {
            let _ = event.unsubscribe_cookie(self.cookie);
        } else {
            event.release(self.cookie);
        }
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("cookie", &self.cookie)
            .field("primary", &self.primary)
            .field("valid", &self.valid())
            .finish()
    }
}

/// Owns a group of handles and releases them together on drop.
///
/// The idiomatic way for a subscriber to tie its subscriptions to its own
/// lifetime: keep a `Sink` field and push every handle into it.
#[derive(Debug, Default)]
pub struct Sink {
    handles: Vec<EventHandle>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: EventHandle) {
        self.handles.push(handle);
    }

    /// Releases every owned handle now.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

impl From<EventHandle> for Sink {
    fn from(handle: EventHandle) -> Self {
        Self {
            handles: vec![handle],
        }
    }
}

impl std::ops::AddAssign<EventHandle> for Sink {
    fn add_assign(&mut self, handle: EventHandle) {
        self.push(handle);
    }
}
