//! Typed multicast events.
//!
//! An [`Event<A>`] is a channel an object owns and triggers; subscribers
//! attach callables and receive the payload either inline on the emitting
//! thread or through their own thread's [`AsyncEventQueue`]. All mutating
//! operations take `&self`: an event is meant to be embedded in an object
//! and triggered from methods that are logically read-only.
//!
//! Synchronous dispatch honours *acceptance*: a handler (or an installed
//! filter) may accept the event, which stops dispatch after it returns and
//! makes the trigger report `false`. Handlers may freely subscribe and
//! unsubscribe — including themselves — during dispatch; the dispatch loop
//! rescans on mutation and a per-handler trigger id guarantees each handler
//! runs at most once per trigger.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::cookie::{Cookie, CookieJar};
use crate::error::EventError;
use crate::event::handle::EventHandle;
use crate::event::mutex::event_lock;
use crate::event::queue::{self, AsyncEventQueue, QueuedCallback, Transaction};
use crate::lifetime::{DestroyedFlag, Lifetime};

/// Payload bound for events. Multiple values travel as a tuple.
pub trait EventArgs: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> EventArgs for T {}

/// How [`Event::trigger`] dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerType {
    /// Synchronous dispatch.
    #[default]
    Default,
    Synchronous,
    /// Drop this event's pending queued callbacks, then dispatch
    /// synchronously.
    SynchronousDontQueue,
    /// Never inline: every handler receives a queued callback.
    Asynchronous,
    /// Drop pending queued callbacks, then dispatch asynchronously.
    AsynchronousDontQueue,
}

/// Stable identity of an event, valid for the event's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) usize);

/// Opaque pointer-sized token identifying a subscriber, for bulk
/// unsubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(usize);

impl ClientId {
    pub fn new(token: usize) -> Self {
        Self(token)
    }

    /// Derives a client id from the address of `value`.
    pub fn of<T>(value: &T) -> Self {
        Self(value as *const T as usize)
    }
}

/// Type-erased view of an event, used by handles, queues and filters.
pub(crate) trait EventTarget: Send + Sync {
    fn event_id(&self) -> EventId;
    fn add_ref(&self, cookie: Cookie) -> Result<(), EventError>;
    fn release(&self, cookie: Cookie);
    fn use_count(&self, cookie: Cookie) -> u32;
    fn unsubscribe_cookie(&self, cookie: Cookie) -> Result<(), EventError>;
    fn set_same_thread_as_emitter(&self, cookie: Cookie) -> Result<(), EventError>;
    fn set_stateless(&self, cookie: Cookie) -> Result<(), EventError>;
    fn accept(&self);
    fn ignore(&self);
    fn accepted(&self) -> bool;
    fn filter_added(&self);
    fn filter_removed(&self);
    fn filters_removed(&self);
}

/// A cheap, owned proxy to an event.
///
/// Handler and filter closures are `'static`, so they cannot borrow the
/// event they are subscribed to; they capture an `EventRef` instead and use
/// it to accept or ignore the trigger in flight. The proxy holds no strong
/// reference and becomes inert once the event is destroyed.
#[derive(Clone)]
pub struct EventRef {
    target: Weak<dyn EventTarget>,
}

impl EventRef {
    pub(crate) fn new(target: Weak<dyn EventTarget>) -> Self {
        Self { target }
    }

    pub fn valid(&self) -> bool {
        self.target.upgrade().is_some()
    }

    /// Marks the current trigger accepted; dispatch stops after the running
    /// handler returns and the trigger reports `false`.
    pub fn accept(&self) {
        if let Some(target) = self.target.upgrade() {
            target.accept();
        }
    }

    /// Clears the accepted mark on the current trigger.
    pub fn ignore(&self) {
        if let Some(target) = self.target.upgrade() {
            target.ignore();
        }
    }

    pub fn accepted(&self) -> bool {
        self.target.upgrade().is_some_and(|target| target.accepted())
    }
}

struct Handler<A: EventArgs> {
    queue: Arc<AsyncEventQueue>,
    queue_destroyed: DestroyedFlag,
    client_id: Option<ClientId>,
    callable: Arc<dyn Fn(&A) + Send + Sync>,
    same_thread_as_emitter: bool,
    stateless: bool,
    trigger_id: u64,
}

struct HandlerSlot<A: EventArgs> {
    cookie: Cookie,
    handler: Handler<A>,
}

#[derive(Default)]
struct TriggerContext {
    accepted: bool,
    handlers_changed: bool,
}

struct InstanceData<A: EventArgs> {
    ignore_errors: bool,
    trigger_type: TriggerType,
    handlers: Vec<HandlerSlot<A>>,
    contexts: SmallVec<[TriggerContext; 4]>,
    triggering: bool,
    trigger_id: u64,
    handlers_changed: bool,
    filter_count: u32,
    jar: CookieJar,
}

impl<A: EventArgs> Default for InstanceData<A> {
    fn default() -> Self {
        Self {
            ignore_errors: false,
            trigger_type: TriggerType::default(),
            handlers: Vec::new(),
            contexts: SmallVec::new(),
            triggering: false,
            trigger_id: 0,
            handlers_changed: false,
            filter_count: 0,
            jar: CookieJar::new(),
        }
    }
}

impl<A: EventArgs> InstanceData<A> {
    fn note_handlers_changed(&mut self) {
        self.handlers_changed = true;
        for context in &mut self.contexts {
            context.handlers_changed = true;
        }
    }

    fn handler_mut(&mut self, cookie: Cookie) -> Option<&mut Handler<A>> {
        self.handlers
            .iter_mut()
            .find(|slot| slot.cookie == cookie)
            .map(|slot| &mut slot.handler)
    }

    fn remove_handler(&mut self, cookie: Cookie) -> Option<Handler<A>> {
        let at = self.handlers.iter().position(|slot| slot.cookie == cookie)?;
        let slot = self.handlers.remove(at);
        self.jar.retire(cookie);
        self.note_handlers_changed();
        Some(slot.handler)
    }
}

// Lazily allocated: an event that was never subscribed to or configured
// carries no instance data at all.
struct Inner<A: EventArgs> {
    instance: Option<InstanceData<A>>,
}

impl<A: EventArgs> Inner<A> {
    fn data(&mut self) -> &mut InstanceData<A> {
        self.instance.get_or_insert_with(InstanceData::default)
    }
}

struct EventShared<A: EventArgs> {
    lifetime: Lifetime,
    inner: Mutex<Inner<A>>,
}

/// The record a cross-thread delivery carries: the callable plus a clone of
/// the trigger arguments.
struct EventCallback<A: EventArgs> {
    event: EventId,
    callable: Arc<dyn Fn(&A) + Send + Sync>,
    args: A,
}

impl<A: EventArgs> QueuedCallback for EventCallback<A> {
    fn event_id(&self) -> EventId {
        self.event
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.callable) as *const () as usize
    }

    fn call(&self) {
        (self.callable)(&self.args)
    }
}

struct QueuedDispatch<A: EventArgs> {
    cookie: Cookie,
    queue: Arc<AsyncEventQueue>,
    queue_destroyed: DestroyedFlag,
    callable: Arc<dyn Fn(&A) + Send + Sync>,
    stateless: bool,
    to_emitter: bool,
    ignore_errors: bool,
}

enum Action<A: EventArgs> {
    Done,
    Skip,
    Inline(Arc<dyn Fn(&A) + Send + Sync>),
    Enqueue(QueuedDispatch<A>),
}

// Pops the acceptance context on every exit path of a sync trigger.
struct ContextGuard<'a, A: EventArgs> {
    shared: &'a EventShared<A>,
}

impl<A: EventArgs> Drop for ContextGuard<'_, A> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if let Some(data) = inner.instance.as_mut() {
            data.contexts.pop();
        }
    }
}

// Restores the triggering flag; the outermost trigger owns the reset of the
// per-handler trigger-id caches.
struct TriggeringGuard<'a, A: EventArgs> {
    shared: &'a EventShared<A>,
    prev: bool,
}

impl<A: EventArgs> Drop for TriggeringGuard<'_, A> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if let Some(data) = inner.instance.as_mut() {
            data.triggering = self.prev;
        }
    }
}

impl<A: EventArgs> EventShared<A> {
    fn id(&self) -> EventId {
        EventId(self as *const Self as *const () as usize)
    }

    fn accepted_top(&self) -> bool {
        let mut inner = self.inner.lock();
        inner
            .instance
            .as_mut()
            .and_then(|data| data.contexts.last())
            .is_some_and(|context| context.accepted)
    }

    fn begin_trigger(&self) -> (TriggeringGuard<'_, A>, u64) {
        let mut inner = self.inner.lock();
        let data = inner.data();
        let prev = data.triggering;
        if !data.triggering {
            data.triggering = true;
            data.trigger_id = 0;
            for slot in &mut data.handlers {
                slot.handler.trigger_id = 0;
            }
        }
        data.trigger_id += 1;
        let trigger_id = data.trigger_id;
        drop(inner);
        (TriggeringGuard { shared: self, prev }, trigger_id)
    }
}

impl<A: EventArgs> EventTarget for EventShared<A> {
    fn event_id(&self) -> EventId {
        self.id()
    }

    fn add_ref(&self, cookie: Cookie) -> Result<(), EventError> {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        inner.data().jar.add_ref(cookie)
    }

    fn release(&self, cookie: Cookie) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return;
        };
        if data.jar.release(cookie) {
            data.remove_handler(cookie);
        }
    }

    fn use_count(&self, cookie: Cookie) -> u32 {
        let mut inner = self.inner.lock();
        inner
            .instance
            .as_mut()
            .map(|data| data.jar.use_count(cookie))
            .unwrap_or(0)
    }

    fn unsubscribe_cookie(&self, cookie: Cookie) -> Result<(), EventError> {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return Err(EventError::HandlerNotFound);
        };
        data.remove_handler(cookie)
            .map(|_| ())
            .ok_or(EventError::HandlerNotFound)
    }

    fn set_same_thread_as_emitter(&self, cookie: Cookie) -> Result<(), EventError> {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return Err(EventError::HandlerNotFound);
        };
        let handler = data.handler_mut(cookie).ok_or(EventError::HandlerNotFound)?;
        handler.same_thread_as_emitter = true;
        Ok(())
    }

    fn set_stateless(&self, cookie: Cookie) -> Result<(), EventError> {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return Err(EventError::HandlerNotFound);
        };
        let handler = data.handler_mut(cookie).ok_or(EventError::HandlerNotFound)?;
        handler.stateless = true;
        Ok(())
    }

    fn accept(&self) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        if let Some(context) = inner
            .instance
            .as_mut()
            .and_then(|data| data.contexts.last_mut())
        {
            context.accepted = true;
        }
    }

    fn ignore(&self) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        if let Some(context) = inner
            .instance
            .as_mut()
            .and_then(|data| data.contexts.last_mut())
        {
            context.accepted = false;
        }
    }

    fn accepted(&self) -> bool {
        self.accepted_top()
    }

    fn filter_added(&self) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        inner.data().filter_count += 1;
    }

    fn filter_removed(&self) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        if let Some(data) = inner.instance.as_mut() {
            data.filter_count = data.filter_count.saturating_sub(1);
        }
    }

    fn filters_removed(&self) {
        let _lock = event_lock();
        let mut inner = self.inner.lock();
        if let Some(data) = inner.instance.as_mut() {
            data.filter_count = 0;
        }
    }
}

/// A typed multicast event.
///
/// The event is the sole owner of its subscription state; handles returned
/// by [`Event::subscribe`] observe it weakly and become no-ops once the
/// event is dropped. Dropping the event also drops its pending deliveries
/// from every queue.
pub struct Event<A: EventArgs> {
    shared: Arc<EventShared<A>>,
}

impl<A: EventArgs> Event<A> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EventShared {
                lifetime: Lifetime::new(),
                inner: Mutex::new(Inner { instance: None }),
            }),
        }
    }

    /// Stable identity of this event.
    pub fn id(&self) -> EventId {
        self.shared.id()
    }

    pub(crate) fn target(&self) -> Weak<dyn EventTarget> {
        let shared: Arc<dyn EventTarget> = self.shared.clone();
        Arc::downgrade(&shared)
    }

    /// An owned proxy for handler and filter closures; see [`EventRef`].
    pub fn event_ref(&self) -> EventRef {
        EventRef::new(self.target())
    }

    /// Subscribes `handler`, recording it under the calling thread's queue.
    ///
    /// The returned handle is *primary*: dropping it removes the
    /// subscription. Clones of it are non-primary.
    pub fn subscribe(&self, handler: impl Fn(&A) + Send + Sync + 'static) -> EventHandle {
        self.subscribe_inner(None, Arc::new(handler))
    }

    /// Like [`Event::subscribe`], tagging the handler with a client identity
    /// for [`Event::unsubscribe_client`].
    pub fn subscribe_with_client(
        &self,
        client: ClientId,
        handler: impl Fn(&A) + Send + Sync + 'static,
    ) -> EventHandle {
        self.subscribe_inner(Some(client), Arc::new(handler))
    }

    fn subscribe_inner(
        &self,
        client_id: Option<ClientId>,
        callable: Arc<dyn Fn(&A) + Send + Sync>,
    ) -> EventHandle {
        let queue = AsyncEventQueue::instance();
        let _lock = event_lock();
        let mut inner = self.shared.inner.lock();
        let data = inner.data();
        data.note_handlers_changed();
        let cookie = data.jar.allocate();
        data.jar
            .add_ref(cookie)
            .expect("freshly allocated cookie is always live");
        data.handlers.push(HandlerSlot {
            cookie,
            handler: Handler {
                queue_destroyed: queue.destroyed_flag(),
                queue,
                client_id,
                callable,
                same_thread_as_emitter: false,
                stateless: false,
                trigger_id: 0,
            },
        });
        drop(inner);
        trace!(cookie = cookie.get(), event = ?self.id(), "subscribed handler");
        EventHandle::new(self.target(), cookie, true)
    }

    /// Removes the subscription behind `handle`.
    pub fn unsubscribe(&self, handle: &EventHandle) -> Result<(), EventError> {
        let _lock = event_lock();
        let mut inner = self.shared.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return Err(EventError::HandlerNotFound);
        };
        data.remove_handler(handle.id())
            .map(|_| ())
            .ok_or(EventError::HandlerNotFound)
    }

    /// Removes every handler subscribed with the given client identity.
    pub fn unsubscribe_client(&self, client: ClientId) {
        let _lock = event_lock();
        let mut inner = self.shared.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return;
        };
        let cookies: Vec<Cookie> = data
            .handlers
            .iter()
            .filter(|slot| slot.handler.client_id == Some(client))
            .map(|slot| slot.cookie)
            .collect();
        for cookie in cookies {
            data.remove_handler(cookie);
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.shared
            .inner
            .lock()
            .instance
            .as_ref()
            .is_some_and(|data| !data.handlers.is_empty())
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.shared
            .inner
            .lock()
            .instance
            .as_ref()
            .map(|data| data.trigger_type)
            .unwrap_or_default()
    }

    pub fn set_trigger_type(&self, trigger_type: TriggerType) {
        let _lock = event_lock();
        self.shared.inner.lock().data().trigger_type = trigger_type;
    }

    /// Cross-thread deliveries to a dead queue silently drop the handler
    /// instead of failing the trigger.
    pub fn ignore_errors(&self) {
        let _lock = event_lock();
        self.shared.inner.lock().data().ignore_errors = true;
    }

    /// Marks the current trigger accepted; see [`EventRef::accept`].
    pub fn accept(&self) {
        self.shared.accept();
    }

    /// Clears the accepted mark on the current trigger.
    pub fn ignore(&self) {
        EventTarget::ignore(&*self.shared);
    }

    pub fn accepted(&self) -> bool {
        self.shared.accepted_top()
    }

    /// Runs this event's pre-filters on the emitter's queue, if any.
    pub fn pre_trigger(&self) {
        if self.filtered() {
            AsyncEventQueue::instance().pre_filter_event(self.id());
        }
    }

    /// Dispatches according to the configured [`TriggerType`].
    ///
    /// Returns `false` only when a synchronous dispatch was accepted.
    pub fn trigger(&self, args: A) -> Result<bool, EventError> {
        if !self.has_instance() {
            return Ok(true);
        }
        match self.trigger_type() {
            TriggerType::Asynchronous | TriggerType::AsynchronousDontQueue => {
                self.async_trigger(args)?;
                Ok(true)
            }
            _ => self.sync_trigger(args),
        }
    }

    /// Synchronous dispatch: walks handlers in subscription order, inline
    /// where the handler lives on the emitting thread (or is tagged for it),
    /// queued otherwise. Returns `false` when a filter or handler accepted
    /// the event.
    pub fn sync_trigger(&self, args: A) -> Result<bool, EventError> {
        if !self.has_instance() {
            return Ok(true);
        }
        if self.trigger_type() == TriggerType::SynchronousDontQueue {
            self.unqueue();
        }
        let mut lock = Some(event_lock());
        let emitter_queue = AsyncEventQueue::instance();

        let filtered = {
            let mut inner = self.shared.inner.lock();
            let Some(data) = inner.instance.as_mut() else {
                return Ok(true);
            };
            if data.handlers.is_empty() && data.filter_count == 0 {
                return Ok(true);
            }
            data.contexts.push(TriggerContext::default());
            data.filter_count > 0
        };
        let _context = ContextGuard {
            shared: &self.shared,
        };

        if filtered {
            emitter_queue.filter_event(self.id());
            if self.shared.accepted_top() {
                return Ok(false);
            }
        }

        let (_triggering, trigger_id) = self.shared.begin_trigger();
        trace!(event = ?self.id(), trigger_id, "sync trigger");
        let mut transaction: Option<Transaction> = None;
        let mut index = 0usize;
        loop {
            let action = self.next_action(&emitter_queue, &mut index, trigger_id, false);
            match action {
                Action::Done => break,
                Action::Skip => continue,
                Action::Inline(callable) => {
                    // The event lock is never held across user code.
                    lock.take();
                    callable(&args);
                    lock.replace(event_lock());
                }
                Action::Enqueue(dispatch) => {
                    self.deliver_queued(&emitter_queue, dispatch, &mut transaction, &args)?;
                }
            }
            if self.post_dispatch(&mut index, true) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Asynchronous dispatch: every handler receives a queued callback, with
    /// no inline calls and no acceptance.
    pub fn async_trigger(&self, args: A) -> Result<(), EventError> {
        if !self.has_instance() {
            return Ok(());
        }
        if self.trigger_type() == TriggerType::AsynchronousDontQueue {
            self.unqueue();
        }
        let _lock = event_lock();
        let emitter_queue = AsyncEventQueue::instance();
        {
            let mut inner = self.shared.inner.lock();
            let Some(data) = inner.instance.as_mut() else {
                return Ok(());
            };
            if data.handlers.is_empty() {
                return Ok(());
            }
        }
        let (_triggering, trigger_id) = self.shared.begin_trigger();
        trace!(event = ?self.id(), trigger_id, "async trigger");
        let mut transaction: Option<Transaction> = None;
        let mut index = 0usize;
        loop {
            let action = self.next_action(&emitter_queue, &mut index, trigger_id, true);
            match action {
                Action::Done => break,
                Action::Skip => continue,
                Action::Inline(_) => unreachable!("async dispatch never inlines"),
                Action::Enqueue(dispatch) => {
                    self.deliver_queued(&emitter_queue, dispatch, &mut transaction, &args)?;
                }
            }
            self.post_dispatch(&mut index, false);
        }
        Ok(())
    }

    fn has_instance(&self) -> bool {
        self.shared.inner.lock().instance.is_some()
    }

    fn filtered(&self) -> bool {
        self.shared
            .inner
            .lock()
            .instance
            .as_ref()
            .is_some_and(|data| data.filter_count > 0)
    }

    pub(crate) fn filter_added(&self) {
        EventTarget::filter_added(&*self.shared);
    }

    // Drops this event's pending deliveries from every live queue.
    fn unqueue(&self) {
        let _lock = event_lock();
        queue::unqueue_event(self.id());
    }

    fn next_action(
        &self,
        emitter_queue: &Arc<AsyncEventQueue>,
        index: &mut usize,
        trigger_id: u64,
        async_mode: bool,
    ) -> Action<A> {
        let mut inner = self.shared.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return Action::Done;
        };
        if *index >= data.handlers.len() {
            return Action::Done;
        }
        let ignore_errors = data.ignore_errors;
        let slot = &mut data.handlers[*index];
        *index += 1;
        if slot.handler.trigger_id == trigger_id {
            return Action::Skip;
        }
        slot.handler.trigger_id = trigger_id;
        let handler = &slot.handler;
        let same_queue = Arc::ptr_eq(&handler.queue, emitter_queue);
        if !async_mode
            && (handler.same_thread_as_emitter
                || (!handler.queue_destroyed.is_set() && same_queue))
        {
            Action::Inline(handler.callable.clone())
        } else {
            Action::Enqueue(QueuedDispatch {
                cookie: slot.cookie,
                queue: handler.queue.clone(),
                queue_destroyed: handler.queue_destroyed.clone(),
                callable: handler.callable.clone(),
                stateless: handler.stateless,
                to_emitter: handler.same_thread_as_emitter,
                ignore_errors,
            })
        }
    }

    fn deliver_queued(
        &self,
        emitter_queue: &Arc<AsyncEventQueue>,
        dispatch: QueuedDispatch<A>,
        transaction: &mut Option<Transaction>,
        args: &A,
    ) -> Result<(), EventError> {
        if !dispatch.to_emitter && dispatch.queue_destroyed.is_set() {
            return self.drop_dead_handler(dispatch);
        }
        let callback = EventCallback {
            event: self.id(),
            callable: dispatch.callable.clone(),
            args: args.clone(),
        };
        let target = if dispatch.to_emitter {
            emitter_queue
        } else {
            &dispatch.queue
        };
        match target.enqueue(
            Box::new(callback),
            self.shared.lifetime.destroyed_flag(),
            dispatch.stateless,
            *transaction,
        ) {
            Ok(t) => {
                *transaction = Some(t);
                Ok(())
            }
            Err(_) => self.drop_dead_handler(dispatch),
        }
    }

    // A delivery target died: either silently retire the handler or surface
    // the failure, per `ignore_errors`.
    fn drop_dead_handler(&self, dispatch: QueuedDispatch<A>) -> Result<(), EventError> {
        if dispatch.ignore_errors {
            let mut inner = self.shared.inner.lock();
            if let Some(data) = inner.instance.as_mut() {
                data.remove_handler(dispatch.cookie);
            }
            trace!(event = ?self.id(), "dropped handler on a destroyed queue");
            Ok(())
        } else {
            Err(EventError::QueueDestroyed)
        }
    }

    // Post-dispatch bookkeeping; returns whether the trigger was accepted.
    fn post_dispatch(&self, index: &mut usize, check_accept: bool) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(data) = inner.instance.as_mut() else {
            return false;
        };
        if check_accept && data.contexts.last().is_some_and(|context| context.accepted) {
            return true;
        }
        if std::mem::replace(&mut data.handlers_changed, false) {
            *index = 0;
        }
        false
    }
}

impl<A: EventArgs> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: EventArgs> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id())
            .field("subscribers", &self.has_subscribers())
            .finish_non_exhaustive()
    }
}

impl<A: EventArgs> Drop for Event<A> {
    fn drop(&mut self) {
        if self.filtered() {
            AsyncEventQueue::instance().uninstall_event_filters(self.id());
        }
        let _lock = event_lock();
        self.shared.lifetime.set_destroying();
        queue::unqueue_event(self.id());
        let mut inner = self.shared.inner.lock();
        inner.instance = None;
    }
}
