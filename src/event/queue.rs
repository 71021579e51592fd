//! Per-thread asynchronous event delivery queues.
//!
//! Every thread that touches the event system owns at most one
//! [`AsyncEventQueue`], created lazily on first use and terminated when the
//! thread exits. Cross-thread event deliveries are appended here as
//! type-erased callback records and drained in FIFO order by the owning
//! thread's [`AsyncEventQueue::exec`] call, typically from its main loop.
//!
//! Deliveries fanned out by one trigger share a *transaction* id, so the
//! batch appears contiguous to the receiver. Handlers tagged stateless are
//! deduplicated against the queue tail: only the newest pending delivery
//! survives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::error::EventError;
use crate::event::event::{Event, EventArgs, EventId, EventRef, EventTarget};
use crate::event::mutex::event_lock;
use crate::event::recursion::RecursionGuard;
use crate::lifetime::{DestroyedFlag, Lifetime};

pub(crate) type Transaction = u64;

const MAX_PUBLISH_DEPTH: usize = 256;

/// A queued, type-erased event callback.
pub(crate) trait QueuedCallback: Send {
    fn event_id(&self) -> EventId;

    /// Identity of the underlying callable, for stateless dedup.
    fn identity(&self) -> usize;

    fn call(&self);
}

struct QueueEntry {
    transaction: Transaction,
    event_destroyed: DestroyedFlag,
    callback: Box<dyn QueuedCallback>,
}

/// A filter installed on a queue for one event.
///
/// Filters run during synchronous dispatch on the emitter's thread, before
/// any handler; a filter may accept the event via [`EventRef::accept`],
/// which stops dispatch and makes the trigger return `false`.
pub trait EventFilter: Send + Sync {
    /// Invoked by [`Event::pre_trigger`] ahead of dispatch.
    fn pre_filter(&self, event: &EventRef) {
        let _ = event;
    }

    /// Invoked during synchronous dispatch.
    fn filter(&self, event: &EventRef);
}

struct FnFilter<F>(F);

impl<F: Fn(&EventRef) + Send + Sync> EventFilter for FnFilter<F> {
    fn filter(&self, event: &EventRef) {
        (self.0)(event)
    }
}

/// Identifies one installed filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterId(u64);

struct FilterEntry {
    id: FilterId,
    event: EventId,
    target: Weak<dyn EventTarget>,
    filter: Arc<dyn EventFilter>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    next_transaction: Transaction,
    filters: Vec<FilterEntry>,
    next_filter_id: u64,
}

/// A thread's asynchronous event delivery queue.
pub struct AsyncEventQueue {
    lifetime: Lifetime,
    state: Mutex<QueueState>,
    terminated: AtomicBool,
    nesting: AtomicU32,
}

// Keeps weak references to every live queue so an event being destroyed (or
// triggered in a DontQueue mode) can drop its pending deliveries everywhere.
static QUEUES: Mutex<Vec<Weak<AsyncEventQueue>>> = Mutex::new(Vec::new());

struct QueueOwner(Arc<AsyncEventQueue>);

impl Drop for QueueOwner {
    fn drop(&mut self) {
        self.0.terminate();
    }
}

thread_local! {
    static CURRENT: RefCell<Option<QueueOwner>> = const { RefCell::new(None) };
}

impl AsyncEventQueue {
    fn new() -> Self {
        Self {
            lifetime: Lifetime::new(),
            state: Mutex::new(QueueState::default()),
            terminated: AtomicBool::new(false),
            nesting: AtomicU32::new(0),
        }
    }

    /// The calling thread's queue, created on first use. The queue is
    /// terminated when its thread exits; handlers subscribed from that
    /// thread observe it through their destroyed flag.
    pub fn instance() -> Arc<AsyncEventQueue> {
        CURRENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(owner) = slot.as_ref() {
                return owner.0.clone();
            }
            let queue = Arc::new(AsyncEventQueue::new());
            QUEUES.lock().push(Arc::downgrade(&queue));
            trace!("created async event queue for current thread");
            *slot = Some(QueueOwner(queue.clone()));
            queue
        })
    }

    pub(crate) fn destroyed_flag(&self) -> DestroyedFlag {
        self.lifetime.destroyed_flag()
    }

    /// Appends a callback record.
    ///
    /// A stateless callback coalesces with the queue tail when both refer to
    /// the same event and callable: the tail keeps its transaction and only
    /// the newest arguments survive. Otherwise the record joins
    /// `prior_transaction` when the tail still carries it, or opens a fresh
    /// transaction.
    pub(crate) fn enqueue(
        &self,
        callback: Box<dyn QueuedCallback>,
        event_destroyed: DestroyedFlag,
        stateless: bool,
        prior_transaction: Option<Transaction>,
    ) -> Result<Transaction, EventError> {
        if self.is_terminated() {
            return Err(EventError::QueueTerminated);
        }
        let mut state = self.state.lock();
        if stateless
            && let Some(tail) = state.entries.back_mut()
            && tail.callback.event_id() == callback.event_id()
            && tail.callback.identity() == callback.identity()
        {
            tail.callback = callback;
            tail.event_destroyed = event_destroyed;
            return Ok(tail.transaction);
        }
        let transaction = match prior_transaction {
            Some(t) if state.entries.back().is_some_and(|e| e.transaction == t) => t,
            _ => {
                state.next_transaction += 1;
                state.next_transaction
            }
        };
        state.entries.push_back(QueueEntry {
            transaction,
            event_destroyed,
            callback,
        });
        trace!(transaction, pending = state.entries.len(), "queued event callback");
        Ok(transaction)
    }

    /// Drops every pending entry referencing `event`.
    pub(crate) fn unqueue(&self, event: EventId) {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.callback.event_id() != event);
        let dropped = before - state.entries.len();
        if dropped > 0 {
            trace!(dropped, "unqueued pending event callbacks");
        }
    }

    /// Drains the queue in FIFO order; returns whether any callback ran.
    ///
    /// Re-entrant: a handler may call `exec` again, draining entries posted
    /// meanwhile, while the outer call keeps working through its snapshot.
    /// Entries whose event died are dropped; a panicking handler is logged
    /// and the drain continues.
    pub fn exec(&self) -> Result<bool, EventError> {
        if self.is_terminated() {
            return Ok(false);
        }
        let _depth = RecursionGuard::enter("async_event_queue::exec", MAX_PUBLISH_DEPTH)?;
        self.nesting.fetch_add(1, Ordering::SeqCst);
        let did_work = self.publish_events();
        self.nesting.fetch_sub(1, Ordering::SeqCst);
        Ok(did_work)
    }

    fn publish_events(&self) -> bool {
        let mut did_work = false;
        loop {
            // Snapshot and swap: entries posted by the callbacks below (or
            // drained by a re-entrant exec) go through a fresh deque.
            let batch = {
                let _lock = event_lock();
                let mut state = self.state.lock();
                if state.entries.is_empty() {
                    break;
                }
                std::mem::take(&mut state.entries)
            };
            for entry in batch {
                if self.is_terminated() {
                    return did_work;
                }
                if entry.event_destroyed.is_set() {
                    continue;
                }
                did_work = true;
                if panic::catch_unwind(AssertUnwindSafe(|| entry.callback.call())).is_err() {
                    error!("event handler panicked during queue drain");
                }
            }
        }
        did_work
    }

    /// Current re-entrant drain depth on this queue.
    pub fn publish_nesting(&self) -> u32 {
        self.nesting.load(Ordering::SeqCst)
    }

    /// Marks the queue dead: pending entries and filters are dropped,
    /// subsequent enqueues are rejected and `exec` returns immediately.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.lifetime.set_destroying();
        let mut state = self.state.lock();
        state.entries.clear();
        state.filters.clear();
        trace!("async event queue terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Installs `filter` for `event` on this queue.
    ///
    /// Filters fire for triggers emitted from this queue's thread, in
    /// installation order, before any handler.
    pub fn install_event_filter<A: EventArgs>(
        &self,
        event: &Event<A>,
        filter: Arc<dyn EventFilter>,
    ) -> FilterId {
        let _lock = event_lock();
        event.filter_added();
        let mut state = self.state.lock();
        state.next_filter_id += 1;
        let id = FilterId(state.next_filter_id);
        state.filters.push(FilterEntry {
            id,
            event: event.id(),
            target: event.target(),
            filter,
        });
        id
    }

    /// Convenience for closure filters.
    pub fn install_event_filter_fn<A: EventArgs>(
        &self,
        event: &Event<A>,
        filter: impl Fn(&EventRef) + Send + Sync + 'static,
    ) -> FilterId {
        self.install_event_filter(event, Arc::new(FnFilter(filter)))
    }

    pub fn uninstall_event_filter(&self, id: FilterId) {
        let _lock = event_lock();
        let removed = {
            let mut state = self.state.lock();
            state
                .filters
                .iter()
                .position(|entry| entry.id == id)
                .map(|at| state.filters.remove(at))
        };
        if let Some(entry) = removed
            && let Some(target) = entry.target.upgrade()
        {
            target.filter_removed();
        }
    }

    /// Removes every filter installed for `event` on this queue.
    pub(crate) fn uninstall_event_filters(&self, event: EventId) {
        let _lock = event_lock();
        let removed = {
            let mut state = self.state.lock();
            let (removed, kept) = state
                .filters
                .drain(..)
                .partition::<Vec<_>, _>(|entry| entry.event == event);
            state.filters = kept;
            removed
        };
        for entry in removed {
            if let Some(target) = entry.target.upgrade() {
                target.filters_removed();
            }
        }
    }

    pub(crate) fn pre_filter_event(&self, event: EventId) {
        for (filter, event_ref) in self.filters_for(event) {
            filter.pre_filter(&event_ref);
        }
    }

    pub(crate) fn filter_event(&self, event: EventId) {
        for (filter, event_ref) in self.filters_for(event) {
            filter.filter(&event_ref);
        }
    }

    // Filters are invoked with the queue state unlocked; they may accept the
    // event or mutate the registry.
    fn filters_for(&self, event: EventId) -> Vec<(Arc<dyn EventFilter>, EventRef)> {
        let state = self.state.lock();
        state
            .filters
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| (entry.filter.clone(), EventRef::new(entry.target.clone())))
            .collect()
    }
}

/// Drops pending deliveries of `event` from every live queue.
pub(crate) fn unqueue_event(event: EventId) {
    let mut queues = QUEUES.lock();
    queues.retain(|queue| {
        let Some(queue) = queue.upgrade() else {
            return false;
        };
        queue.unqueue(event);
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorded {
        event: EventId,
        identity: usize,
        value: u32,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl QueuedCallback for Recorded {
        fn event_id(&self) -> EventId {
            self.event
        }

        fn identity(&self) -> usize {
            self.identity
        }

        fn call(&self) {
            self.log.lock().push(self.value);
        }
    }

    fn record(event: usize, identity: usize, value: u32, log: &Arc<Mutex<Vec<u32>>>) -> Box<Recorded> {
        Box::new(Recorded {
            event: EventId(event),
            identity,
            value,
            log: log.clone(),
        })
    }

    #[test]
    fn transactions_thread_through_a_contiguous_batch() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let t1 = queue
            .enqueue(record(1, 10, 1, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        let t2 = queue
            .enqueue(record(1, 11, 2, &log), lifetime.destroyed_flag(), false, Some(t1))
            .unwrap();
        assert_eq!(t1, t2);

        // A fresh trigger (no prior transaction) opens a new one.
        let t3 = queue
            .enqueue(record(1, 12, 3, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        assert_ne!(t3, t1);
    }

    #[test]
    fn stateless_dedup_keeps_only_the_newest_arguments() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for value in 0..100 {
            queue
                .enqueue(record(1, 10, value, &log), lifetime.destroyed_flag(), true, None)
                .unwrap();
        }
        assert!(queue.exec().unwrap());
        assert_eq!(*log.lock(), vec![99]);
    }

    #[test]
    fn dedup_requires_matching_identity() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(record(1, 10, 1, &log), lifetime.destroyed_flag(), true, None)
            .unwrap();
        queue
            .enqueue(record(1, 11, 2, &log), lifetime.destroyed_flag(), true, None)
            .unwrap();
        queue.exec().unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn exec_drains_fifo_and_reports_work() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(!queue.exec().unwrap());
        for value in 1..=3 {
            queue
                .enqueue(record(1, value as usize, value, &log), lifetime.destroyed_flag(), false, None)
                .unwrap();
        }
        assert!(queue.exec().unwrap());
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert!(!queue.exec().unwrap());
    }

    #[test]
    fn entries_of_a_destroyed_event_are_dropped_at_drain() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(record(1, 10, 1, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        lifetime.set_destroying();
        assert!(!queue.exec().unwrap());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn unqueue_drops_only_the_matching_event() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(record(1, 10, 1, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        queue
            .enqueue(record(2, 20, 2, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        queue.unqueue(EventId(1));
        queue.exec().unwrap();
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn terminate_rejects_further_work() {
        let queue = AsyncEventQueue::new();
        let lifetime = Lifetime::new();
        let flag = queue.destroyed_flag();
        let log = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(record(1, 10, 1, &log), lifetime.destroyed_flag(), false, None)
            .unwrap();
        queue.terminate();
        queue.terminate();
        assert!(flag.is_set());
        assert_eq!(
            queue
                .enqueue(record(1, 10, 2, &log), lifetime.destroyed_flag(), false, None)
                .unwrap_err(),
            EventError::QueueTerminated
        );
        assert!(!queue.exec().unwrap());
        assert!(log.lock().is_empty());
    }
}
