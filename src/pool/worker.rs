//! Pool worker internals: the condvar-parked active-task slot and the
//! priority-ordered waiting queue.
//!
//! A worker's waiting queue is owned by the pool state (guarded by the pool's
//! recursive lock); the active-task slot and stop flag live behind the
//! worker's own non-recursive mutex so the worker thread can park on its
//! condition variable without touching pool topology.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;
use crate::pool::task::TaskRef;

/// Waiting tasks in non-increasing priority order; insertion is stable for
/// equal priorities.
#[derive(Default)]
pub(super) struct WaitingQueue {
    entries: VecDeque<(TaskRef, i32)>,
}

impl WaitingQueue {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn insert(&mut self, task: TaskRef, priority: i32) {
        let at = self.entries.partition_point(|(_, p)| *p >= priority);
        self.entries.insert(at, (task, priority));
    }

    pub(super) fn pop_front(&mut self) -> Option<(TaskRef, i32)> {
        self.entries.pop_front()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Default)]
struct Slot {
    active: Option<TaskRef>,
    stopped: bool,
}

/// The condvar side of a pool worker.
pub(super) struct Worker {
    index: usize,
    slot: Mutex<Slot>,
    work_ready: Condvar,
}

impl Worker {
    pub(super) fn new(index: usize) -> Self {
        Self {
            index,
            slot: Mutex::new(Slot::default()),
            work_ready: Condvar::new(),
        }
    }

    pub(super) fn index(&self) -> usize {
        self.index
    }

    /// Whether a task is currently promoted (running or about to run).
    pub(super) fn active(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    /// Blocks until a task is promoted or the worker is stopped.
    /// Returns `None` on stop; the stop flag wins over a promoted task.
    pub(super) fn wait_for_work(&self) -> Option<TaskRef> {
        let mut slot = self.slot.lock();
        while slot.active.is_none() && !slot.stopped {
            self.work_ready.wait(&mut slot);
        }
        if slot.stopped { None } else { slot.active.clone() }
    }

    /// Promotes `task` to the active slot and wakes the worker thread.
    pub(super) fn promote(&self, task: TaskRef) -> Result<(), PoolError> {
        {
            let mut slot = self.slot.lock();
            if slot.active.is_some() {
                return Err(PoolError::AlreadyActive);
            }
            slot.active = Some(task);
        }
        self.work_ready.notify_one();
        Ok(())
    }

    /// Clears the active slot after the task finished or was skipped.
    pub(super) fn release(&self) -> Result<TaskRef, PoolError> {
        self.slot.lock().active.take().ok_or(PoolError::NoActiveTask)
    }

    pub(super) fn stop_signal(&self) {
        {
            let mut slot = self.slot.lock();
            slot.stopped = true;
        }
        self.work_ready.notify_one();
    }
}
