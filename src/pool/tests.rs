use super::*;
use crate::error::{PoolError, TaskError};
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

assert_impl_all!(ThreadPool: Send, Sync);
assert_impl_all!(TaskFuture<i32>: Send);
assert_impl_all!(FunctionTask<()>: Send, Sync);

/// Blocks a worker until opened, and reports when the worker entered it.
/// Lets tests pin a worker as "busy" deterministically.
struct Gate {
    state: Mutex<(bool, bool)>, // (entered, open)
    cond: Condvar,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((false, false)),
            cond: Condvar::new(),
        })
    }

    fn enter_and_wait(&self) {
        let mut state = self.state.lock();
        state.0 = true;
        self.cond.notify_all();
        while !state.1 {
            self.cond.wait(&mut state);
        }
    }

    fn wait_entered(&self) {
        let mut state = self.state.lock();
        while !state.0 {
            self.cond.wait(&mut state);
        }
    }

    fn open(&self) {
        let mut state = self.state.lock();
        state.1 = true;
        self.cond.notify_all();
    }
}

#[test]
fn run_resolves_with_the_closure_value() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let (future, _task) = pool.run(|| 40 + 2, 0)?;
    assert_eq!(future.wait(), Ok(42));
    Ok(())
}

#[test]
fn start_without_workers_fails() {
    let pool = ThreadPool::builder().worker_threads(0).build();
    let task = FunctionTask::new(|| ());
    assert!(matches!(pool.start(task, 0), Err(PoolError::NoThreads)));
}

#[rstest]
#[case::highest_first(vec![("t1", 1), ("t2", 5), ("t3", 3)], vec!["t2", "t3", "t1"])]
#[case::stable_for_ties(vec![("a", 5), ("b", 5), ("c", 5)], vec!["a", "b", "c"])]
fn queued_tasks_run_in_priority_order(
    #[case] submissions: Vec<(&'static str, i32)>,
    #[case] expected: Vec<&'static str>,
) -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let gate = Gate::new();
    let blocker = gate.clone();
    pool.run(move || blocker.enter_and_wait(), 100)?;
    gate.wait_entered();

    // The single worker is pinned; everything below lands in its queue.
    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in submissions {
        let order = order.clone();
        pool.run(move || order.lock().push(name), priority)?;
    }

    gate.open();
    pool.wait();
    assert_eq!(*order.lock(), expected);
    Ok(())
}

#[test]
fn idle_worker_steals_queued_work() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(2).build();

    let gate_a = Gate::new();
    let gate_b = Gate::new();
    let thread_b: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

    let blocker = gate_a.clone();
    pool.run(move || blocker.enter_and_wait(), 0)?;
    gate_a.wait_entered();

    let blocker = gate_b.clone();
    let b_slot = thread_b.clone();
    pool.run(
        move || {
            *b_slot.lock() = Some(std::thread::current().id());
            blocker.enter_and_wait();
        },
        0,
    )?;
    gate_b.wait_entered();

    // Both workers busy: the batch queues on worker 0. Each task runs long
    // enough that a single worker cannot drain the whole batch while the
    // other is between steals.
    let batch_threads = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..10 {
        let batch_threads = batch_threads.clone();
        pool.run(
            move || {
                batch_threads.lock().push(std::thread::current().id());
                std::thread::sleep(std::time::Duration::from_millis(2));
            },
            0,
        )?;
    }

    // Worker 1 goes idle first and must steal from worker 0's queue.
    gate_b.open();
    gate_a.open();
    pool.wait();

    let b_id = thread_b.lock().expect("worker 1 never ran its pin task");
    let ran_on_b = batch_threads.lock().iter().filter(|id| **id == b_id).count();
    assert!(ran_on_b >= 1, "worker 1 should steal at least one batch task");
    Ok(())
}

#[test]
fn cancelled_task_is_skipped_but_still_completes() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let gate = Gate::new();
    let blocker = gate.clone();
    pool.run(move || blocker.enter_and_wait(), 0)?;
    gate.wait_entered();

    let ran = Arc::new(AtomicUsize::new(0));
    let body_ran = ran.clone();
    let task = FunctionTask::new(move || {
        body_ran.fetch_add(1, Ordering::SeqCst);
    });
    let future = task.future();
    pool.start(task.clone(), 0)?;
    task.cancel();

    gate.open();
    assert_eq!(future.wait(), Err(TaskError::Cancelled));
    assert_eq!(ran.load(Ordering::SeqCst), 0, "run must never be called");
    Ok(())
}

#[test]
fn try_start_requires_an_idle_worker() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let gate = Gate::new();
    let blocker = gate.clone();
    pool.run(move || blocker.enter_and_wait(), 0)?;
    gate.wait_entered();

    let task = FunctionTask::new(|| ());
    assert!(!pool.try_start(task.clone(), 0));

    gate.open();
    pool.wait();
    assert!(pool.try_start(task, 0));
    pool.wait();
    Ok(())
}

#[test]
fn wait_returns_once_all_work_drained() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(2).build();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..32 {
        let counter = counter.clone();
        pool.run(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            0,
        )?;
    }
    pool.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 32);
    assert!(pool.idle());
    assert!(!pool.busy());
    Ok(())
}

#[test]
fn reserve_only_grows() {
    let pool = ThreadPool::builder().worker_threads(1).build();
    assert_eq!(pool.total_threads(), 1);
    pool.reserve(3);
    assert_eq!(pool.total_threads(), 3);
    assert_eq!(pool.max_threads(), 3);
    pool.reserve(2);
    assert_eq!(pool.total_threads(), 3);
}

#[test]
fn stop_is_idempotent_and_rejects_new_work() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let (future, _task) = pool.run(|| 1, 0)?;
    assert_eq!(future.wait(), Ok(1));

    pool.stop();
    pool.stop();
    assert!(pool.stopped());

    // A stopped pool resolves run() futures as cancelled without scheduling.
    let (future, _task) = pool.run(|| 2, 0)?;
    assert_eq!(future.wait(), Err(TaskError::Cancelled));
    assert!(!pool.try_start(FunctionTask::new(|| ()), 0));
    Ok(())
}

#[test]
fn dropping_the_pool_drains_queued_work() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = ThreadPool::builder().worker_threads(2).build();
        for _ in 0..16 {
            let counter = counter.clone();
            pool.run(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                0,
            )?;
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 16);
    Ok(())
}

#[test]
fn default_pool_is_shared() -> Result<()> {
    let first = default_thread_pool();
    let second = default_thread_pool();
    assert!(std::ptr::eq(first, second));
    let (future, _task) = first.run(|| 3, 0)?;
    assert_eq!(future.wait(), Ok(3));
    Ok(())
}

#[test]
fn worker_survives_a_panicking_task() -> Result<()> {
    let pool = ThreadPool::builder().worker_threads(1).build();
    let (future, _task) = pool.run(
        || {
            panic!("boom");
        },
        0,
    )?;
    assert_eq!(future.wait(), Err(TaskError::Panicked("boom".to_owned())));

    // The same worker keeps serving tasks afterwards.
    let (future, _task) = pool.run(|| 9, 0)?;
    assert_eq!(future.wait(), Ok(9));
    Ok(())
}
