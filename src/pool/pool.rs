//! The priority thread pool.
//!
//! A fixed-width pool of named OS worker threads. Every worker owns a
//! priority-ordered waiting queue guarded by the pool's recursive lock; an
//! idle worker pulls the front (highest-priority) entry from the first peer
//! with pending work. Producers dispatch to the first idle worker, falling
//! back to worker 0 when all are busy — load balancing is the consumers' job
//! via stealing.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use tracing::{debug, error, trace};

use crate::error::PoolError;
use crate::pool::task::{FunctionTask, Task, TaskFuture, TaskRef, YieldMode};
use crate::pool::worker::{WaitingQueue, Worker};

struct WorkerEntry {
    worker: Arc<Worker>,
    queue: WaitingQueue,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerEntry>,
}

struct PoolConfig {
    thread_name_prefix: String,
    thread_stack_size: Option<usize>,
}

struct PoolShared {
    // Recursive: worker topology and every worker's queue membership. The
    // RefCell borrow is always confined to a single function; helpers take
    // `&mut PoolState` instead of re-borrowing.
    state: ReentrantMutex<RefCell<PoolState>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    idle: AtomicBool,
    stopped: AtomicBool,
    max_threads: AtomicUsize,
    wait_lock: Mutex<()>,
    all_idle: Condvar,
    cfg: PoolConfig,
}

/// Builder for a [`ThreadPool`].
pub struct PoolBuilder {
    worker_threads: Option<usize>,
    thread_name_prefix: String,
    thread_stack_size: Option<usize>,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name_prefix: "eventide".to_owned(),
            thread_stack_size: None,
        }
    }

    /// Number of worker threads; defaults to the hardware concurrency.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Worker threads are named `{prefix}-{index}`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    pub fn build(self) -> ThreadPool {
        let threads = self.worker_threads.unwrap_or_else(hardware_concurrency);
        let pool = ThreadPool {
            shared: Arc::new(PoolShared {
                state: ReentrantMutex::new(RefCell::new(PoolState::default())),
                handles: Mutex::new(Vec::new()),
                idle: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                max_threads: AtomicUsize::new(0),
                wait_lock: Mutex::new(()),
                all_idle: Condvar::new(),
                cfg: PoolConfig {
                    thread_name_prefix: self.thread_name_prefix,
                    thread_stack_size: self.thread_stack_size,
                },
            }),
        };
        pool.reserve(threads);
        pool
    }
}

fn hardware_concurrency() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Fixed-size pool of worker threads with priority scheduling and work
/// stealing.
///
/// Dropping the pool waits for all queued work to drain, then stops and joins
/// every worker.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl ThreadPool {
    /// A pool sized to the hardware concurrency.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Grows the worker count to `count`; never shrinks.
    pub fn reserve(&self, count: usize) {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        let max = self.shared.max_threads.load(Ordering::Relaxed).max(count);
        self.shared.max_threads.store(max, Ordering::Relaxed);
        while state.workers.len() < max {
            spawn_worker(&self.shared, &mut state);
        }
    }

    /// Schedules `task` at `priority`.
    ///
    /// Dispatch policy: the first worker that is not running anything gets
    /// the task; when all workers are busy it is queued on worker 0, from
    /// where idle workers steal it. A stopped pool ignores the request.
    pub fn start(&self, task: TaskRef, priority: i32) -> Result<(), PoolError> {
        if self.stopped() {
            return Ok(());
        }
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        if state.workers.is_empty() {
            return Err(PoolError::NoThreads);
        }
        let index = state
            .workers
            .iter()
            .position(|entry| !entry.worker.active())
            .unwrap_or(0);
        add_task(&self.shared, &mut state, index, task, priority);
        Ok(())
    }

    /// Like [`ThreadPool::start`], but returns `false` without enqueuing when
    /// no worker is currently idle.
    pub fn try_start(&self, task: TaskRef, priority: i32) -> bool {
        if self.stopped() {
            return false;
        }
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        let Some(index) = state
            .workers
            .iter()
            .position(|entry| !entry.worker.active())
        else {
            return false;
        };
        add_task(&self.shared, &mut state, index, task, priority);
        true
    }

    /// Wraps `body` into a [`FunctionTask`], schedules it and returns the
    /// completion future together with the task handle.
    ///
    /// On a stopped pool the task is not scheduled and the future is already
    /// resolved as cancelled.
    #[allow(clippy::type_complexity)]
    pub fn run<T: Send + 'static>(
        &self,
        body: impl FnOnce() -> T + Send + 'static,
        priority: i32,
    ) -> Result<(TaskFuture<T>, Arc<FunctionTask<T>>), PoolError> {
        let task = FunctionTask::new(body);
        let future = task.future();
        if self.stopped() {
            task.cancel();
            task.skipped();
            return Ok((future, task));
        }
        self.start(task.clone(), priority)?;
        Ok((future, task))
    }

    /// Blocks the calling thread until the pool is stopped or every worker is
    /// simultaneously idle.
    ///
    /// Must not be called from a worker thread; the caller would wait for
    /// itself.
    pub fn wait(&self) {
        if self.stopped() || self.idle() {
            return;
        }
        let mut guard = self.shared.wait_lock.lock();
        while !self.shared.stopped.load(Ordering::SeqCst)
            && !self.shared.idle.load(Ordering::SeqCst)
        {
            self.shared.all_idle.wait(&mut guard);
        }
    }

    /// Signals every worker to stop, joins them, then releases any
    /// [`ThreadPool::wait`] callers. Idempotent.
    ///
    /// Tasks still waiting in worker queues are abandoned; use
    /// [`ThreadPool::wait`] first to drain them.
    pub fn stop(&self) {
        if self.stopped() {
            return;
        }
        let workers: Vec<Arc<Worker>> = {
            let guard = self.shared.state.lock();
            let state = guard.borrow();
            state.workers.iter().map(|entry| entry.worker.clone()).collect()
        };
        for worker in &workers {
            worker.stop_signal();
        }
        let handles: Vec<_> = self.shared.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("pool worker thread panicked during stop");
            }
        }
        {
            let _guard = self.shared.wait_lock.lock();
            self.shared.stopped.store(true, Ordering::SeqCst);
        }
        self.shared.all_idle.notify_all();
        debug!("thread pool stopped");
    }

    pub fn stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Whether every worker is idle (no active task, empty queue).
    pub fn idle(&self) -> bool {
        self.shared.idle.load(Ordering::SeqCst)
    }

    pub fn busy(&self) -> bool {
        !self.idle()
    }

    pub fn max_threads(&self) -> usize {
        self.shared.max_threads.load(Ordering::Relaxed)
    }

    pub fn total_threads(&self) -> usize {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state.workers.len()
    }

    pub fn active_threads(&self) -> usize {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        state
            .workers
            .iter()
            .filter(|entry| entry.worker.active())
            .count()
    }

    pub fn available_threads(&self) -> usize {
        self.max_threads().saturating_sub(self.active_threads())
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.wait();
        self.stop();
    }
}

/// The process-wide default pool, created lazily at hardware concurrency.
pub fn default_thread_pool() -> &'static ThreadPool {
    static DEFAULT_POOL: OnceLock<ThreadPool> = OnceLock::new();
    DEFAULT_POOL.get_or_init(ThreadPool::new)
}

fn spawn_worker(shared: &Arc<PoolShared>, state: &mut PoolState) {
    let index = state.workers.len();
    let worker = Arc::new(Worker::new(index));
    state.workers.push(WorkerEntry {
        worker: worker.clone(),
        queue: WaitingQueue::new(),
    });

    let mut builder =
        thread::Builder::new().name(format!("{}-{index}", shared.cfg.thread_name_prefix));
    if let Some(stack_size) = shared.cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }
    let loop_shared = shared.clone();
    let handle = builder
        .spawn(move || worker_loop(loop_shared, worker))
        .expect("failed to spawn pool worker thread");
    shared.handles.lock().push(handle);
    debug!(index, "spawned pool worker");
}

fn worker_loop(shared: Arc<PoolShared>, worker: Arc<Worker>) {
    loop {
        let Some(task) = worker.wait_for_work() else {
            break;
        };
        if task.cancelled() {
            trace!(worker = worker.index(), "skipping cancelled task");
            task.skipped();
        } else if panic::catch_unwind(AssertUnwindSafe(|| task.run(YieldMode::NoYield))).is_err() {
            error!(worker = worker.index(), "task panicked; worker continues");
        }
        let guard = shared.state.lock();
        let mut state = guard.borrow_mut();
        worker
            .release()
            .unwrap_or_else(|e| panic!("thread pool invariant violated: {e}"));
        next_task(&shared, &mut state, worker.index());
    }
}

/// Promotes the worker's next task, stealing from a peer when its own queue
/// is empty, and reports the resulting busy/idle transition.
fn next_task(shared: &PoolShared, state: &mut PoolState, index: usize) {
    if state.workers[index].worker.active() {
        panic!("thread pool invariant violated: {}", PoolError::AlreadyActive);
    }
    if state.workers[index].queue.is_empty() {
        steal_for(state, index);
    }
    if let Some((task, _priority)) = state.workers[index].queue.pop_front() {
        state.workers[index]
            .worker
            .promote(task)
            .unwrap_or_else(|e| panic!("thread pool invariant violated: {e}"));
        thread_gone_busy(shared, state);
    } else {
        thread_gone_idle(shared, state);
    }
}

/// Scans workers in creation order and transfers the front (highest-priority)
/// entry of the first non-empty peer queue to the thief. One transfer ends
/// the scan.
fn steal_for(state: &mut PoolState, thief: usize) -> bool {
    for victim in 0..state.workers.len() {
        if victim == thief {
            continue;
        }
        if let Some((task, priority)) = state.workers[victim].queue.pop_front() {
            trace!(
                victim,
                thief,
                remaining = state.workers[victim].queue.len(),
                "stole task"
            );
            state.workers[thief].queue.insert(task, priority);
            return true;
        }
    }
    false
}

fn add_task(shared: &PoolShared, state: &mut PoolState, index: usize, task: TaskRef, priority: i32) {
    state.workers[index].queue.insert(task, priority);
    if !state.workers[index].worker.active() {
        next_task(shared, state, index);
    }
}

fn update_idle(shared: &PoolShared, state: &PoolState) {
    let idle = state
        .workers
        .iter()
        .all(|entry| !entry.worker.active() && entry.queue.is_empty());
    let _guard = shared.wait_lock.lock();
    shared.idle.store(idle, Ordering::SeqCst);
}

fn thread_gone_idle(shared: &PoolShared, state: &PoolState) {
    update_idle(shared, state);
    shared.all_idle.notify_all();
}

fn thread_gone_busy(shared: &PoolShared, state: &PoolState) {
    update_idle(shared, state);
}
