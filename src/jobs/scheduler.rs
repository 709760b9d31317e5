//! Dependency-graph job scheduler on top of a rayon thread pool.
//!
//! Every `schedule` call takes predecessor handles and returns a handle for
//! "this job and everything before it". Jobs whose predecessors are already
//! done are batched until [`JobScheduler::flush`]; jobs released by a
//! finishing predecessor are dispatched immediately from the worker.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::core::types::Result;

type Work = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct NodeState {
    done: bool,
    dependents: Vec<Arc<JobNode>>,
}

struct JobNode {
    label: &'static str,
    /// Unfinished predecessors, plus one while the node is being wired up
    remaining: AtomicUsize,
    work: Mutex<Option<Work>>,
    state: Mutex<NodeState>,
    finished: Condvar,
}

impl JobNode {
    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SchedulerShared {
    pool: rayon::ThreadPool,
    pending: Mutex<Vec<Arc<JobNode>>>,
    scheduled: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl SchedulerShared {
    fn dispatch(self: &Arc<Self>, node: Arc<JobNode>) {
        let shared = Arc::clone(self);
        self.pool.spawn(move || shared.execute(node));
    }

    fn execute(self: &Arc<Self>, node: Arc<JobNode>) {
        let work = node.work.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(work) = work {
            if catch_unwind(AssertUnwindSafe(work)).is_err() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                error!("Job '{}' panicked; marking it complete", node.label);
            }
        }
        self.complete(&node);
    }

    fn complete(self: &Arc<Self>, node: &Arc<JobNode>) {
        let dependents = {
            let mut state = node.state();
            state.done = true;
            std::mem::take(&mut state.dependents)
        };
        node.finished.notify_all();
        self.completed.fetch_add(1, Ordering::Relaxed);

        for dependent in dependents {
            if dependent.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.release(dependent, false);
            }
        }
    }

    /// Node has no unfinished predecessors left.
    fn release(self: &Arc<Self>, node: Arc<JobNode>, batch: bool) {
        let has_work = node.work.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        if !has_work {
            // Join nodes finish as soon as their inputs do
            self.complete(&node);
        } else if batch {
            self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(node);
        } else {
            self.dispatch(node);
        }
    }

    fn flush(self: &Arc<Self>) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let count = batch.len();
        for node in batch {
            self.dispatch(node);
        }
        count
    }
}

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub completed: u64,
    pub panicked: u64,
    /// Root-ready jobs waiting for the next flush
    pub pending: usize,
}

/// Handle for a scheduled job and all of its predecessors.
#[derive(Clone, Default)]
pub struct JobHandle {
    node: Option<Arc<JobNode>>,
    scheduler: Weak<SchedulerShared>,
}

impl JobHandle {
    /// A handle that is already satisfied.
    pub fn completed() -> Self {
        Self::default()
    }

    /// Non-blocking completion check.
    pub fn is_complete(&self) -> bool {
        match &self.node {
            Some(node) => node.state().done,
            None => true,
        }
    }

    /// Block until the job has run. Flushes pending work first so a handle
    /// waiting on a batched job cannot deadlock.
    pub fn wait(&self) {
        let Some(node) = &self.node else { return };
        if let Some(shared) = self.scheduler.upgrade() {
            shared.flush();
        }
        let mut state = node.state();
        while !state.done {
            state = node.finished.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns
    /// whether the job completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(node) = &self.node else { return true };
        if let Some(shared) = self.scheduler.upgrade() {
            shared.flush();
        }
        let deadline = Instant::now() + timeout;
        let mut state = node.state();
        while !state.done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = node
                .finished
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// True when both handles refer to the same job.
    pub fn same_job(&self, other: &JobHandle) -> bool {
        match (&self.node, &other.node) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        self.node.as_ref().map_or("completed", |node| node.label)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("label", &self.label())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Worker pool plus job graph. Cloning shares the same pool.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<SchedulerShared>,
}

impl JobScheduler {
    /// Build a pool with `threads` workers (0 = one per core).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxmesh-worker-{i}"))
            .build()?;
        debug!("Job scheduler started with {} workers", pool.current_num_threads());

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                pool,
                pending: Mutex::new(Vec::new()),
                scheduled: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
            }),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.shared.pool.current_num_threads()
    }

    /// Schedule `work` to run after every handle in `deps`.
    pub fn schedule<F>(&self, label: &'static str, deps: &[JobHandle], work: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(label, deps, Some(Box::new(work)))
    }

    /// A handle that completes once every handle in `handles` has.
    pub fn combine(&self, handles: &[JobHandle]) -> JobHandle {
        let live: Vec<&JobHandle> = handles.iter().filter(|h| !h.is_complete()).collect();
        match live.as_slice() {
            [] => JobHandle::completed(),
            [single] => (*single).clone(),
            _ => self.insert("combine", handles, None),
        }
    }

    /// Dispatch every batched root-ready job. Returns how many were sent.
    pub fn flush(&self) -> usize {
        self.shared.flush()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.shared.scheduled.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            pending: self.shared.pending.lock().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    fn insert(&self, label: &'static str, deps: &[JobHandle], work: Option<Work>) -> JobHandle {
        let node = Arc::new(JobNode {
            label,
            remaining: AtomicUsize::new(1),
            work: Mutex::new(work),
            state: Mutex::new(NodeState::default()),
            finished: Condvar::new(),
        });
        self.shared.scheduled.fetch_add(1, Ordering::Relaxed);

        for dep in deps {
            let Some(dep_node) = &dep.node else { continue };
            let mut state = dep_node.state();
            if !state.done {
                node.remaining.fetch_add(1, Ordering::AcqRel);
                state.dependents.push(Arc::clone(&node));
            }
        }

        if node.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.release(Arc::clone(&node), true);
        }

        JobHandle {
            node: Some(node),
            scheduler: Arc::downgrade(&self.shared),
        }
    }
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("workers", &self.worker_count())
            .field("stats", &self.stats())
            .finish()
    }
}
