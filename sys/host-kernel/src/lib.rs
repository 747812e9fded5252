// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A kernel backend for the OS wrapper that runs on the build machine.
//!
//! Threads are host threads, semaphores and mutexes are built from std's
//! `Mutex` and `Condvar`, and the tick clock is wall time divided by a
//! configurable period. Scheduling is whatever the host does; priorities are
//! stored and reported but do not influence it.
//!
//! This exists so that code written against `os_wrapper::Kernel` can be
//! exercised under real concurrency without a board. [`HostKernelConfig`]
//! caps each object pool, which is how a test makes `mutex_create` and
//! friends fail on demand.
//!
//! # Thread exit
//!
//! `exit_current` unwinds back to the spawn boundary of the calling thread,
//! where it is caught and treated as a normal return. That only works for
//! threads this kernel created; calling it from any other thread unwinds that
//! thread like a panic would.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use os_wrapper::{
    KernelStatus, MutexKernel, SemaphoreKernel, ThreadEntry, ThreadKernel,
    TickKernel, Wait,
};

mod config;
mod registry;
mod sync;

pub use config::HostKernelConfig;

use registry::Registry;
use sync::{lock, HostMutex, HostSemaphore};

/// Smallest stack handed to a host thread. Target stack sizes are far too
/// small for a hosted runtime.
const MIN_HOST_STACK: usize = 64 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SemaphoreId(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MutexId(u32);

#[derive(Debug)]
struct TaskRecord {
    priority: u32,
    /// Not created by us; registered the first time it asked who it was.
    adopted: bool,
}

/// Payload used to unwind out of an exiting thread.
struct TaskExit;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Which task this host thread is, per kernel instance it has used.
///
/// Dropped when the host thread ends, taking the records of any kernels that
/// adopted the thread with it.
struct Identities(RefCell<Vec<Identity>>);

struct Identity {
    instance: u64,
    task: TaskId,
    /// Set when the kernel adopted this thread rather than spawning it.
    adopted_by: Option<Weak<Inner>>,
}

impl Identities {
    fn find(&self, instance: u64) -> Option<TaskId> {
        self.0
            .borrow()
            .iter()
            .find(|ident| ident.instance == instance)
            .map(|ident| ident.task)
    }

    fn push(&self, ident: Identity) {
        self.0.borrow_mut().push(ident);
    }
}

impl Drop for Identities {
    fn drop(&mut self) {
        for ident in self.0.get_mut().drain(..) {
            if let Some(inner) = ident.adopted_by.and_then(|k| k.upgrade()) {
                lock(&inner.tasks).remove(ident.task.0);
            }
        }
    }
}

thread_local! {
    static CURRENT: Identities = const { Identities(RefCell::new(Vec::new())) };
}

#[derive(Debug)]
struct Inner {
    instance: u64,
    config: HostKernelConfig,
    epoch: Instant,
    tasks: Mutex<Registry<TaskRecord>>,
    task_exited: Condvar,
    semaphores: Mutex<Registry<Arc<HostSemaphore>>>,
    mutexes: Mutex<Registry<Arc<HostMutex>>>,
}

/// Cheap to clone; clones share the same kernel.
#[derive(Clone, Debug)]
pub struct HostKernel {
    inner: Arc<Inner>,
}

impl Default for HostKernel {
    fn default() -> Self {
        Self::new(HostKernelConfig::default())
    }
}

impl HostKernel {
    pub fn new(config: HostKernelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                epoch: Instant::now(),
                // Limited in task_create; adopted threads do not count.
                tasks: Mutex::new(Registry::new(None)),
                task_exited: Condvar::new(),
                semaphores: Mutex::new(Registry::new(config.max_semaphores)),
                mutexes: Mutex::new(Registry::new(config.max_mutexes)),
                config,
            }),
        }
    }

    pub fn config(&self) -> &HostKernelConfig {
        &self.inner.config
    }

    /// Threads created by this kernel that have not yet finished.
    pub fn running_threads(&self) -> usize {
        lock(&self.inner.tasks)
            .values()
            .filter(|t| !t.adopted)
            .count()
    }

    /// Blocks until every thread this kernel created has finished, or
    /// `timeout` passes. Returns whether they all finished.
    pub fn wait_for_threads(&self, timeout: Duration) -> bool {
        let tasks = lock(&self.inner.tasks);
        let (tasks, _) = self
            .inner
            .task_exited
            .wait_timeout_while(tasks, timeout, |tasks| {
                tasks.values().any(|t| !t.adopted)
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let all_finished = !tasks.values().any(|t| !t.adopted);
        all_finished
    }

    /// Tokens currently available in `sem`, or `None` if it has been deleted.
    pub fn semaphore_count(&self, sem: SemaphoreId) -> Option<u32> {
        lock(&self.inner.semaphores).get(sem.0).map(|s| s.count())
    }

    /// Task holding `mutex`, if any.
    pub fn mutex_owner(&self, mutex: MutexId) -> Option<TaskId> {
        lock(&self.inner.mutexes).get(mutex.0).and_then(|m| m.owner())
    }

    fn wait_limit(&self, wait: Wait) -> Option<Duration> {
        match wait {
            Wait::Forever => None,
            Wait::Ticks(t) => Some(Duration::from_millis(
                u64::from(t) * u64::from(self.tick_period_ms()),
            )),
        }
    }

    fn run_task(&self, id: TaskId, entry: ThreadEntry, arg: usize) {
        CURRENT.with(|c| {
            c.push(Identity {
                instance: self.inner.instance,
                task: id,
                adopted_by: None,
            })
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(arg)));

        lock(&self.inner.tasks).remove(id.0);
        self.inner.task_exited.notify_all();

        if let Err(payload) = outcome {
            if !payload.is::<TaskExit>() {
                panic::resume_unwind(payload);
            }
        }
    }
}

impl ThreadKernel for HostKernel {
    type Thread = TaskId;

    fn task_create(
        &self,
        entry: ThreadEntry,
        name: &str,
        stack_size: u32,
        arg: usize,
        priority: u32,
    ) -> Option<TaskId> {
        if stack_size == 0 {
            return None;
        }
        let id = {
            let mut tasks = lock(&self.inner.tasks);
            let spawned = tasks.values().filter(|t| !t.adopted).count();
            if let Some(max) = self.inner.config.max_threads {
                if spawned >= max {
                    return None;
                }
            }
            TaskId(tasks.insert_unbounded(TaskRecord {
                priority,
                adopted: false,
            }))
        };
        // Host thread names cannot hold a NUL; keep what precedes it.
        let name = name.find('\0').map_or(name, |nul| &name[..nul]);

        let kernel = self.clone();
        let stack = (stack_size as usize)
            .saturating_mul(core::mem::size_of::<usize>())
            .max(MIN_HOST_STACK);
        let spawned = thread::Builder::new()
            .name(name.to_owned())
            .stack_size(stack)
            .spawn(move || kernel.run_task(id, entry, arg));

        match spawned {
            Ok(_) => Some(id),
            Err(_) => {
                lock(&self.inner.tasks).remove(id.0);
                None
            }
        }
    }

    fn current_task(&self) -> TaskId {
        let instance = self.inner.instance;
        if let Some(id) = CURRENT.with(|c| c.find(instance)) {
            return id;
        }

        let id = TaskId(lock(&self.inner.tasks).insert_unbounded(TaskRecord {
            priority: 0,
            adopted: true,
        }));
        CURRENT.with(|c| {
            c.push(Identity {
                instance,
                task: id,
                adopted_by: Some(Arc::downgrade(&self.inner)),
            })
        });
        id
    }

    fn task_priority(&self, task: TaskId) -> u32 {
        lock(&self.inner.tasks)
            .get(task.0)
            .map(|t| t.priority)
            .unwrap_or(0)
    }

    fn set_task_priority(&self, task: TaskId, priority: u32) {
        if let Some(t) = lock(&self.inner.tasks).get_mut(task.0) {
            t.priority = priority;
        }
    }

    fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(TaskExit))
    }
}

impl SemaphoreKernel for HostKernel {
    type Semaphore = SemaphoreId;

    fn semaphore_create(
        &self,
        max_count: u32,
        initial_count: u32,
    ) -> Option<SemaphoreId> {
        let sem = Arc::new(HostSemaphore::new(max_count, initial_count));
        lock(&self.inner.semaphores).insert(sem).map(SemaphoreId)
    }

    fn semaphore_take(&self, sem: &SemaphoreId, wait: Wait) -> KernelStatus {
        // Clone out of the registry so the registry is not held while blocked.
        let Some(s) = lock(&self.inner.semaphores).get(sem.0).cloned() else {
            return KernelStatus::Fail;
        };
        s.take(self.wait_limit(wait)).into()
    }

    fn semaphore_give(&self, sem: &SemaphoreId) -> KernelStatus {
        let Some(s) = lock(&self.inner.semaphores).get(sem.0).cloned() else {
            return KernelStatus::Fail;
        };
        s.give().into()
    }

    fn semaphore_delete(&self, sem: SemaphoreId) {
        lock(&self.inner.semaphores).remove(sem.0);
    }
}

impl MutexKernel for HostKernel {
    type Mutex = MutexId;

    fn mutex_create(&self) -> Option<MutexId> {
        if !self.inner.config.dynamic_allocation {
            return None;
        }
        lock(&self.inner.mutexes)
            .insert(Arc::new(HostMutex::default()))
            .map(MutexId)
    }

    fn mutex_take(&self, mutex: &MutexId, wait: Wait) -> KernelStatus {
        let me = self.current_task();
        let Some(m) = lock(&self.inner.mutexes).get(mutex.0).cloned() else {
            return KernelStatus::Fail;
        };
        m.take(me, self.wait_limit(wait)).into()
    }

    fn mutex_give(&self, mutex: &MutexId) -> KernelStatus {
        let me = self.current_task();
        let Some(m) = lock(&self.inner.mutexes).get(mutex.0).cloned() else {
            return KernelStatus::Fail;
        };
        m.give(me).into()
    }

    fn mutex_delete(&self, mutex: MutexId) {
        lock(&self.inner.mutexes).remove(mutex.0);
    }
}

impl TickKernel for HostKernel {
    fn tick_period_ms(&self) -> u32 {
        self.inner.config.tick_period_ms.max(1)
    }

    fn tick_count(&self) -> u32 {
        let ms = self.inner.epoch.elapsed().as_millis();
        // Wraps, like a target tick counter.
        (ms / u128::from(self.tick_period_ms())) as u32
    }
}
