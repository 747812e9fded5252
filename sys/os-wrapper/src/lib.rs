// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OS wrapper for non-secure RTOS code.
//!
//! Upper layers (the non-secure interface gate, client libraries) need a
//! handful of kernel primitives: threads, counting semaphores and mutexes.
//! They should not have to name a particular kernel to get them. This crate
//! provides [`OsWrapper`], which forwards each operation to a backend
//! implementing the traits in [`kernel`], and reports the result as one of two
//! outcomes.
//!
//! # Outcomes
//!
//! Operations that act on an existing object return [`OsResult`]. There is a
//! single error, [`OsWrapperError::Error`]; a timeout looks the same as a
//! rejection by the kernel. Operations that *create* an object return an
//! `Option` instead, with `None` standing in for a null handle.
//!
//! # Null mutex handles
//!
//! The mutex operations accept `Option<&MutexHandle>` and fail immediately on
//! `None`. Callers commonly store the result of `mutex_create` and use it
//! later without re-checking, so the check lives here. The semaphore
//! operations take a handle by reference and have no such path.
//!
//! # Backends
//!
//! - `freertos` (feature): binds the FreeRTOS C API.
//! - The `host-kernel` crate implements the traits over host threads for
//!   testing.

// Allow std-y things to be used in test.
#![cfg_attr(not(test), no_std)]
#![forbid(clippy::wildcard_imports)]

pub mod error;
pub mod handle;
pub mod kernel;
pub mod time;

#[cfg(feature = "freertos")]
pub mod freertos;

pub use error::{
    outcome_code, OsResult, OsWrapperError, OS_WRAPPER_ERROR,
    OS_WRAPPER_SUCCESS,
};
pub use handle::{MutexHandle, SemaphoreHandle, ThreadHandle};
pub use kernel::{
    Kernel, KernelStatus, MutexKernel, SemaphoreKernel, ThreadEntry,
    ThreadKernel, TickKernel, Wait,
};
pub use time::{Timeout, WAIT_FOREVER};

use error::check;
use ringbuf::{ringbuf, ringbuf_entry};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trace {
    None,
    ThreadCreateFailed,
    SemaphoreRejected { max_count: u32, initial_count: u32 },
    SemaphoreCreateFailed,
    MutexCreateFailed,
    NullMutexAcquire,
    NullMutexRelease,
}

ringbuf!(Trace, 16, Trace::None);

/// Thread, semaphore and mutex operations on top of kernel `K`.
///
/// The wrapper holds no state of its own beyond the backend; it is `Sync`
/// exactly when the backend is, and is normally shared by reference.
#[derive(Debug, Default)]
pub struct OsWrapper<K> {
    kernel: K,
}

impl<K> OsWrapper<K> {
    pub const fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: ThreadKernel> OsWrapper<K> {
    /// Creates a thread running `entry(arg)` at `priority`.
    ///
    /// Returns `None` if the kernel is out of resources. There is no retry.
    pub fn thread_new(
        &self,
        name: &str,
        stack_size: u32,
        entry: ThreadEntry,
        arg: usize,
        priority: u32,
    ) -> Option<ThreadHandle<K::Thread>> {
        let created =
            self.kernel
                .task_create(entry, name, stack_size, arg, priority);
        if created.is_none() {
            ringbuf_entry!(Trace::ThreadCreateFailed);
        }
        created.map(ThreadHandle::new)
    }

    /// Handle of the calling thread.
    pub fn thread_get_handle(&self) -> ThreadHandle<K::Thread> {
        ThreadHandle::new(self.kernel.current_task())
    }

    /// Current priority of `handle`. The kernels we sit on have no failure
    /// path here, so this is always `Ok`.
    pub fn thread_get_priority(
        &self,
        handle: &ThreadHandle<K::Thread>,
    ) -> OsResult<u32> {
        Ok(self.kernel.task_priority(handle.native()))
    }

    pub fn thread_set_priority(
        &self,
        handle: &ThreadHandle<K::Thread>,
        priority: u32,
    ) -> OsResult {
        self.kernel.set_task_priority(handle.native(), priority);
        Ok(())
    }

    /// Terminates the calling thread.
    pub fn thread_exit(&self) -> ! {
        self.kernel.exit_current()
    }
}

impl<K: SemaphoreKernel + TickKernel> OsWrapper<K> {
    /// Creates a counting semaphore holding `initial_count` of at most
    /// `max_count` tokens.
    ///
    /// `name` is accepted for interface compatibility; no kernel we wrap
    /// records it.
    pub fn semaphore_create(
        &self,
        max_count: u32,
        initial_count: u32,
        _name: &str,
    ) -> Option<SemaphoreHandle<K::Semaphore>> {
        if max_count == 0 || initial_count > max_count {
            ringbuf_entry!(Trace::SemaphoreRejected {
                max_count,
                initial_count
            });
            return None;
        }
        let created = self.kernel.semaphore_create(max_count, initial_count);
        if created.is_none() {
            ringbuf_entry!(Trace::SemaphoreCreateFailed);
        }
        created.map(SemaphoreHandle::new)
    }

    /// Takes one token, blocking for at most `timeout`.
    pub fn semaphore_acquire(
        &self,
        handle: &SemaphoreHandle<K::Semaphore>,
        timeout: Timeout,
    ) -> OsResult {
        let wait = timeout.to_wait(self.kernel.tick_period_ms());
        check(self.kernel.semaphore_take(handle.native(), wait))
    }

    /// Returns one token. Fails if the count is already at its maximum.
    pub fn semaphore_release(
        &self,
        handle: &SemaphoreHandle<K::Semaphore>,
    ) -> OsResult {
        check(self.kernel.semaphore_give(handle.native()))
    }

    /// Frees the semaphore. Threads still blocked on it are the caller's
    /// problem.
    pub fn semaphore_delete(
        &self,
        handle: SemaphoreHandle<K::Semaphore>,
    ) -> OsResult {
        self.kernel.semaphore_delete(handle.into_native());
        Ok(())
    }
}

impl<K: MutexKernel + TickKernel> OsWrapper<K> {
    /// Returns `None` if the kernel cannot allocate a mutex at runtime.
    pub fn mutex_create(&self) -> Option<MutexHandle<K::Mutex>> {
        let created = self.kernel.mutex_create();
        if created.is_none() {
            ringbuf_entry!(Trace::MutexCreateFailed);
        }
        created.map(MutexHandle::new)
    }

    /// Takes the mutex, blocking for at most `timeout`. A null handle fails
    /// without blocking.
    pub fn mutex_acquire(
        &self,
        handle: Option<&MutexHandle<K::Mutex>>,
        timeout: Timeout,
    ) -> OsResult {
        let Some(handle) = handle else {
            ringbuf_entry!(Trace::NullMutexAcquire);
            return Err(OsWrapperError::Error);
        };
        let wait = timeout.to_wait(self.kernel.tick_period_ms());
        check(self.kernel.mutex_take(handle.native(), wait))
    }

    /// Gives the mutex back. Fails for a null handle, or if the kernel
    /// refuses (for instance because the caller is not the owner).
    pub fn mutex_release(
        &self,
        handle: Option<&MutexHandle<K::Mutex>>,
    ) -> OsResult {
        let Some(handle) = handle else {
            ringbuf_entry!(Trace::NullMutexRelease);
            return Err(OsWrapperError::Error);
        };
        check(self.kernel.mutex_give(handle.native()))
    }

    pub fn mutex_delete(&self, handle: MutexHandle<K::Mutex>) -> OsResult {
        self.kernel.mutex_delete(handle.into_native());
        Ok(())
    }
}

impl<K: TickKernel> OsWrapper<K> {
    /// Kernel ticks since the scheduler started. Wraps.
    pub fn get_tick(&self) -> u32 {
        self.kernel.tick_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::{Just, Strategy};
    use std::cell::{Cell, RefCell};

    /// Single-threaded stand-in for a kernel. Nothing ever blocks: a take on
    /// an unavailable object fails at once, whatever the wait.
    #[derive(Default)]
    struct FakeKernel {
        tick_period_ms: u32,
        no_alloc: bool,
        next_thread: Cell<u32>,
        current: Cell<u32>,
        priorities: RefCell<Vec<(u32, u32)>>,
        // (count, max) per semaphore; `None` once deleted.
        sems: RefCell<Vec<Option<(u32, u32)>>>,
        // held flag per mutex; `None` once deleted.
        mutexes: RefCell<Vec<Option<bool>>>,
        waits: RefCell<Vec<Wait>>,
        kernel_calls: Cell<usize>,
    }

    impl FakeKernel {
        fn new() -> Self {
            Self {
                tick_period_ms: 1,
                ..Default::default()
            }
        }

        fn bump(&self) {
            self.kernel_calls.set(self.kernel_calls.get() + 1);
        }

        fn sem_count(&self, sem: usize) -> Option<u32> {
            self.sems.borrow()[sem].map(|(count, _)| count)
        }
    }

    extern "C-unwind" fn nop(_: usize) {}

    impl ThreadKernel for FakeKernel {
        type Thread = u32;

        fn task_create(
            &self,
            _entry: ThreadEntry,
            _name: &str,
            _stack_size: u32,
            _arg: usize,
            priority: u32,
        ) -> Option<u32> {
            self.bump();
            if self.no_alloc {
                return None;
            }
            let id = self.next_thread.get() + 1;
            self.next_thread.set(id);
            self.priorities.borrow_mut().push((id, priority));
            Some(id)
        }

        fn current_task(&self) -> u32 {
            self.current.get()
        }

        fn task_priority(&self, task: u32) -> u32 {
            self.priorities
                .borrow()
                .iter()
                .find(|(id, _)| *id == task)
                .map(|(_, p)| *p)
                .unwrap_or(0)
        }

        fn set_task_priority(&self, task: u32, priority: u32) {
            for entry in self.priorities.borrow_mut().iter_mut() {
                if entry.0 == task {
                    entry.1 = priority;
                }
            }
        }

        fn exit_current(&self) -> ! {
            panic!("thread exit")
        }
    }

    impl SemaphoreKernel for FakeKernel {
        type Semaphore = usize;

        fn semaphore_create(&self, max: u32, initial: u32) -> Option<usize> {
            self.bump();
            if self.no_alloc {
                return None;
            }
            let mut sems = self.sems.borrow_mut();
            sems.push(Some((initial, max)));
            Some(sems.len() - 1)
        }

        fn semaphore_take(&self, sem: &usize, wait: Wait) -> KernelStatus {
            self.bump();
            self.waits.borrow_mut().push(wait);
            match &mut self.sems.borrow_mut()[*sem] {
                Some((count, _)) if *count > 0 => {
                    *count -= 1;
                    KernelStatus::Pass
                }
                _ => KernelStatus::Fail,
            }
        }

        fn semaphore_give(&self, sem: &usize) -> KernelStatus {
            self.bump();
            match &mut self.sems.borrow_mut()[*sem] {
                Some((count, max)) if *count < *max => {
                    *count += 1;
                    KernelStatus::Pass
                }
                _ => KernelStatus::Fail,
            }
        }

        fn semaphore_delete(&self, sem: usize) {
            self.bump();
            self.sems.borrow_mut()[sem] = None;
        }
    }

    impl MutexKernel for FakeKernel {
        type Mutex = usize;

        fn mutex_create(&self) -> Option<usize> {
            self.bump();
            if self.no_alloc {
                return None;
            }
            let mut mutexes = self.mutexes.borrow_mut();
            mutexes.push(Some(false));
            Some(mutexes.len() - 1)
        }

        fn mutex_take(&self, mutex: &usize, wait: Wait) -> KernelStatus {
            self.bump();
            self.waits.borrow_mut().push(wait);
            match &mut self.mutexes.borrow_mut()[*mutex] {
                Some(held) if !*held => {
                    *held = true;
                    KernelStatus::Pass
                }
                _ => KernelStatus::Fail,
            }
        }

        fn mutex_give(&self, mutex: &usize) -> KernelStatus {
            self.bump();
            match &mut self.mutexes.borrow_mut()[*mutex] {
                Some(held) if *held => {
                    *held = false;
                    KernelStatus::Pass
                }
                _ => KernelStatus::Fail,
            }
        }

        fn mutex_delete(&self, mutex: usize) {
            self.bump();
            self.mutexes.borrow_mut()[mutex] = None;
        }
    }

    impl TickKernel for FakeKernel {
        fn tick_period_ms(&self) -> u32 {
            self.tick_period_ms
        }

        fn tick_count(&self) -> u32 {
            1234
        }
    }

    fn make_uut() -> OsWrapper<FakeKernel> {
        OsWrapper::new(FakeKernel::new())
    }

    #[test]
    fn thread_new_records_priority() {
        let os = make_uut();
        let t = os.thread_new("worker", 256, nop, 7, 3).unwrap();
        assert_eq!(os.thread_get_priority(&t), Ok(3));

        assert_eq!(os.thread_set_priority(&t, 9), Ok(()));
        assert_eq!(os.thread_get_priority(&t), Ok(9));
    }

    #[test]
    fn thread_new_reports_exhaustion_as_none() {
        let os = OsWrapper::new(FakeKernel {
            no_alloc: true,
            ..FakeKernel::new()
        });
        assert!(os.thread_new("worker", 256, nop, 0, 1).is_none());
    }

    #[test]
    fn thread_get_handle_is_current_task() {
        let os = make_uut();
        os.kernel().current.set(42);
        assert_eq!(os.thread_get_handle().native(), 42);
    }

    #[test]
    fn null_mutex_is_rejected_without_reaching_kernel() {
        let os = make_uut();
        let before = os.kernel().kernel_calls.get();

        assert_eq!(
            os.mutex_acquire(None, Timeout::Forever),
            Err(OsWrapperError::Error)
        );
        assert_eq!(os.mutex_release(None), Err(OsWrapperError::Error));
        assert_eq!(os.kernel().kernel_calls.get(), before);

        #[cfg(not(feature = "no-trace"))]
        {
            let ring = __RINGBUF.lock();
            assert!(ring.count_of(Trace::NullMutexAcquire) >= 1);
            assert!(ring.count_of(Trace::NullMutexRelease) >= 1);
        }
    }

    #[test]
    fn failed_mutex_create_yields_unusable_null() {
        let os = OsWrapper::new(FakeKernel {
            no_alloc: true,
            ..FakeKernel::new()
        });
        let m = os.mutex_create();
        assert!(m.is_none());
        assert!(os.mutex_acquire(m.as_ref(), Timeout::NONE).is_err());
        assert!(os.mutex_release(m.as_ref()).is_err());
    }

    #[test]
    fn mutex_round_trip() {
        let os = make_uut();
        let m = os.mutex_create().unwrap();

        assert_eq!(os.mutex_acquire(Some(&m), Timeout::Forever), Ok(()));
        // Not recursive.
        assert!(os.mutex_acquire(Some(&m), Timeout::NONE).is_err());
        assert_eq!(os.mutex_release(Some(&m)), Ok(()));
        // Nobody holds it now.
        assert!(os.mutex_release(Some(&m)).is_err());
        assert_eq!(os.mutex_delete(m), Ok(()));
    }

    #[test]
    fn acquire_timeouts_are_converted_to_ticks() {
        let os = OsWrapper::new(FakeKernel {
            tick_period_ms: 10,
            ..FakeKernel::new()
        });
        let s = os.semaphore_create(1, 1, "s").unwrap();
        let m = os.mutex_create().unwrap();

        os.semaphore_acquire(&s, Timeout::Millis(250)).unwrap();
        os.mutex_acquire(Some(&m), Timeout::from(WAIT_FOREVER)).unwrap();

        assert_eq!(
            *os.kernel().waits.borrow(),
            [Wait::Ticks(25), Wait::Forever]
        );
    }

    #[test]
    fn semaphore_rejects_bad_bounds() {
        let os = make_uut();
        assert!(os.semaphore_create(0, 0, "empty").is_none());
        assert!(os.semaphore_create(2, 3, "over").is_none());
        // The kernel was never asked.
        assert_eq!(os.kernel().kernel_calls.get(), 0);
    }

    #[test]
    fn semaphore_release_at_max_fails() {
        let os = make_uut();
        let s = os.semaphore_create(2, 2, "full").unwrap();
        assert_eq!(os.semaphore_release(&s), Err(OsWrapperError::Error));
        assert_eq!(os.semaphore_delete(s), Ok(()));
        assert_eq!(os.kernel().sem_count(0), None);
    }

    #[test]
    fn get_tick_reads_kernel() {
        assert_eq!(make_uut().get_tick(), 1234);
    }

    proptest::proptest! {
        #[test]
        fn initial_count_acquires_then_fails(
            (max, initial) in (1u32..64).prop_flat_map(|max| (
                Just(max),
                0..=max,
            )),
        ) {
            let os = make_uut();
            let s = os.semaphore_create(max, initial, "prop").unwrap();

            for _ in 0..initial {
                proptest::prop_assert_eq!(
                    os.semaphore_acquire(&s, Timeout::NONE),
                    Ok(())
                );
            }
            proptest::prop_assert!(
                os.semaphore_acquire(&s, Timeout::NONE).is_err()
            );
        }

        #[test]
        fn release_restores_count(
            (max, initial) in (1u32..64).prop_flat_map(|max| (
                Just(max),
                1..=max,
            )),
        ) {
            let os = make_uut();
            let s = os.semaphore_create(max, initial, "prop").unwrap();

            os.semaphore_acquire(&s, Timeout::NONE).unwrap();
            proptest::prop_assert_eq!(os.kernel().sem_count(0), Some(initial - 1));
            os.semaphore_release(&s).unwrap();
            proptest::prop_assert_eq!(os.kernel().sem_count(0), Some(initial));
        }
    }
}
