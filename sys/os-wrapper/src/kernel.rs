// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seam between the wrapper and whatever kernel sits underneath it.
//!
//! A backend implements one trait per kind of kernel object. The wrapper only
//! ever passes native handles back to the backend that produced them; it never
//! looks inside. Status codes come back in the kernel's own vocabulary
//! ([`KernelStatus`]) and are collapsed into SUCCESS/ERROR by the wrapper, not
//! here.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Entry point of a kernel thread. The argument is the word passed to
/// `thread_new`.
///
/// This is `C-unwind` rather than `C` so that a hosted backend may implement
/// thread exit by unwinding back to the spawn boundary; on target the two
/// share a calling convention.
pub type ThreadEntry = extern "C-unwind" fn(arg: usize);

/// Native pass/fail code, as returned by the kernel's "take" and "give"
/// calls (`pdPASS`/`pdFAIL` on FreeRTOS).
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum KernelStatus {
    Fail = 0,
    Pass = 1,
}

impl KernelStatus {
    /// Decodes a raw native status. Anything the kernel did not document is
    /// a failure.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_i32(raw).unwrap_or(Self::Fail)
    }

    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

impl From<bool> for KernelStatus {
    fn from(pass: bool) -> Self {
        if pass {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

/// How long a blocking kernel call may wait, in kernel ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wait {
    Ticks(u32),
    Forever,
}

pub trait ThreadKernel {
    type Thread: Copy + Eq + core::fmt::Debug;

    /// Creates a thread that runs `entry(arg)`. `None` means the kernel could
    /// not allocate it.
    fn task_create(
        &self,
        entry: ThreadEntry,
        name: &str,
        stack_size: u32,
        arg: usize,
        priority: u32,
    ) -> Option<Self::Thread>;

    fn current_task(&self) -> Self::Thread;

    fn task_priority(&self, task: Self::Thread) -> u32;

    fn set_task_priority(&self, task: Self::Thread, priority: u32);

    /// Deletes the calling thread.
    fn exit_current(&self) -> !;
}

pub trait SemaphoreKernel {
    type Semaphore: core::fmt::Debug;

    fn semaphore_create(
        &self,
        max_count: u32,
        initial_count: u32,
    ) -> Option<Self::Semaphore>;

    fn semaphore_take(&self, sem: &Self::Semaphore, wait: Wait) -> KernelStatus;

    fn semaphore_give(&self, sem: &Self::Semaphore) -> KernelStatus;

    fn semaphore_delete(&self, sem: Self::Semaphore);
}

pub trait MutexKernel {
    type Mutex: core::fmt::Debug;

    /// Creates a non-recursive mutex. `None` if the kernel cannot allocate one
    /// at runtime.
    fn mutex_create(&self) -> Option<Self::Mutex>;

    fn mutex_take(&self, mutex: &Self::Mutex, wait: Wait) -> KernelStatus;

    /// Fails if the caller does not hold the mutex.
    fn mutex_give(&self, mutex: &Self::Mutex) -> KernelStatus;

    fn mutex_delete(&self, mutex: Self::Mutex);
}

pub trait TickKernel {
    /// Length of one tick in milliseconds. Never zero.
    fn tick_period_ms(&self) -> u32;

    fn tick_count(&self) -> u32;
}

/// Everything the wrapper knows how to drive.
pub trait Kernel: ThreadKernel + SemaphoreKernel + MutexKernel + TickKernel {}

impl<K> Kernel for K where
    K: ThreadKernel + SemaphoreKernel + MutexKernel + TickKernel
{
}
