// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serialized dispatch of secure-side calls.
//!
//! The secure world on an Armv8-M part can only service one call from the
//! non-secure world at a time. Every non-secure thread that wants to call a
//! veneer therefore goes through an [`NsInterface`], which owns a kernel mutex
//! and holds it for exactly the duration of the call:
//!
//! 1. take the lock, as [`AcquireMode`] says;
//! 2. call the veneer on the calling thread with four word arguments;
//! 3. give the lock back, whatever the veneer returned;
//! 4. hand the veneer's return value back unchanged.
//!
//! A gate only exists once its mutex has been created, so there is no
//! "dispatch before init" state to get wrong. Gates are independent of one
//! another; two gates do not exclude each other's calls.
//!
//! ```ignore
//! let gate = NsInterface::lock_init(&os, NsInterfaceConfig::default())?;
//! let rc = unsafe { gate.dispatch(tfm_psa_framework_version_veneer, 0, 0, 0, 0) }?;
//! ```

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::wildcard_imports)]

mod cancel;
mod config;
mod error;

pub use cancel::CancelToken;
pub use config::{
    AcquireMode, NsInterfaceConfig, ReleaseFailure, DEFAULT_POLL_INTERVAL_MS,
};
pub use error::{DispatchError, LockInitError};

use os_wrapper::{MutexHandle, MutexKernel, OsWrapper, Timeout, TickKernel};
use ringbuf::{ringbuf, ringbuf_entry};

/// A secure-side entry point: four word arguments in, one status word out.
pub type Veneer = unsafe extern "C" fn(u32, u32, u32, u32) -> i32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trace {
    None,
    LockCreated,
    LockCreateFailed,
    AcquireRetry,
    TimedOut,
    Cancelled,
    ReleaseFailed,
    Deleted,
}

ringbuf!(Trace, 16, Trace::None);

/// A lock-guarded path into the secure world.
///
/// Shared by reference between the threads that dispatch through it; it is
/// `Sync` whenever the kernel backend is.
#[derive(Debug)]
pub struct NsInterface<'a, K: MutexKernel + TickKernel> {
    os: &'a OsWrapper<K>,
    lock: MutexHandle<K::Mutex>,
    config: NsInterfaceConfig,
}

/// Reasons the lock was not taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Refusal {
    Timeout,
    Cancelled,
}

impl Refusal {
    fn into_error<R>(self) -> DispatchError<R> {
        match self {
            Self::Timeout => DispatchError::Timeout,
            Self::Cancelled => DispatchError::Cancelled,
        }
    }
}

/// The gate's lock, held. Gives it back on drop if `release` was not called,
/// so a guarded function that unwinds does not wedge the gate.
struct LockGuard<'g, K: MutexKernel + TickKernel> {
    os: &'g OsWrapper<K>,
    lock: &'g MutexHandle<K::Mutex>,
    held: bool,
}

impl<K: MutexKernel + TickKernel> LockGuard<'_, K> {
    fn release(mut self) -> os_wrapper::OsResult {
        self.held = false;
        self.os.mutex_release(Some(self.lock))
    }
}

impl<K: MutexKernel + TickKernel> Drop for LockGuard<'_, K> {
    fn drop(&mut self) {
        if self.held {
            let _ = self.os.mutex_release(Some(self.lock));
        }
    }
}

impl<'a, K: MutexKernel + TickKernel> NsInterface<'a, K> {
    /// Creates the gate's mutex.
    ///
    /// Fails only if the kernel cannot allocate a mutex, in which case there
    /// is no gate to dispatch through.
    pub fn lock_init(
        os: &'a OsWrapper<K>,
        config: NsInterfaceConfig,
    ) -> Result<Self, LockInitError> {
        let Some(lock) = os.mutex_create() else {
            ringbuf_entry!(Trace::LockCreateFailed);
            return Err(LockInitError::MutexCreate);
        };
        ringbuf_entry!(Trace::LockCreated);
        Ok(Self { os, lock, config })
    }

    pub fn config(&self) -> &NsInterfaceConfig {
        &self.config
    }

    /// Calls `veneer(arg0, arg1, arg2, arg3)` with the gate held and returns
    /// what it returned.
    ///
    /// # Safety
    ///
    /// `veneer` must be safe to call with these arguments. Pointers smuggled
    /// through the word arguments must be valid for whatever the secure side
    /// does with them.
    pub unsafe fn dispatch(
        &self,
        veneer: Veneer,
        arg0: u32,
        arg1: u32,
        arg2: u32,
        arg3: u32,
    ) -> Result<i32, DispatchError> {
        self.dispatch_with(|| unsafe { veneer(arg0, arg1, arg2, arg3) })
    }

    /// Runs `f` with the gate held. This is [`dispatch`](Self::dispatch) for
    /// callers that are not a bare veneer.
    pub fn dispatch_with<R, F>(&self, f: F) -> Result<R, DispatchError<R>>
    where
        F: FnOnce() -> R,
    {
        let guard = self.acquire().map_err(Refusal::into_error)?;
        self.finish(guard, f())
    }

    /// Like [`dispatch`](Self::dispatch), but gives up with
    /// `DispatchError::Cancelled` if `cancel` fires while waiting for the
    /// lock.
    ///
    /// The lock is polled in attempts of the configured poll interval
    /// ([`DEFAULT_POLL_INTERVAL_MS`] unless the gate polls with its own), and
    /// `cancel` is checked before each one. Under
    /// [`AcquireMode::Bounded`] the total wait is still capped.
    ///
    /// # Safety
    ///
    /// As for [`dispatch`](Self::dispatch).
    pub unsafe fn dispatch_cancellable(
        &self,
        cancel: &CancelToken,
        veneer: Veneer,
        arg0: u32,
        arg1: u32,
        arg2: u32,
        arg3: u32,
    ) -> Result<i32, DispatchError> {
        self.dispatch_cancellable_with(cancel, || unsafe {
            veneer(arg0, arg1, arg2, arg3)
        })
    }

    /// Closure form of [`dispatch_cancellable`](Self::dispatch_cancellable).
    pub fn dispatch_cancellable_with<R, F>(
        &self,
        cancel: &CancelToken,
        f: F,
    ) -> Result<R, DispatchError<R>>
    where
        F: FnOnce() -> R,
    {
        let guard = self
            .acquire_cancellable(cancel)
            .map_err(Refusal::into_error)?;
        self.finish(guard, f())
    }

    /// Tears the gate down and frees its mutex. Dropping a gate instead
    /// leaves the mutex allocated.
    pub fn delete(self) -> os_wrapper::OsResult {
        ringbuf_entry!(Trace::Deleted);
        self.os.mutex_delete(self.lock)
    }

    fn take(&self, timeout: Timeout) -> Option<LockGuard<'_, K>> {
        self.os.mutex_acquire(Some(&self.lock), timeout).ok()?;
        Some(LockGuard {
            os: self.os,
            lock: &self.lock,
            held: true,
        })
    }

    /// One bounded lock attempt of `ms`, stretched to at least a tick so that
    /// a short interval still sleeps rather than spins.
    fn attempt(&self, ms: u32) -> Timeout {
        Timeout::Millis(ms.max(self.os.kernel().tick_period_ms().max(1)))
    }

    fn acquire(&self) -> Result<LockGuard<'_, K>, Refusal> {
        match self.config.acquire {
            AcquireMode::Block => {
                // A kernel only refuses an unbounded take if the mutex is
                // gone.
                self.take(Timeout::Forever).ok_or_else(|| {
                    ringbuf_entry!(Trace::TimedOut);
                    Refusal::Timeout
                })
            }
            AcquireMode::Bounded { timeout_ms } => {
                self.take(Timeout::Millis(timeout_ms)).ok_or_else(|| {
                    ringbuf_entry!(Trace::TimedOut);
                    Refusal::Timeout
                })
            }
            AcquireMode::Poll { interval_ms } => loop {
                if let Some(guard) = self.take(self.attempt(interval_ms)) {
                    return Ok(guard);
                }
                ringbuf_entry!(Trace::AcquireRetry);
            },
        }
    }

    fn acquire_cancellable(
        &self,
        cancel: &CancelToken,
    ) -> Result<LockGuard<'_, K>, Refusal> {
        let (interval_ms, limit_ms) = match self.config.acquire {
            AcquireMode::Block => (DEFAULT_POLL_INTERVAL_MS, None),
            AcquireMode::Poll { interval_ms } => (interval_ms, None),
            AcquireMode::Bounded { timeout_ms } => {
                (DEFAULT_POLL_INTERVAL_MS, Some(timeout_ms))
            }
        };
        let period_ms = self.os.kernel().tick_period_ms().max(1);
        let start = self.os.get_tick();
        let waited_ms = || {
            self.os
                .get_tick()
                .wrapping_sub(start)
                .saturating_mul(period_ms)
        };

        loop {
            if cancel.is_cancelled() {
                ringbuf_entry!(Trace::Cancelled);
                return Err(Refusal::Cancelled);
            }

            let attempt_ms = match limit_ms {
                Some(limit) => {
                    interval_ms.min(limit.saturating_sub(waited_ms()))
                }
                None => interval_ms,
            };
            if let Some(guard) = self.take(self.attempt(attempt_ms)) {
                return Ok(guard);
            }

            if let Some(limit) = limit_ms {
                if waited_ms() >= limit {
                    ringbuf_entry!(Trace::TimedOut);
                    return Err(Refusal::Timeout);
                }
            }
            ringbuf_entry!(Trace::AcquireRetry);
        }
    }

    fn finish<R>(
        &self,
        guard: LockGuard<'_, K>,
        result: R,
    ) -> Result<R, DispatchError<R>> {
        if guard.release().is_ok() {
            return Ok(result);
        }
        ringbuf_entry!(Trace::ReleaseFailed);
        match self.config.release_failure {
            ReleaseFailure::Ignore => Ok(result),
            ReleaseFailure::Report => Err(DispatchError::ReleaseFailed { result }),
        }
    }
}
