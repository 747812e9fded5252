// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_derive::FromPrimitive;

/// Why a gate could not be set up.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum LockInitError {
    /// The kernel would not allocate the gate's mutex.
    MutexCreate = 1,
}

impl From<LockInitError> for u32 {
    fn from(rc: LockInitError) -> Self {
        rc as u32
    }
}

/// Why a dispatched call did not produce a plain result.
///
/// `R` is the guarded function's return type; for veneer calls it is the
/// `i32` the secure side hands back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchError<R = i32> {
    /// The lock was not taken within the configured bound. The guarded
    /// function did not run.
    Timeout,
    /// The caller's cancel token fired before the lock was taken. The
    /// guarded function did not run.
    Cancelled,
    /// The guarded function ran and returned `result`, but giving the lock
    /// back failed. Only produced under `ReleaseFailure::Report`.
    ReleaseFailed { result: R },
}

impl<R> DispatchError<R> {
    pub const TIMEOUT: u32 = 1;
    pub const CANCELLED: u32 = 2;
    pub const RELEASE_FAILED: u32 = 3;

    /// Numeric code for reporting across a C boundary.
    pub fn code(&self) -> u32 {
        match self {
            Self::Timeout => Self::TIMEOUT,
            Self::Cancelled => Self::CANCELLED,
            Self::ReleaseFailed { .. } => Self::RELEASE_FAILED,
        }
    }

    /// Whether the guarded function was actually called.
    pub fn call_completed(&self) -> bool {
        matches!(self, Self::ReleaseFailed { .. })
    }
}

impl<R> From<DispatchError<R>> for u32 {
    fn from(e: DispatchError<R>) -> Self {
        e.code()
    }
}
