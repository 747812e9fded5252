// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::kernel::KernelStatus;
use num_derive::FromPrimitive;

/// Outcome code for success, as seen by C callers.
pub const OS_WRAPPER_SUCCESS: u32 = 0x0000_0000;
/// Outcome code for any failure, as seen by C callers.
pub const OS_WRAPPER_ERROR: u32 = 0xFFFF_FFFF;

/// The one thing that can go wrong. Timeouts, exhausted kernel pools and
/// kernel-side rejections are not told apart.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum OsWrapperError {
    Error = OS_WRAPPER_ERROR,
}

impl From<OsWrapperError> for u32 {
    fn from(rc: OsWrapperError) -> Self {
        rc as u32
    }
}

pub type OsResult<T = ()> = Result<T, OsWrapperError>;

/// Folds a native status into the wrapper's two outcomes.
pub(crate) fn check(status: KernelStatus) -> OsResult {
    if status.is_pass() {
        Ok(())
    } else {
        Err(OsWrapperError::Error)
    }
}

/// Encodes an outcome the way the C interface reports it.
pub fn outcome_code<T>(r: &OsResult<T>) -> u32 {
    match r {
        Ok(_) => OS_WRAPPER_SUCCESS,
        Err(e) => u32::from(*e),
    }
}
