// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::sync::atomic::{AtomicBool, Ordering};

/// A flag another thread can raise to abandon a pending cancellable dispatch.
///
/// Cancellation is only observed while waiting for the lock. Once the guarded
/// call has started it runs to completion.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arms the token for another dispatch.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
