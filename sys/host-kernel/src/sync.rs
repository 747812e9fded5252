// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Semaphore and mutex objects, built from std's mutex and condvar.
//!
//! A `None` wait blocks indefinitely; `Some(d)` gives up after `d`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::TaskId;

/// Locks `m`, carrying on through poisoning. A panicking holder cannot leave
/// these counters half-updated.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub(crate) struct HostSemaphore {
    count: Mutex<u32>,
    max: u32,
    available: Condvar,
}

impl HostSemaphore {
    pub(crate) fn new(max: u32, initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            max,
            available: Condvar::new(),
        }
    }

    pub(crate) fn take(&self, wait: Option<Duration>) -> bool {
        let guard = lock(&self.count);
        let mut count = match wait {
            None => self
                .available
                .wait_while(guard, |c| *c == 0)
                .unwrap_or_else(PoisonError::into_inner),
            Some(limit) => {
                self.available
                    .wait_timeout_while(guard, limit, |c| *c == 0)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub(crate) fn give(&self) -> bool {
        let mut count = lock(&self.count);
        if *count >= self.max {
            return false;
        }
        *count += 1;
        self.available.notify_one();
        true
    }

    pub(crate) fn count(&self) -> u32 {
        *lock(&self.count)
    }
}

/// A non-recursive mutex that remembers its owner, so that a give from any
/// other task is refused the way a target kernel refuses it.
#[derive(Debug, Default)]
pub(crate) struct HostMutex {
    owner: Mutex<Option<TaskId>>,
    released: Condvar,
}

impl HostMutex {
    pub(crate) fn take(&self, me: TaskId, wait: Option<Duration>) -> bool {
        let guard = lock(&self.owner);
        let mut owner = match wait {
            None => self
                .released
                .wait_while(guard, |o| o.is_some())
                .unwrap_or_else(PoisonError::into_inner),
            Some(limit) => {
                self.released
                    .wait_timeout_while(guard, limit, |o| o.is_some())
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        if owner.is_some() {
            return false;
        }
        *owner = Some(me);
        true
    }

    pub(crate) fn give(&self, me: TaskId) -> bool {
        let mut owner = lock(&self.owner);
        if *owner != Some(me) {
            return false;
        }
        *owner = None;
        self.released.notify_one();
        true
    }

    pub(crate) fn owner(&self) -> Option<TaskId> {
        *lock(&self.owner)
    }
}
