// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::kernel::Wait;

/// Raw timeout value meaning "no time bound", as used on the C side of the
/// wrapper.
pub const WAIT_FOREVER: u32 = 0xFFFF_FFFF;

/// Upper bound on how long an acquire call may block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    Millis(u32),
    Forever,
}

impl Timeout {
    /// Returns immediately if the object is unavailable.
    pub const NONE: Self = Self::Millis(0);

    /// Converts to kernel ticks, rounding down.
    ///
    /// A finite timeout never maps onto the tick value a kernel may reserve as
    /// its own "forever" marker.
    pub fn to_wait(self, tick_period_ms: u32) -> Wait {
        match self {
            Self::Forever => Wait::Forever,
            Self::Millis(ms) => {
                let ticks = ms / tick_period_ms.max(1);
                Wait::Ticks(ticks.min(WAIT_FOREVER - 1))
            }
        }
    }
}

impl From<u32> for Timeout {
    fn from(raw: u32) -> Self {
        if raw == WAIT_FOREVER {
            Self::Forever
        } else {
            Self::Millis(raw)
        }
    }
}

impl From<Timeout> for u32 {
    fn from(t: Timeout) -> Self {
        match t {
            Timeout::Forever => WAIT_FOREVER,
            Timeout::Millis(ms) => ms.min(WAIT_FOREVER - 1),
        }
    }
}
