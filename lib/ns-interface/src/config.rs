// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

/// Attempt length used by [`AcquireMode::Poll`] when none is given, and by
/// cancellable dispatch when the gate is not polling.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 100;

fn default_poll_interval() -> u32 {
    DEFAULT_POLL_INTERVAL_MS
}

/// How a dispatch waits for the gate's lock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum AcquireMode {
    /// One acquire with no time bound.
    #[default]
    Block,
    /// Repeated acquires of `interval_ms` each, retried until one succeeds.
    /// Nothing is reported for the failed attempts beyond a trace entry.
    Poll {
        #[serde(default = "default_poll_interval")]
        interval_ms: u32,
    },
    /// One acquire of `timeout_ms`; the dispatch fails with
    /// `DispatchError::Timeout` if it does not succeed.
    Bounded { timeout_ms: u32 },
}

impl AcquireMode {
    /// Polling exactly as the C interface layer does it.
    pub const REFERENCE: Self = Self::Poll {
        interval_ms: DEFAULT_POLL_INTERVAL_MS,
    };
}

/// What a dispatch does when the lock cannot be given back.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseFailure {
    /// Trace it and return the callee's value as if nothing happened.
    #[default]
    Ignore,
    /// Return `DispatchError::ReleaseFailed` carrying the callee's value.
    Report,
}

/// Gate settings, e.g.
///
/// ```toml
/// release-failure = "report"
///
/// [acquire]
/// poll = { interval-ms = 100 }
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct NsInterfaceConfig {
    pub acquire: AcquireMode,
    pub release_failure: ReleaseFailure,
}

impl NsInterfaceConfig {
    /// Polling acquire, ignored release failures.
    pub const REFERENCE: Self = Self {
        acquire: AcquireMode::REFERENCE,
        release_failure: ReleaseFailure::Ignore,
    };
}
