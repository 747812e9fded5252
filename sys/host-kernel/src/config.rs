// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

/// Knobs for the hosted kernel. The pool limits are how tests simulate a
/// target kernel running out of memory.
///
/// Parsed from TOML, e.g.
///
/// ```toml
/// tick-period-ms = 10
/// max-mutexes = 1
/// dynamic-allocation = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct HostKernelConfig {
    /// Milliseconds per tick. Zero is read as one.
    pub tick_period_ms: u32,
    /// Threads the kernel will create; `None` is unbounded. Threads adopted
    /// through `current_task` do not count.
    pub max_threads: Option<usize>,
    pub max_semaphores: Option<usize>,
    pub max_mutexes: Option<usize>,
    /// Mirrors `configSUPPORT_DYNAMIC_ALLOCATION`. When false, mutex creation
    /// always fails.
    pub dynamic_allocation: bool,
}

impl Default for HostKernelConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 1,
            max_threads: None,
            max_semaphores: None,
            max_mutexes: None,
            dynamic_allocation: true,
        }
    }
}

impl HostKernelConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
