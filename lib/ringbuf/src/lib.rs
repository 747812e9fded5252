// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers for the OS wrapper and the non-secure dispatch gate
//!
//! A ring buffer is a fixed-size static record of the most recent events a
//! module cared to note. Nothing is formatted and nothing is allocated; the
//! buffer is read back out either with a debugger or, in tests, by locking it
//! and walking [`Ringbuf::iter`].
//!
//! Unlike a per-task buffer, these are written from whatever thread happens to
//! be calling into the wrapper, so each buffer sits behind a [`spin::Mutex`].
//! The critical section is a handful of stores, which keeps spinning cheap.
//!
//! ## Constraints
//!
//! The payload type must implement both `Copy` and `PartialEq`. Repeating the
//! most recent `(line, payload)` pair bumps that entry's `count` rather than
//! consuming a new slot, so a retry loop does not flush the history.
//!
//! ## Creating a ring buffer
//!
//! ```
//! ringbuf!(Trace, 16, Trace::None);
//! ringbuf_entry!(Trace::LockCreated);
//! ```
//!
//! or, with an explicit name when a module wants more than one:
//!
//! ```
//! ringbuf!(GATE_RINGBUF, Trace, 16, Trace::None);
//! ringbuf_entry!(GATE_RINGBUF, Trace::AcquireRetry);
//! ```

#![cfg_attr(not(test), no_std)]

/// Re-exported so that code generated by the macros can always find it.
pub use spin::Mutex;

/// Declares a ringbuffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ringbuffer named `NAME`,
/// containing entries of type `Type`, with room for `N` such entries, all of
/// which are initialized to `expr`.
///
/// The actual type of `NAME` will be `Mutex<Ringbuf<T, N>>`. If the name is
/// omitted it defaults to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::Mutex<$crate::Ringbuf<$t, $n>> =
            $crate::Mutex::new($crate::Ringbuf::new($init));
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Inserts data into a named ringbuffer (which should have been declared with
/// the `ringbuf!` macro).
///
/// `ringbuf_entry!(NAME, expr)` will insert `expr` into the ringbuffer called
/// `NAME`. Without a name, it defaults to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the lock, and keep the two
        // expressions from seeing each other's bindings.
        let (p, buf) = ($payload, &$buf);
        $crate::Ringbuf::entry(
            &mut *$crate::Mutex::lock(buf),
            line!() as u16,
            p,
        );
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// Inserts data into a ringbuffer at the root of this crate.
#[cfg(not(feature = "disabled"))]
#[allow(clippy::crate_in_macro_def)]
#[macro_export]
macro_rules! ringbuf_entry_root {
    ($buf:ident, $payload:expr) => {
        $crate::ringbuf_entry!(crate::$buf, $payload);
    };
    ($payload:expr) => {
        $crate::ringbuf_entry!(crate::__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry_root {
    ($buf:ident, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// A single [`Ringbuf`] slot.
///
/// `generation` counts how many times this slot has been overwritten, which is
/// what lets a reader tell a fresh entry from a stale one after wraparound.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size. Normally declared through
/// [`ringbuf!`] rather than by hand.
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    /// Creates an empty ring with every slot holding `init`.
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // `None` is treated as an out-of-range index: nothing to coalesce
        // with, and the wrap below lands the first entry in slot 0.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        // No remainder here: the targets this runs on mostly lack a hardware
        // divide, and the compare also maps usize::MAX + 1 onto slot 0.
        let ndx = {
            let next = last.wrapping_add(1);
            if next >= self.buffer.len() {
                0
            } else {
                next
            }
        };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };

        self.last = Some(ndx);
    }

    /// Returns the most recently written entry, if any.
    pub fn last_entry(&self) -> Option<&RingbufEntry<T>> {
        self.last.and_then(|ndx| self.buffer.get(ndx))
    }

    /// Walks the populated entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(last) => last.wrapping_add(1),
            None => self.buffer.len(),
        };
        let (newer, older) = self.buffer.split_at(start.min(self.buffer.len()));
        older
            .iter()
            .chain(newer.iter())
            // Every written slot has a count of at least one; generation
            // wraps, so it cannot tell.
            .filter(|ent| ent.count != 0)
    }

    /// Sums the counts of every retained entry whose payload matches.
    pub fn count_of(&self, payload: T) -> u32 {
        self.iter()
            .filter(|ent| ent.payload == payload)
            .fold(0u32, |acc, ent| acc.saturating_add(ent.count))
    }
}
