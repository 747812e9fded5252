// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed wrappers around native kernel handles.
//!
//! One type per kind of object, so a semaphore handle cannot be handed to a
//! mutex operation. Semaphore and mutex handles are deliberately neither
//! `Copy` nor `Clone`: their `delete` operations take them by value.

/// A kernel thread. Threads are never deleted through a handle, so this one
/// is freely copyable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThreadHandle<T>(T);

impl<T: Copy> ThreadHandle<T> {
    pub(crate) fn new(native: T) -> Self {
        Self(native)
    }

    /// The kernel's own handle value.
    pub fn native(&self) -> T {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SemaphoreHandle<S>(S);

impl<S> SemaphoreHandle<S> {
    pub(crate) fn new(native: S) -> Self {
        Self(native)
    }

    pub(crate) fn native(&self) -> &S {
        &self.0
    }

    pub(crate) fn into_native(self) -> S {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MutexHandle<M>(M);

impl<M> MutexHandle<M> {
    pub(crate) fn new(native: M) -> Self {
        Self(native)
    }

    pub(crate) fn native(&self) -> &M {
        &self.0
    }

    pub(crate) fn into_native(self) -> M {
        self.0
    }
}
