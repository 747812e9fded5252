// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

/// Live kernel objects of one kind, keyed by id.
///
/// Ids start at 1 and are never reused, so a stale handle finds nothing
/// rather than somebody else's object.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    next: u32,
    limit: Option<usize>,
    live: BTreeMap<u32, T>,
}

impl<T> Registry<T> {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            next: 1,
            limit,
            live: BTreeMap::new(),
        }
    }

    /// Stores `value` if the pool has room.
    pub(crate) fn insert(&mut self, value: T) -> Option<u32> {
        if let Some(limit) = self.limit {
            if self.live.len() >= limit {
                return None;
            }
        }
        Some(self.insert_unbounded(value))
    }

    /// Stores `value` regardless of the limit.
    pub(crate) fn insert_unbounded(&mut self, value: T) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        self.live.insert(id, value);
        id
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        self.live.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.live.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<T> {
        self.live.remove(&id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.live.values()
    }
}
