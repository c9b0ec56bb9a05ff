// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered container with stable, generation-counted keys.
//!
//! [`SlotList`] is a doubly linked list whose nodes live in an arena. Each
//! entry is addressed by a [`SlotKey`] made of a slot index and the slot's
//! generation. Unlinking an entry bumps the generation of its slot, so a key
//! held past removal never resolves to whatever reuses the slot later: it
//! simply misses.
//!
//! Both the event bus subscription table and the connection registry are
//! built on this type.
//!
//! # Examples
//!
//! ```
//! use espnet::list::SlotList;
//!
//! let mut list = SlotList::new();
//! let a = list.push_back("a")?;
//! let c = list.push_back("c")?;
//! list.insert_after(a, "b")?;
//!
//! let items: Vec<_> = list.iter().map(|(_, v)| *v).collect();
//! assert_eq!(items, ["a", "b", "c"]);
//!
//! assert_eq!(list.unlink(c), Some("c"));
//! assert!(list.get(c).is_none());
//! # Ok::<(), espnet::Error>(())
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Stable handle to an entry of a [`SlotList`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    /// Returns the slot index.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Arena-backed doubly linked list with generation-counted keys.
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> SlotList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a value at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn push_back(&mut self, value: T) -> Result<SlotKey> {
        let index = self.allocate(value)?;
        self.link_between(index, self.tail, None);
        Ok(self.key_of(index))
    }

    /// Inserts a value directly after `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `anchor` is stale, or
    /// [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn insert_after(&mut self, anchor: SlotKey, value: T) -> Result<SlotKey> {
        let next = self.node(anchor).ok_or_else(stale_anchor)?.next;
        let index = self.allocate(value)?;
        self.link_between(index, Some(anchor.index), next);
        Ok(self.key_of(index))
    }

    /// Inserts a value directly before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `anchor` is stale, or
    /// [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn insert_before(&mut self, anchor: SlotKey, value: T) -> Result<SlotKey> {
        let prev = self.node(anchor).ok_or_else(stale_anchor)?.prev;
        let index = self.allocate(value)?;
        self.link_between(index, prev, Some(anchor.index));
        Ok(self.key_of(index))
    }

    /// Removes the entry for `key` and returns its value.
    ///
    /// Returns `None` if the key is stale.
    pub fn unlink(&mut self, key: SlotKey) -> Option<T> {
        self.node(key)?;
        let slot = &mut self.slots[key.index as usize];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        match node.prev {
            Some(prev) => self.node_at_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_at_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free.push(key.index);
        self.len -= 1;
        Some(node.value)
    }

    /// Returns a reference to the value for `key`.
    #[must_use]
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.node(key).map(|n| &n.value)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut().map(|n| &mut n.value)
    }

    /// Returns true if `key` refers to a live entry.
    #[must_use]
    pub fn contains(&self, key: SlotKey) -> bool {
        self.node(key).is_some()
    }

    /// Returns the key of the first entry, if any.
    #[must_use]
    pub fn first(&self) -> Option<SlotKey> {
        self.head.map(|index| self.key_of(index))
    }

    /// Returns the key following `key`, if any.
    #[must_use]
    pub fn next(&self, key: SlotKey) -> Option<SlotKey> {
        self.node(key)?.next.map(|index| self.key_of(index))
    }

    /// Returns the key of the first entry matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<SlotKey>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter()
            .find_map(|(key, value)| predicate(value).then_some(key))
    }

    /// Returns the keys of all entries, in list order.
    #[must_use]
    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Iterates entries in list order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Unlinks every entry matching `predicate` and returns the removed values
    /// in list order.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let doomed: Vec<SlotKey> = self
            .iter()
            .filter_map(|(key, value)| predicate(value).then_some(key))
            .collect();
        doomed.into_iter().filter_map(|key| self.unlink(key)).collect()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        while let Some(key) = self.first() {
            self.unlink(key);
        }
    }

    fn node(&self, key: SlotKey) -> Option<&Node<T>> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_at_mut(&mut self, index: u32) -> &mut Node<T> {
        match self.slots[index as usize].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked index {index} points at an empty slot"),
        }
    }

    fn key_of(&self, index: u32) -> SlotKey {
        SlotKey {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn allocate(&mut self, value: T) -> Result<u32> {
        let node = Node {
            value,
            prev: None,
            next: None,
        };

        if let Some(index) = self.free.pop() {
            self.slots[index as usize].node = Some(node);
            return Ok(index);
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| Error::OutOfMemory)?;
        self.slots.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        // Keep room for every slot on the free list so unlink never allocates.
        let wanted = (self.slots.len() + 1).saturating_sub(self.free.len());
        self.free.try_reserve(wanted).map_err(|_| Error::OutOfMemory)?;

        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Ok(index)
    }

    fn link_between(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        {
            let node = self.node_at_mut(index);
            node.prev = prev;
            node.next = next;
        }
        match prev {
            Some(p) => self.node_at_mut(p).next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.node_at_mut(n).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
    }
}

fn stale_anchor() -> Error {
    Error::InvalidArgument("anchor key is stale".to_string())
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over the entries of a [`SlotList`].
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SlotKey, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.list.slots[index as usize];
        let node = slot.node.as_ref()?;
        self.cursor = node.next;
        Some((
            SlotKey {
                index,
                generation: slot.generation,
            },
            &node.value,
        ))
    }
}
