// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Open-addressing map from item to `(estimate, offset)` with an ordered minimum index.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;

use crate::hash::MurmurHash3X64128;

const LOAD_FACTOR_NUMERATOR: usize = 3;
const LOAD_FACTOR_DENOMINATOR: usize = 4;
const DRIFT_LIMIT: usize = 1024;

/// Smallest table length, in log2.
pub(super) const LG_MIN_MAP_SIZE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Entry<T> {
    pub item: T,
    pub estimate: u64,
    pub offset: u64,
    rank: u64,
}

#[derive(Debug, Clone)]
pub(super) struct SpaceSavingMap<T> {
    lg_length: u8,
    lg_max_length: u8,
    /// Arena index of the entry hashed to each slot.
    slots: Vec<Option<usize>>,
    /// Probe distance plus one for occupied slots, zero for free ones.
    states: Vec<u16>,
    entries: Vec<Option<Entry<T>>>,
    free: Vec<usize>,
    by_estimate: BTreeMap<(u64, u64), usize>,
    next_rank: u64,
    num_active: usize,
}

impl<T: Eq + Hash> SpaceSavingMap<T> {
    /// A map starting at `2^lg_length` slots that may grow to `2^lg_max_length`.
    pub fn new(lg_length: u8, lg_max_length: u8) -> Self {
        assert!(LG_MIN_MAP_SIZE <= lg_length && lg_length <= lg_max_length);
        let length = 1usize << lg_length;
        Self {
            lg_length,
            lg_max_length,
            slots: vec![None; length],
            states: vec![0; length],
            entries: Vec::new(),
            free: Vec::new(),
            by_estimate: BTreeMap::new(),
            next_rank: 0,
            num_active: 0,
        }
    }

    pub fn lg_length(&self) -> u8 {
        self.lg_length
    }

    pub fn len(&self) -> usize {
        self.num_active
    }

    pub fn is_empty(&self) -> bool {
        self.num_active == 0
    }

    pub fn get(&self, item: &T) -> Option<&Entry<T>> {
        self.find_slot(item).and_then(|slot| self.entry_at(slot))
    }

    /// Adds `weight` to the estimate and `offset` to the offset of a tracked item.
    ///
    /// Returns false, leaving the map untouched, if the item is not tracked.
    pub fn adjust(&mut self, item: &T, weight: u64, offset: u64) -> bool {
        let Some(index) = self.find_slot(item).and_then(|slot| self.slots[slot]) else {
            return false;
        };
        self.adjust_at(index, weight, offset);
        true
    }

    /// Inserts an untracked item, growing the table when it passes its load factor.
    pub fn insert(&mut self, item: T, estimate: u64, offset: u64) {
        debug_assert!(self.find_slot(&item).is_none());
        if self.num_active + 1 > self.load_threshold() && self.lg_length < self.lg_max_length {
            self.resize(self.lg_length + 1);
        }
        assert!(self.num_active < self.slots.len(), "space saving table is full");

        let rank = self.next_rank;
        self.next_rank += 1;
        let entry = Entry {
            item,
            estimate,
            offset,
            rank,
        };
        let probe = self.hash_probe(&entry.item);
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.place(index, probe);
        self.by_estimate.insert((estimate, rank), index);
        self.num_active += 1;
    }

    /// Smallest estimate among tracked items.
    pub fn min_estimate(&self) -> Option<u64> {
        self.by_estimate.keys().next().map(|&(estimate, _)| estimate)
    }

    /// Removes every entry whose estimate equals the current minimum.
    ///
    /// Returns the minimum estimate together with the removed entries.
    pub fn evict_min(&mut self) -> Option<(u64, Vec<Entry<T>>)> {
        let min = self.min_estimate()?;
        let mut evicted = Vec::new();
        while let Some(entry) = self.by_estimate.first_entry() {
            if entry.key().0 != min {
                break;
            }
            let index = entry.remove();
            if let Some(removed) = self.remove_at(index) {
                evicted.push(removed);
            }
        }
        Some((min, evicted))
    }

    /// Iterates over entries in ascending `(estimate, insertion rank)` order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Entry<T>> + '_ {
        self.by_estimate
            .values()
            .filter_map(|&index| self.entries[index].as_ref())
    }

    /// Drains all entries in ascending `(estimate, insertion rank)` order.
    pub fn into_ordered(mut self) -> Vec<Entry<T>> {
        let order: Vec<usize> = self.by_estimate.values().copied().collect();
        order
            .into_iter()
            .filter_map(|index| self.entries[index].take())
            .collect()
    }

    fn load_threshold(&self) -> usize {
        self.slots.len() * LOAD_FACTOR_NUMERATOR / LOAD_FACTOR_DENOMINATOR
    }

    fn entry_at(&self, slot: usize) -> Option<&Entry<T>> {
        self.slots[slot].and_then(|index| self.entries[index].as_ref())
    }

    fn adjust_at(&mut self, index: usize, weight: u64, offset: u64) {
        let Some(entry) = self.entries[index].as_mut() else {
            return;
        };
        self.by_estimate.remove(&(entry.estimate, entry.rank));
        entry.estimate = entry.estimate.saturating_add(weight);
        entry.offset = entry.offset.saturating_add(offset);
        self.by_estimate.insert((entry.estimate, entry.rank), index);
    }

    fn find_slot(&self, item: &T) -> Option<usize> {
        let probe = self.hash_probe(item);
        (self.states[probe] > 0).then_some(probe)
    }

    /// First slot that is either free or holds `item`.
    fn hash_probe(&self, item: &T) -> usize {
        let mask = self.slots.len() - 1;
        let mut probe = (hash_item(item) as usize) & mask;
        while self.states[probe] > 0 {
            if self.entry_at(probe).is_some_and(|entry| &entry.item == item) {
                break;
            }
            probe = (probe + 1) & mask;
        }
        probe
    }

    /// Writes `index` into the free slot `probe`, recording its drift from the home slot.
    fn place(&mut self, index: usize, probe: usize) {
        let mask = self.slots.len() - 1;
        let home = self.entries[index]
            .as_ref()
            .map_or(probe, |entry| (hash_item(&entry.item) as usize) & mask);
        let drift = ((probe + self.slots.len() - home) & mask) + 1;
        debug_assert!(drift < DRIFT_LIMIT, "drift limit exceeded");
        self.slots[probe] = Some(index);
        self.states[probe] = drift as u16;
    }

    fn remove_at(&mut self, index: usize) -> Option<Entry<T>> {
        let entry = self.entries[index].take()?;
        let mask = self.slots.len() - 1;
        let mut probe = (hash_item(&entry.item) as usize) & mask;
        while self.slots[probe] != Some(index) {
            probe = (probe + 1) & mask;
        }
        self.hash_delete(probe);
        self.free.push(index);
        self.num_active -= 1;
        Some(entry)
    }

    /// Clears `delete_probe` and pulls later members of the cluster back into the gap.
    fn hash_delete(&mut self, mut delete_probe: usize) {
        self.states[delete_probe] = 0;
        self.slots[delete_probe] = None;
        let mut drift: usize = 1;
        let mask = self.slots.len() - 1;
        let mut probe = (delete_probe + drift) & mask;
        while self.states[probe] != 0 {
            if self.states[probe] as usize > drift {
                self.slots[delete_probe] = self.slots[probe].take();
                self.states[delete_probe] = self.states[probe] - drift as u16;
                self.states[probe] = 0;
                drift = 0;
                delete_probe = probe;
            }
            probe = (probe + 1) & mask;
            drift += 1;
            debug_assert!(drift < DRIFT_LIMIT, "drift limit exceeded");
        }
    }

    fn resize(&mut self, new_lg_length: u8) {
        let length = 1usize << new_lg_length;
        self.lg_length = new_lg_length;
        self.slots = vec![None; length];
        self.states = vec![0; length];
        for index in 0..self.entries.len() {
            if let Some(entry) = &self.entries[index] {
                let probe = self.hash_probe(&entry.item);
                self.place(index, probe);
            }
        }
    }
}

#[inline]
fn hash_item<T: Hash>(item: &T) -> u64 {
    let mut hasher = MurmurHash3X64128::default();
    item.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_adjust_and_grow() {
        let mut map = SpaceSavingMap::new(3, 6);
        for i in 0..40u64 {
            map.insert(i, i + 1, 0);
        }
        assert_eq!(map.len(), 40);
        assert_eq!(map.lg_length(), 6);
        for i in 0..40u64 {
            assert_eq!(map.get(&i).map(|e| e.estimate), Some(i + 1));
        }
        assert!(map.adjust(&7, 100, 3));
        assert!(!map.adjust(&1000, 1, 0));
        let entry = map.get(&7).unwrap();
        assert_eq!((entry.estimate, entry.offset), (108, 3));
    }

    #[test]
    fn test_evict_min_removes_all_ties() {
        let mut map = SpaceSavingMap::new(3, 4);
        map.insert("a", 5, 0);
        map.insert("b", 2, 0);
        map.insert("c", 2, 1);
        map.insert("d", 9, 0);

        let (min, evicted) = map.evict_min().unwrap();
        assert_eq!(min, 2);
        let names: Vec<_> = evicted.iter().map(|e| e.item).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(map.len(), 2);
        assert!(map.get(&"b").is_none());
        assert!(map.get(&"a").is_some());
        assert_eq!(map.min_estimate(), Some(5));

        // freed arena slots are reused
        map.insert("e", 1, 0);
        assert_eq!(map.get(&"e").map(|e| e.estimate), Some(1));
    }

    #[test]
    fn test_ordered_iteration_breaks_ties_by_rank() {
        let mut map = SpaceSavingMap::new(3, 3);
        map.insert(30, 4, 0);
        map.insert(10, 4, 0);
        map.insert(20, 1, 0);
        let order: Vec<_> = map.iter_ordered().map(|e| e.item).collect();
        assert_eq!(order, vec![20, 30, 10]);
    }

    #[test]
    fn test_delete_keeps_clusters_reachable() {
        let mut map = SpaceSavingMap::new(4, 4);
        for i in 0..12i64 {
            map.insert(i, (i % 3) as u64 + 1, 0);
        }
        let (_, evicted) = map.evict_min().unwrap();
        assert_eq!(evicted.len(), 4);
        for i in 0..12i64 {
            assert_eq!(map.get(&i).is_some(), i % 3 != 0, "item {i}");
        }
    }
}
