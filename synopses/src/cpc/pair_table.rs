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

//! Open-addressing set of `row_col` pairs.
//!
//! The probe starts at the high bits of the item, so with linear probing the slots end up
//! close to sorted. `u32::MAX` marks an empty slot; callers never insert it.

const EMPTY: u32 = u32::MAX;

const UPSIZE_NUMERATOR: usize = 3;
const UPSIZE_DENOMINATOR: usize = 4;
const DOWNSIZE_NUMERATOR: usize = 1;
const DOWNSIZE_DENOMINATOR: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PairTable {
    lg_size: u8,
    num_valid_bits: u8,
    num_items: u32,
    slots: Vec<u32>,
}

impl PairTable {
    pub fn new(lg_size: u8, num_valid_bits: u8) -> Self {
        assert!((2..=26).contains(&lg_size), "lg_size out of range: {lg_size}");
        Self {
            lg_size,
            num_valid_bits,
            num_items: 0,
            slots: vec![EMPTY; 1 << lg_size],
        }
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn lg_size(&self) -> u8 {
        self.lg_size
    }

    /// Non-empty slots in table order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().copied().filter(|&item| item != EMPTY)
    }

    /// All items, sorted ascending.
    pub fn sorted_items(&self) -> Vec<u32> {
        let mut items: Vec<u32> = self.iter().collect();
        items.sort_unstable();
        items
    }

    /// Inserts `item`, returning `false` if it was already present.
    pub fn maybe_insert(&mut self, item: u32) -> bool {
        debug_assert_ne!(item, EMPTY);
        let index = self.lookup(item);
        if self.slots[index] == item {
            return false;
        }
        debug_assert_eq!(self.slots[index], EMPTY);
        self.slots[index] = item;
        self.num_items += 1;
        while UPSIZE_DENOMINATOR * self.num_items as usize > UPSIZE_NUMERATOR * self.slots.len() {
            self.rebuild(self.lg_size + 1);
        }
        true
    }

    /// Removes `item`, returning `false` if it was absent.
    pub fn maybe_delete(&mut self, item: u32) -> bool {
        debug_assert_ne!(item, EMPTY);
        let index = self.lookup(item);
        if self.slots[index] == EMPTY {
            return false;
        }
        debug_assert_eq!(self.slots[index], item);
        self.slots[index] = EMPTY;
        self.num_items -= 1;

        // re-place the rest of the cluster so lookups do not stop at the new hole
        let mask = self.slots.len() - 1;
        let mut probe = (index + 1) & mask;
        while self.slots[probe] != EMPTY {
            let fetched = self.slots[probe];
            self.slots[probe] = EMPTY;
            self.must_insert(fetched);
            probe = (probe + 1) & mask;
        }

        while self.lg_size > 2
            && DOWNSIZE_DENOMINATOR * (self.num_items as usize)
                < DOWNSIZE_NUMERATOR * self.slots.len()
        {
            self.rebuild(self.lg_size - 1);
        }
        true
    }

    /// Inserts an item known to be absent, without growing the table.
    pub fn must_insert(&mut self, item: u32) {
        let index = self.lookup(item);
        assert_ne!(self.slots[index], item, "item {item} is already present");
        self.slots[index] = item;
    }

    /// Index of `item`, or of the empty slot where it would go.
    fn lookup(&self, item: u32) -> usize {
        let mask = self.slots.len() - 1;
        let shift = self.num_valid_bits.saturating_sub(self.lg_size);
        let mut probe = (item >> shift) as usize & mask;
        loop {
            let current = self.slots[probe];
            if current == item || current == EMPTY {
                return probe;
            }
            probe = (probe + 1) & mask;
        }
    }

    fn rebuild(&mut self, lg_size: u8) {
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; 1 << lg_size]);
        self.lg_size = lg_size;
        for item in old.into_iter().filter(|&item| item != EMPTY) {
            self.must_insert(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_grow() {
        let mut table = PairTable::new(2, 10);
        for item in [5u32, 900, 17, 5, 333] {
            table.maybe_insert(item);
        }
        assert_eq!(table.num_items(), 4);
        assert_eq!(table.lg_size(), 3);
        assert_eq!(table.sorted_items(), vec![5, 17, 333, 900]);
    }

    #[test]
    fn test_delete_keeps_cluster_reachable() {
        let mut table = PairTable::new(4, 10);
        // items sharing high bits collide into one cluster
        let items = [64u32, 65, 66, 67, 68];
        for item in items {
            assert!(table.maybe_insert(item));
        }
        assert!(table.maybe_delete(65));
        assert!(!table.maybe_delete(65));
        for item in [64u32, 66, 67, 68] {
            assert!(!table.maybe_insert(item), "{item} should still be found");
        }
        assert_eq!(table.num_items(), 4);
    }

    #[test]
    fn test_shrinks_after_deletes() {
        let mut table = PairTable::new(2, 12);
        for item in 0..100u32 {
            table.maybe_insert(item * 37);
        }
        let grown = table.lg_size();
        for item in 0..98u32 {
            assert!(table.maybe_delete(item * 37));
        }
        assert!(table.lg_size() < grown);
        assert_eq!(table.sorted_items(), vec![98 * 37, 99 * 37]);
    }
}
