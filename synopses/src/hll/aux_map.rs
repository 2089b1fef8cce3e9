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

//! Exception table for HLL_4 registers that do not fit their nibble.
//!
//! Open addressing keyed by register slot. Entries are stored as coupons (slot in the low
//! 26 bits, absolute register value above) so an empty entry is zero.

use crate::hll::RESIZE_DENOMINATOR;
use crate::hll::RESIZE_NUMERATOR;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::pack_coupon;

const ENTRY_EMPTY: u32 = 0;

/// Initial log2 table size by lg_config_k.
const LG_AUX_ARR_INTS: [u8; 22] = [
    0, 2, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 11, 12, 13,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxMap {
    lg_config_k: u8,
    lg_size: u8,
    entries: Box<[u32]>,
    count: u32,
}

impl AuxMap {
    pub fn new(lg_config_k: u8) -> Self {
        Self::with_lg_size(lg_config_k, Self::initial_lg_size(lg_config_k))
    }

    pub fn initial_lg_size(lg_config_k: u8) -> u8 {
        LG_AUX_ARR_INTS[lg_config_k as usize]
    }

    pub fn with_lg_size(lg_config_k: u8, lg_size: u8) -> Self {
        Self {
            lg_config_k,
            lg_size,
            entries: vec![ENTRY_EMPTY; 1 << lg_size].into_boxed_slice(),
            count: 0,
        }
    }

    /// Restore a table from its raw entries.
    ///
    /// Returns `None` if an entry is out of range or would not be found where it sits.
    pub fn from_entries(lg_config_k: u8, lg_size: u8, entries: Box<[u32]>) -> Option<Self> {
        if entries.len() != 1 << lg_size {
            return None;
        }
        let count = entries.iter().filter(|&&e| e != ENTRY_EMPTY).count() as u32;
        if RESIZE_DENOMINATOR * count as usize > RESIZE_NUMERATOR * entries.len() {
            return None;
        }
        let map = Self {
            lg_config_k,
            lg_size,
            entries,
            count,
        };
        for (index, &entry) in map.entries.iter().enumerate() {
            if entry == ENTRY_EMPTY {
                continue;
            }
            let slot = get_slot(entry);
            if slot >= 1 << lg_config_k || map.find(slot) != Ok(index) {
                return None;
            }
        }
        Some(map)
    }

    /// Largest table this map can grow to for its lg_config_k.
    pub fn max_lg_size(lg_config_k: u8) -> u8 {
        lg_config_k + 1
    }

    pub fn lg_size(&self) -> u8 {
        self.lg_size
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    /// Raw entries, including empty ones.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn get(&self, slot: u32) -> Option<u8> {
        match self.find(slot) {
            Ok(index) => Some(get_value(self.entries[index])),
            Err(_) => None,
        }
    }

    /// Insert a slot that must not be present yet.
    pub fn insert(&mut self, slot: u32, value: u8) {
        match self.find(slot) {
            Ok(_) => debug_assert!(false, "slot {slot} already in aux map"),
            Err(index) => {
                self.entries[index] = pack_coupon(slot, value);
                self.count += 1;
                self.check_grow();
            }
        }
    }

    /// Replace the value of a slot that must already be present.
    pub fn replace(&mut self, slot: u32, value: u8) {
        match self.find(slot) {
            Ok(index) => self.entries[index] = pack_coupon(slot, value),
            Err(_) => debug_assert!(false, "slot {slot} not in aux map"),
        }
    }

    /// `(slot, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.entries
            .iter()
            .filter(|&&e| e != ENTRY_EMPTY)
            .map(|&e| (get_slot(e), get_value(e)))
    }

    /// `Ok(index)` of the slot, or `Err(index)` of the empty entry where it belongs.
    fn find(&self, slot: u32) -> Result<usize, usize> {
        let mask = (1u32 << self.lg_size) - 1;
        let config_k_mask = (1u32 << self.lg_config_k) - 1;
        let slot = slot & config_k_mask;
        let stride = (slot >> self.lg_size) | 1;
        let mut probe = slot & mask;
        loop {
            let entry = self.entries[probe as usize];
            if entry == ENTRY_EMPTY {
                return Err(probe as usize);
            }
            if get_slot(entry) == slot {
                return Ok(probe as usize);
            }
            probe = (probe + stride) & mask;
        }
    }

    fn check_grow(&mut self) {
        let size = self.entries.len();
        if RESIZE_DENOMINATOR * self.count as usize > RESIZE_NUMERATOR * size {
            let old = std::mem::replace(
                &mut self.entries,
                vec![ENTRY_EMPTY; size << 1].into_boxed_slice(),
            );
            self.lg_size += 1;
            for entry in old.iter().copied().filter(|&e| e != ENTRY_EMPTY) {
                if let Err(index) = self.find(get_slot(entry)) {
                    self.entries[index] = entry;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_replace() {
        let mut aux = AuxMap::new(10);
        assert_eq!(aux.lg_size(), 4);
        aux.insert(7, 20);
        aux.insert(1000, 18);
        assert_eq!(aux.get(7), Some(20));
        assert_eq!(aux.get(1000), Some(18));
        assert_eq!(aux.get(8), None);

        aux.replace(7, 25);
        assert_eq!(aux.get(7), Some(25));
        assert_eq!(aux.len(), 2);
    }

    #[test]
    fn test_grows_at_three_quarters() {
        let mut aux = AuxMap::new(4);
        assert_eq!(aux.lg_size(), 2);
        for slot in 0..4 {
            aux.insert(slot, 16);
        }
        assert_eq!(aux.lg_size(), 3);
        for slot in 4..12 {
            aux.insert(slot, 17);
        }
        assert_eq!(aux.lg_size(), 4);
        assert_eq!(aux.len(), 12);
        for slot in 0..12 {
            assert!(aux.get(slot).is_some());
        }
    }
}
