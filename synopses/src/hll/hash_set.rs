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

//! SET mode: an open-addressing hash set of coupons.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::KEY_MASK_26;
use crate::hll::RESIZE_DENOMINATOR;
use crate::hll::RESIZE_NUMERATOR;
use crate::hll::container::COUPON_EMPTY;
use crate::hll::container::Container;
use crate::hll::serialization::*;

pub const LG_INIT_SET_SIZE: u8 = 5;

/// Hash set for efficient coupon storage with collision handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSet {
    container: Container,
}

impl Default for HashSet {
    fn default() -> Self {
        Self::new(LG_INIT_SET_SIZE)
    }
}

impl HashSet {
    pub fn new(lg_size: u8) -> Self {
        Self {
            container: Container::new(lg_size),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Insert coupon into hash set, ignoring duplicates
    pub fn update(&mut self, coupon: u32) {
        let lg_size = self.container.lg_size();
        let mask = (1u32 << lg_size) - 1;
        // always odd, so every slot is visited
        let stride = ((coupon & KEY_MASK_26) >> lg_size) | 1;
        let mut probe = coupon & mask;
        let starting_position = probe;

        loop {
            let value = self.container.slots()[probe as usize];
            if value == COUPON_EMPTY {
                self.container.slots_mut()[probe as usize] = coupon;
                self.container.increment_len();
                return;
            } else if value == coupon {
                return;
            }
            probe = (probe + stride) & mask;
            assert_ne!(probe, starting_position, "HashSet full; no empty slots");
        }
    }

    /// Whether the load factor has crossed 3/4.
    pub fn needs_resize(&self) -> bool {
        RESIZE_DENOMINATOR * self.container.len() > RESIZE_NUMERATOR * self.container.capacity()
    }

    /// Rehash every coupon into a table of `2^lg_size` slots.
    pub fn grow(&mut self, lg_size: u8) {
        debug_assert!(lg_size > self.container.lg_size());

        let mut new_set = HashSet::new(lg_size);
        for coupon in self.container.iter() {
            new_set.update(coupon)
        }
        self.container = new_set.container;
    }

    pub fn serialized_size(&self, compact: bool) -> usize {
        let n = if compact {
            self.container.len()
        } else {
            self.container.capacity()
        };
        HASH_SET_INT_ARR_START + n * 4
    }

    pub fn serialize(&self, lg_config_k: u8, hll_type: HllType, compact: bool) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(self.serialized_size(compact));
        Preamble {
            preamble_ints: HASH_SET_PREINTS,
            lg_config_k,
            lg_arr: self.container.lg_size(),
            flags: flags(self.container.is_empty(), compact, false),
            byte6: 0,
            cur_mode: CUR_MODE_SET,
            hll_type,
        }
        .write(&mut bytes);
        bytes.write_u32_le(self.container.len() as u32);

        if compact {
            let mut coupons: Vec<u32> = self.container.iter().collect();
            coupons.sort_unstable();
            for coupon in coupons {
                bytes.write_u32_le(coupon);
            }
        } else {
            for &coupon in self.container.slots() {
                bytes.write_u32_le(coupon);
            }
        }
        bytes.into_bytes()
    }

    pub fn deserialize(
        slice: &mut SketchSlice<'_>,
        lg_config_k: u8,
        lg_arr: u8,
        compact: bool,
    ) -> Result<Self, Error> {
        let max_lg_arr = lg_config_k.saturating_sub(3);
        if lg_arr < LG_INIT_SET_SIZE || lg_arr > max_lg_arr {
            return Err(Error::deserial(format!(
                "SET lg_arr must be in [{LG_INIT_SET_SIZE}, {max_lg_arr}], got {lg_arr}"
            )));
        }
        let count = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("set_count"))? as usize;
        let capacity = 1usize << lg_arr;
        if RESIZE_DENOMINATOR * count > RESIZE_NUMERATOR * capacity {
            return Err(Error::deserial(format!(
                "SET coupon count {count} overloads a table of {capacity} slots"
            )));
        }

        let set = if compact {
            let mut set = HashSet::new(lg_arr);
            for _ in 0..count {
                let coupon = slice
                    .read_u32_le()
                    .map_err(|_| Error::insufficient_data("set_coupons"))?;
                if coupon == COUPON_EMPTY {
                    return Err(Error::deserial("empty coupon in compact SET"));
                }
                set.update(coupon);
            }
            set
        } else {
            let mut coupons = vec![COUPON_EMPTY; capacity].into_boxed_slice();
            for coupon in coupons.iter_mut() {
                *coupon = slice
                    .read_u32_le()
                    .map_err(|_| Error::insufficient_data("set_coupons"))?;
            }
            HashSet {
                container: Container::from_raw(lg_arr, coupons),
            }
        };

        if set.container.len() != count {
            return Err(Error::deserial(format!(
                "SET coupon count mismatch: header says {count}, found {}",
                set.container.len()
            )));
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::pack_coupon;

    #[test]
    fn test_grow_keeps_coupons() {
        let mut set = HashSet::default();
        for slot in 0..24 {
            set.update(pack_coupon(slot * 977, 4));
        }
        assert_eq!(set.container().len(), 24);
        assert!(!set.needs_resize());
        set.update(pack_coupon(24 * 977, 4));
        assert!(set.needs_resize());

        set.grow(6);
        assert_eq!(set.container().lg_size(), 6);
        assert_eq!(set.container().len(), 25);
        set.update(pack_coupon(0, 4));
        assert_eq!(set.container().len(), 25);
    }

    #[test]
    fn test_compact_bytes_are_sorted() {
        let mut set = HashSet::default();
        for slot in [40, 3, 17, 9] {
            set.update(pack_coupon(slot, 1));
        }
        let bytes = set.serialize(12, HllType::Hll8, true);
        let coupons: Vec<u32> = bytes[HASH_SET_INT_ARR_START..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let mut sorted = coupons.clone();
        sorted.sort_unstable();
        assert_eq!(coupons, sorted);

        let mut slice = SketchSlice::new(&bytes[LIST_INT_ARR_START..]);
        let restored = HashSet::deserialize(&mut slice, 12, 5, true).unwrap();
        assert_eq!(restored.container().len(), 4);
        assert_eq!(restored.serialize(12, HllType::Hll8, true), bytes);
    }
}
