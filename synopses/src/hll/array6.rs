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

//! HLL_6: registers packed at 6 bits each.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::estimator::HipEstimator;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::serialization::*;

const VAL_MASK_6: u16 = 0x3F;

/// Bytes needed for `2^lg_config_k` 6-bit registers, plus one so a 16-bit read window
/// never runs past the end.
pub fn num_bytes_for_k(lg_config_k: u8) -> usize {
    ((1usize << lg_config_k) * 3 / 4) + 1
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array6 {
    lg_config_k: u8,
    bytes: Box<[u8]>,
    num_zeros: u32,
    estimator: HipEstimator,
}

impl Array6 {
    pub fn new(lg_config_k: u8) -> Self {
        Self {
            lg_config_k,
            bytes: vec![0u8; num_bytes_for_k(lg_config_k)].into_boxed_slice(),
            num_zeros: 1 << lg_config_k,
            estimator: HipEstimator::new(lg_config_k),
        }
    }

    pub fn from_registers(lg_config_k: u8, registers: &[u8], estimator: HipEstimator) -> Self {
        let mut result = Self::new(lg_config_k);
        for (slot, &value) in registers.iter().enumerate() {
            result.put_raw(slot as u32, value);
        }
        result.num_zeros = registers.iter().filter(|&&v| v == 0).count() as u32;
        result.estimator = estimator;
        result
    }

    #[inline]
    pub fn get(&self, slot: u32) -> u8 {
        let start_bit = slot * 6;
        let byte_idx = (start_bit >> 3) as usize;
        let shift = start_bit & 7;
        let window = u16::from_le_bytes([self.bytes[byte_idx], self.bytes[byte_idx + 1]]);
        ((window >> shift) & VAL_MASK_6) as u8
    }

    #[inline]
    fn put_raw(&mut self, slot: u32, value: u8) {
        let start_bit = slot * 6;
        let byte_idx = (start_bit >> 3) as usize;
        let shift = start_bit & 7;
        let mut window = u16::from_le_bytes([self.bytes[byte_idx], self.bytes[byte_idx + 1]]);
        window &= !(VAL_MASK_6 << shift);
        window |= ((value as u16) & VAL_MASK_6) << shift;
        let [lo, hi] = window.to_le_bytes();
        self.bytes[byte_idx] = lo;
        self.bytes[byte_idx + 1] = hi;
    }

    pub fn registers(&self) -> impl Iterator<Item = u8> + '_ {
        (0..1u32 << self.lg_config_k).map(|slot| self.get(slot))
    }

    pub fn estimator(&self) -> &HipEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut HipEstimator {
        &mut self.estimator
    }

    pub fn update(&mut self, coupon: u32) {
        let mask = (1 << self.lg_config_k) - 1;
        let slot = get_slot(coupon) & mask;
        let new_value = get_value(coupon);
        let old_value = self.get(slot);

        if new_value > old_value {
            self.estimator
                .update(self.lg_config_k, old_value, new_value);
            if old_value == 0 {
                self.num_zeros -= 1;
            }
            self.put_raw(slot, new_value);
        }
    }

    pub fn estimate(&self) -> f64 {
        self.estimator.estimate(self.lg_config_k, self.registers())
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.estimator
            .upper_bound(self.lg_config_k, self.estimate(), num_std_dev)
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let num_non_zero = (1u32 << self.lg_config_k) - self.num_zeros;
        self.estimator
            .lower_bound(self.lg_config_k, self.estimate(), num_non_zero, num_std_dev)
    }

    pub fn is_empty(&self) -> bool {
        self.num_zeros == 1 << self.lg_config_k
    }

    pub fn serialized_size(&self) -> usize {
        HLL_BYTE_ARR_START + self.bytes.len()
    }

    pub fn serialize(&self, compact: bool) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(self.serialized_size());
        Preamble {
            preamble_ints: HLL_PREINTS,
            lg_config_k: self.lg_config_k,
            lg_arr: 0,
            flags: flags(
                self.is_empty(),
                compact,
                self.estimator.is_out_of_order(),
            ),
            byte6: 0,
            cur_mode: CUR_MODE_HLL,
            hll_type: HllType::Hll6,
        }
        .write(&mut bytes);
        HllArrayPreamble::new(&self.estimator, self.num_zeros, 0).write(&mut bytes);
        bytes.write(&self.bytes);
        bytes.into_bytes()
    }

    pub fn deserialize(
        slice: &mut SketchSlice<'_>,
        lg_config_k: u8,
        ooo: bool,
    ) -> Result<Self, Error> {
        let preamble = HllArrayPreamble::read(slice)?;
        if preamble.aux_count != 0 {
            return Err(Error::deserial("HLL_6 sketch cannot carry aux entries"));
        }

        let mut data = vec![0u8; num_bytes_for_k(lg_config_k)];
        slice
            .read_exact(&mut data)
            .map_err(|_| Error::insufficient_data("hll6_registers"))?;

        let mut result = Self::new(lg_config_k);
        result.bytes = data.into_boxed_slice();
        result.num_zeros = result.registers().filter(|&v| v == 0).count() as u32;
        result.estimator = preamble.estimator(lg_config_k, ooo);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::coupon;
    use crate::hll::pack_coupon;

    #[test]
    fn test_num_bytes() {
        assert_eq!(num_bytes_for_k(4), 13);
        assert_eq!(num_bytes_for_k(10), 769);
    }

    #[test]
    fn test_packing_does_not_clobber_neighbors() {
        let mut arr = Array6::new(4);
        for slot in 0..16u32 {
            arr.update(pack_coupon(slot, (slot as u8 * 4 + 1).min(63)));
        }
        for slot in 0..16u32 {
            assert_eq!(arr.get(slot), (slot as u8 * 4 + 1).min(63));
        }
        assert!(!arr.is_empty());
        assert_eq!(arr.num_zeros, 0);
    }

    #[test]
    fn test_from_registers_matches_updates() {
        let mut arr = Array6::new(7);
        for i in 0..2000 {
            arr.update(coupon(9001, i));
        }
        let registers: Vec<u8> = arr.registers().collect();
        let copy = Array6::from_registers(7, &registers, arr.estimator().clone());
        assert_eq!(copy, arr);
    }
}
