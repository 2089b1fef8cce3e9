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

//! HLL_8: one byte per register.
//!
//! This is the register layout the union accumulates into, so it also carries the
//! merge and downsampling helpers.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::estimator::HipEstimator;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::serialization::*;

/// Core Array8 data structure - one byte per slot, no packing
#[derive(Debug, Clone, PartialEq)]
pub struct Array8 {
    lg_config_k: u8,
    /// Direct byte array: bytes[slot] = value
    bytes: Box<[u8]>,
    /// Count of slots with value 0
    num_zeros: u32,
    estimator: HipEstimator,
}

impl Array8 {
    pub fn new(lg_config_k: u8) -> Self {
        let k = 1u32 << lg_config_k;
        Self {
            lg_config_k,
            bytes: vec![0u8; k as usize].into_boxed_slice(),
            num_zeros: k,
            estimator: HipEstimator::new(lg_config_k),
        }
    }

    /// Build from explicit register values; `registers.len()` must be `2^lg_config_k`.
    pub fn from_registers(lg_config_k: u8, registers: &[u8], estimator: HipEstimator) -> Self {
        debug_assert_eq!(registers.len(), 1 << lg_config_k);
        let num_zeros = registers.iter().filter(|&&v| v == 0).count() as u32;
        Self {
            lg_config_k,
            bytes: registers.into(),
            num_zeros,
            estimator,
        }
    }

    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    #[inline]
    pub fn get(&self, slot: u32) -> u8 {
        self.bytes[slot as usize]
    }

    pub fn registers(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes.iter().copied()
    }

    pub fn estimator(&self) -> &HipEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut HipEstimator {
        &mut self.estimator
    }

    pub fn update(&mut self, coupon: u32) {
        let mask = (1 << self.lg_config_k) - 1;
        let slot = (get_slot(coupon) & mask) as usize;
        let new_value = get_value(coupon);
        let old_value = self.bytes[slot];

        if new_value > old_value {
            self.estimator
                .update(self.lg_config_k, old_value, new_value);
            if old_value == 0 {
                self.num_zeros -= 1;
            }
            self.bytes[slot] = new_value;
        }
    }

    /// Fold registers of a sketch with `src_lg_k >= lg_config_k` into this array, keeping
    /// the maximum per register. Source slot `s` lands on `s & (k - 1)`.
    ///
    /// Returns whether any register changed. A change leaves the array out of order.
    pub fn merge_registers(&mut self, src_lg_k: u8, src: &[u8]) -> bool {
        debug_assert!(src_lg_k >= self.lg_config_k);
        debug_assert_eq!(src.len(), 1 << src_lg_k);

        let mask = (1usize << self.lg_config_k) - 1;
        let mut changed = false;
        for (slot, &value) in src.iter().enumerate() {
            let dst = &mut self.bytes[slot & mask];
            if value > *dst {
                *dst = value;
                changed = true;
            }
        }

        if changed {
            self.num_zeros = self.bytes.iter().filter(|&&v| v == 0).count() as u32;
            self.estimator = HipEstimator::from_registers(
                self.registers(),
                self.estimator.hip_accum(),
                true,
            );
        }
        changed
    }

    /// A copy of this array reduced to `lg_config_k` registers.
    pub fn downsample(&self, lg_config_k: u8) -> Array8 {
        let mut result = Array8::new(lg_config_k);
        result.merge_registers(self.lg_config_k, &self.bytes);
        result.estimator.set_out_of_order(true);
        result
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
            hll_type: HllType::Hll8,
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
            return Err(Error::deserial("HLL_8 sketch cannot carry aux entries"));
        }

        let mut registers = vec![0u8; 1 << lg_config_k];
        slice
            .read_exact(&mut registers)
            .map_err(|_| Error::insufficient_data("hll8_registers"))?;
        if let Some(bad) = registers.iter().find(|&&v| v > 63) {
            return Err(Error::deserial(format!("HLL_8 register out of range: {bad}")));
        }

        let estimator = preamble.estimator(lg_config_k, ooo);
        Ok(Self::from_registers(lg_config_k, &registers, estimator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::coupon;
    use crate::hll::pack_coupon;

    #[test]
    fn test_update_tracks_zeros() {
        let mut arr = Array8::new(4);
        assert!(arr.is_empty());
        arr.update(pack_coupon(3, 5));
        arr.update(pack_coupon(3 + 16, 2));
        assert_eq!(arr.get(3), 5);
        assert_eq!(arr.num_zeros, 15);
        assert!(!arr.is_empty());
    }

    #[test]
    fn test_estimate_accuracy() {
        let mut arr = Array8::new(12);
        let n = 10_000;
        for i in 0..n {
            arr.update(coupon(9001, i));
        }
        let est = arr.estimate();
        assert!((est - n as f64).abs() / (n as f64) < 0.05, "{est}");
        assert!(arr.lower_bound(NumStdDev::Two) <= est);
        assert!(arr.upper_bound(NumStdDev::Two) >= est);
    }

    #[test]
    fn test_merge_registers_folds_and_flags() {
        let mut src = Array8::new(6);
        for i in 0..500 {
            src.update(coupon(9001, i));
        }
        let src_regs: Vec<u8> = src.registers().collect();

        let mut dst = Array8::new(5);
        assert!(dst.merge_registers(6, &src_regs));
        assert!(dst.estimator().is_out_of_order());
        for slot in 0..32u32 {
            let expected = src.get(slot).max(src.get(slot + 32));
            assert_eq!(dst.get(slot), expected);
        }

        // a second identical merge changes nothing
        let before = dst.clone();
        assert!(!dst.merge_registers(6, &src_regs));
        assert_eq!(dst, before);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut arr = Array8::new(8);
        for i in 0..3000 {
            arr.update(coupon(9001, i));
        }
        let bytes = arr.serialize(true);
        assert_eq!(bytes.len(), HLL_BYTE_ARR_START + 256);
        let mut slice = SketchSlice::new(&bytes[8..]);
        let restored = Array8::deserialize(&mut slice, 8, false).unwrap();
        assert_eq!(restored, arr);
        assert_eq!(restored.serialize(true), bytes);
    }
}
