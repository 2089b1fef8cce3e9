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

//! Byte layout of serialized HLL sketches.
//!
//! All three modes share an 8-byte header; the payload that follows depends on the mode.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::estimator::HipEstimator;

pub const SERIAL_VERSION: u8 = 1;

pub const LIST_PREINTS: u8 = 2;
pub const HASH_SET_PREINTS: u8 = 3;
pub const HLL_PREINTS: u8 = 10;

pub const EMPTY_FLAG_MASK: u8 = 4;
pub const COMPACT_FLAG_MASK: u8 = 8;
pub const OUT_OF_ORDER_FLAG_MASK: u8 = 16;
/// Set on sketches that skipped the coupon modes.
pub const FULL_SIZE_FLAG_MASK: u8 = 32;

/// Offset of the flags byte in the header.
pub const FLAGS_BYTE: usize = 5;

pub const CUR_MODE_LIST: u8 = 0;
pub const CUR_MODE_SET: u8 = 1;
pub const CUR_MODE_HLL: u8 = 2;

pub const LIST_INT_ARR_START: usize = 8;
pub const HASH_SET_INT_ARR_START: usize = 12;
pub const HLL_BYTE_ARR_START: usize = 40;

/// Fixed-size part of the HLL header.
pub struct Preamble {
    pub preamble_ints: u8,
    pub lg_config_k: u8,
    pub lg_arr: u8,
    pub flags: u8,
    /// LIST coupon count, or `cur_min` in HLL mode.
    pub byte6: u8,
    pub cur_mode: u8,
    pub hll_type: HllType,
}

impl Preamble {
    pub fn write(&self, bytes: &mut SketchBytes) {
        bytes.write_u8(self.preamble_ints);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(crate::codec::Family::HLL.id);
        bytes.write_u8(self.lg_config_k);
        bytes.write_u8(self.lg_arr);
        bytes.write_u8(self.flags);
        bytes.write_u8(self.byte6);
        bytes.write_u8(encode_mode_byte(self.cur_mode, self.hll_type));
    }
}

/// The HLL-mode fields following the common header, up to the register array.
pub struct HllArrayPreamble {
    pub hip_accum: f64,
    pub kxq0: f64,
    pub kxq1: f64,
    /// Registers at `cur_min` for HLL_4, zero registers otherwise.
    pub num_at_cur_min: u32,
    pub aux_count: u32,
}

impl HllArrayPreamble {
    pub fn new(estimator: &HipEstimator, num_at_cur_min: u32, aux_count: u32) -> Self {
        Self {
            hip_accum: estimator.hip_accum(),
            kxq0: estimator.kxq0(),
            kxq1: estimator.kxq1(),
            num_at_cur_min,
            aux_count,
        }
    }

    pub fn write(&self, bytes: &mut SketchBytes) {
        bytes.write_f64_le(self.hip_accum);
        bytes.write_f64_le(self.kxq0);
        bytes.write_f64_le(self.kxq1);
        bytes.write_u32_le(self.num_at_cur_min);
        bytes.write_u32_le(self.aux_count);
    }

    pub fn read(slice: &mut SketchSlice<'_>) -> Result<Self, Error> {
        let hip_accum = slice
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("hip_accum"))?;
        let kxq0 = slice
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("kxq0"))?;
        let kxq1 = slice
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("kxq1"))?;
        let num_at_cur_min = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("num_at_cur_min"))?;
        let aux_count = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("aux_count"))?;
        Ok(Self {
            hip_accum,
            kxq0,
            kxq1,
            num_at_cur_min,
            aux_count,
        })
    }

    /// Restore the estimator, keeping the serialized sums bit for bit.
    pub fn estimator(&self, lg_config_k: u8, out_of_order: bool) -> HipEstimator {
        let mut estimator = HipEstimator::new(lg_config_k);
        estimator.set_hip_accum(self.hip_accum);
        estimator.set_kxq(self.kxq0, self.kxq1);
        estimator.set_out_of_order(out_of_order);
        estimator
    }
}

/// Low 2 bits hold the current mode, bits 2-3 the target type.
pub fn encode_mode_byte(cur_mode: u8, hll_type: HllType) -> u8 {
    (cur_mode & 0x3) | ((hll_type as u8) << 2)
}

pub fn extract_cur_mode(mode_byte: u8) -> u8 {
    mode_byte & 0x3
}

pub fn extract_tgt_hll_type(mode_byte: u8) -> Option<HllType> {
    match (mode_byte >> 2) & 0x3 {
        0 => Some(HllType::Hll4),
        1 => Some(HllType::Hll6),
        2 => Some(HllType::Hll8),
        _ => None,
    }
}

pub fn flags(empty: bool, compact: bool, out_of_order: bool) -> u8 {
    let mut flags = 0;
    if empty {
        flags |= EMPTY_FLAG_MASK;
    }
    if compact {
        flags |= COMPACT_FLAG_MASK;
    }
    if out_of_order {
        flags |= OUT_OF_ORDER_FLAG_MASK;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_byte() {
        let byte = encode_mode_byte(CUR_MODE_HLL, HllType::Hll6);
        assert_eq!(extract_cur_mode(byte), CUR_MODE_HLL);
        assert_eq!(extract_tgt_hll_type(byte), Some(HllType::Hll6));
        assert_eq!(extract_tgt_hll_type(0x0C), None);
    }
}
