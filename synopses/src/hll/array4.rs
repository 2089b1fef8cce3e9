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

//! HLL_4: registers packed at 4 bits each, relative to a shared `cur_min`.
//!
//! A nibble of [`AUX_TOKEN`] means the true value lives in the [`AuxMap`]. When the last
//! register at `cur_min` rises, every nibble is shifted down by one and `cur_min` moves up.

use log::trace;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::aux_map::AuxMap;
use crate::hll::estimator::HipEstimator;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::pack_coupon;
use crate::hll::serialization::*;

const AUX_TOKEN: u8 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct Array4 {
    lg_config_k: u8,
    /// Even slots use the low nibble, odd slots the high nibble.
    bytes: Box<[u8]>,
    cur_min: u8,
    num_at_cur_min: u32,
    aux_map: Option<AuxMap>,
    estimator: HipEstimator,
}

impl Array4 {
    pub fn new(lg_config_k: u8) -> Self {
        Self {
            lg_config_k,
            bytes: vec![0u8; 1 << (lg_config_k - 1)].into_boxed_slice(),
            cur_min: 0,
            num_at_cur_min: 1 << lg_config_k,
            aux_map: None,
            estimator: HipEstimator::new(lg_config_k),
        }
    }

    pub fn from_registers(lg_config_k: u8, registers: &[u8], estimator: HipEstimator) -> Self {
        let mut result = Self::new(lg_config_k);
        let cur_min = registers.iter().copied().min().unwrap_or(0);
        result.cur_min = cur_min;
        result.num_at_cur_min = 0;
        for (slot, &value) in registers.iter().enumerate() {
            let slot = slot as u32;
            let shifted = value - cur_min;
            if shifted == 0 {
                result.num_at_cur_min += 1;
            }
            if shifted >= AUX_TOKEN {
                result.put_raw(slot, AUX_TOKEN);
                result
                    .aux_map
                    .get_or_insert_with(|| AuxMap::new(lg_config_k))
                    .insert(slot, value);
            } else {
                result.put_raw(slot, shifted);
            }
        }
        result.estimator = estimator;
        result
    }

    #[inline]
    fn get_raw(&self, slot: u32) -> u8 {
        let byte = self.bytes[(slot >> 1) as usize];
        if slot & 1 == 0 { byte & 15 } else { byte >> 4 }
    }

    #[inline]
    fn put_raw(&mut self, slot: u32, value: u8) {
        debug_assert!(value <= AUX_TOKEN);
        let byte_idx = (slot >> 1) as usize;
        let old_byte = self.bytes[byte_idx];
        self.bytes[byte_idx] = if slot & 1 == 0 {
            (old_byte & 0xF0) | (value & 0x0F)
        } else {
            (old_byte & 0x0F) | (value << 4)
        };
    }

    /// The true register value at `slot`.
    pub fn get(&self, slot: u32) -> u8 {
        let raw = self.get_raw(slot);
        if raw < AUX_TOKEN {
            self.cur_min + raw
        } else {
            self.aux_value(slot)
        }
    }

    fn aux_value(&self, slot: u32) -> u8 {
        match self.aux_map.as_ref().and_then(|aux| aux.get(slot)) {
            Some(value) => value,
            None => unreachable!("slot {slot} holds AUX_TOKEN but has no aux entry"),
        }
    }

    pub fn registers(&self) -> impl Iterator<Item = u8> + '_ {
        (0..1u32 << self.lg_config_k).map(|slot| self.get(slot))
    }

    pub fn cur_min(&self) -> u8 {
        self.cur_min
    }

    pub fn num_at_cur_min(&self) -> u32 {
        self.num_at_cur_min
    }

    pub fn aux_map(&self) -> Option<&AuxMap> {
        self.aux_map.as_ref()
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

        if new_value <= self.cur_min {
            return;
        }

        let raw_stored = self.get_raw(slot);
        let old_value = if raw_stored < AUX_TOKEN {
            raw_stored + self.cur_min
        } else {
            self.aux_value(slot)
        };
        if new_value <= old_value {
            return;
        }

        self.estimator
            .update(self.lg_config_k, old_value, new_value);

        let shifted_new = new_value - self.cur_min;
        if raw_stored == AUX_TOKEN {
            // an exception only ever grows while cur_min is fixed
            if let Some(aux) = self.aux_map.as_mut() {
                aux.replace(slot, new_value);
            }
        } else if shifted_new >= AUX_TOKEN {
            self.put_raw(slot, AUX_TOKEN);
            let lg_config_k = self.lg_config_k;
            self.aux_map
                .get_or_insert_with(|| AuxMap::new(lg_config_k))
                .insert(slot, new_value);
        } else {
            self.put_raw(slot, shifted_new);
        }

        if old_value == self.cur_min {
            self.num_at_cur_min -= 1;
            while self.num_at_cur_min == 0 {
                self.shift_to_bigger_cur_min();
            }
        }
    }

    /// Increment cur_min, decrementing every nibble and pulling exceptions that fit back
    /// into the array.
    fn shift_to_bigger_cur_min(&mut self) {
        let new_cur_min = self.cur_min + 1;
        let mut num_at_new = 0;

        for slot in 0..1u32 << self.lg_config_k {
            let raw = self.get_raw(slot);
            debug_assert_ne!(raw, 0, "no register may sit below the new cur_min");
            if raw < AUX_TOKEN {
                let decremented = raw - 1;
                self.put_raw(slot, decremented);
                if decremented == 0 {
                    num_at_new += 1;
                }
            }
        }

        if let Some(old_aux) = self.aux_map.take() {
            let mut new_aux = None;
            for (slot, value) in old_aux.iter() {
                let shifted = value - new_cur_min;
                if shifted < AUX_TOKEN {
                    self.put_raw(slot, shifted);
                } else {
                    new_aux
                        .get_or_insert_with(|| AuxMap::new(self.lg_config_k))
                        .insert(slot, value);
                }
            }
            self.aux_map = new_aux;
        }

        trace!(
            "HLL_4 cur_min {} -> {new_cur_min}, {num_at_new} registers at new minimum",
            self.cur_min
        );
        self.cur_min = new_cur_min;
        self.num_at_cur_min = num_at_new;
    }

    pub fn estimate(&self) -> f64 {
        self.estimator.estimate(self.lg_config_k, self.registers())
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.estimator
            .upper_bound(self.lg_config_k, self.estimate(), num_std_dev)
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let k = 1u32 << self.lg_config_k;
        let num_non_zero = if self.cur_min == 0 {
            k - self.num_at_cur_min
        } else {
            k
        };
        self.estimator
            .lower_bound(self.lg_config_k, self.estimate(), num_non_zero, num_std_dev)
    }

    pub fn is_empty(&self) -> bool {
        self.cur_min == 0 && self.num_at_cur_min == 1 << self.lg_config_k
    }

    pub fn serialized_size(&self, compact: bool) -> usize {
        let aux_ints = match &self.aux_map {
            None => 0,
            Some(aux) if compact => aux.len() as usize,
            Some(aux) => aux.entries().len(),
        };
        HLL_BYTE_ARR_START + self.bytes.len() + aux_ints * 4
    }

    pub fn serialize(&self, compact: bool) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(self.serialized_size(compact));
        let (lg_arr, aux_count) = match &self.aux_map {
            Some(aux) => (aux.lg_size(), aux.len()),
            None => (0, 0),
        };
        Preamble {
            preamble_ints: HLL_PREINTS,
            lg_config_k: self.lg_config_k,
            lg_arr,
            flags: flags(
                self.is_empty(),
                compact,
                self.estimator.is_out_of_order(),
            ),
            byte6: self.cur_min,
            cur_mode: CUR_MODE_HLL,
            hll_type: HllType::Hll4,
        }
        .write(&mut bytes);
        HllArrayPreamble::new(&self.estimator, self.num_at_cur_min, aux_count).write(&mut bytes);
        bytes.write(&self.bytes);

        if let Some(aux) = &self.aux_map {
            if compact {
                let mut coupons: Vec<u32> = aux
                    .iter()
                    .map(|(slot, value)| pack_coupon(slot, value))
                    .collect();
                coupons.sort_unstable();
                for coupon in coupons {
                    bytes.write_u32_le(coupon);
                }
            } else {
                for &entry in aux.entries() {
                    bytes.write_u32_le(entry);
                }
            }
        }
        bytes.into_bytes()
    }

    pub fn deserialize(
        slice: &mut SketchSlice<'_>,
        lg_config_k: u8,
        cur_min: u8,
        lg_arr: u8,
        compact: bool,
        ooo: bool,
    ) -> Result<Self, Error> {
        let preamble = HllArrayPreamble::read(slice)?;
        let aux_count = preamble.aux_count;
        if cur_min > 63 {
            return Err(Error::deserial(format!("HLL_4 cur_min out of range: {cur_min}")));
        }

        let mut result = Self::new(lg_config_k);
        slice
            .read_exact(&mut result.bytes)
            .map_err(|_| Error::insufficient_data("hll4_registers"))?;
        result.cur_min = cur_min;

        if aux_count > 0 {
            if lg_arr == 0 || lg_arr > AuxMap::max_lg_size(lg_config_k) {
                return Err(Error::deserial(format!("invalid aux table lg size: {lg_arr}")));
            }
            let aux = if compact {
                if 4 * aux_count as usize > 3 * (1usize << lg_arr) {
                    return Err(Error::deserial(format!(
                        "{aux_count} aux entries overload a table of lg size {lg_arr}"
                    )));
                }
                let mut aux = AuxMap::with_lg_size(lg_config_k, lg_arr);
                for _ in 0..aux_count {
                    let coupon = slice
                        .read_u32_le()
                        .map_err(|_| Error::insufficient_data("aux_coupons"))?;
                    let slot = get_slot(coupon);
                    if slot >= 1 << lg_config_k || aux.get(slot).is_some() {
                        return Err(Error::deserial(format!("invalid aux coupon: {coupon:#x}")));
                    }
                    aux.insert(slot, get_value(coupon));
                }
                aux
            } else {
                let mut entries = vec![0u32; 1 << lg_arr];
                for entry in entries.iter_mut() {
                    *entry = slice
                        .read_u32_le()
                        .map_err(|_| Error::insufficient_data("aux_entries"))?;
                }
                AuxMap::from_entries(lg_config_k, lg_arr, entries.into_boxed_slice())
                    .ok_or_else(|| Error::deserial("corrupt aux table"))?
            };
            if aux.len() != aux_count {
                return Err(Error::deserial(format!(
                    "aux count mismatch: header says {aux_count}, found {}",
                    aux.len()
                )));
            }
            result.aux_map = Some(aux);
        }

        // every AUX_TOKEN nibble needs an exception that does not fit a nibble
        let mut num_tokens = 0;
        let mut num_at_cur_min = 0;
        for slot in 0..1u32 << lg_config_k {
            match result.get_raw(slot) {
                0 => num_at_cur_min += 1,
                AUX_TOKEN => {
                    num_tokens += 1;
                    let value = result.aux_map.as_ref().and_then(|aux| aux.get(slot));
                    match value {
                        Some(v) if v >= cur_min + AUX_TOKEN && v <= 63 => {}
                        _ => {
                            return Err(Error::deserial(format!(
                                "HLL_4 slot {slot} has no valid aux entry"
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        if num_tokens != aux_count {
            return Err(Error::deserial(format!(
                "HLL_4 has {num_tokens} exception nibbles but {aux_count} aux entries"
            )));
        }

        result.num_at_cur_min = num_at_cur_min;
        result.estimator = preamble.estimator(lg_config_k, ooo);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::array8::Array8;
    use crate::hll::coupon;

    #[test]
    fn test_matches_hll8_registers() {
        let mut arr4 = Array4::new(6);
        let mut arr8 = Array8::new(6);
        for i in 0..20_000 {
            let c = coupon(9001, i);
            arr4.update(c);
            arr8.update(c);
        }
        assert!(arr4.cur_min() > 0);
        assert!(arr4.registers().eq(arr8.registers()));
        assert_eq!(arr4.estimate(), arr8.estimate());
    }

    #[test]
    fn test_exception_goes_to_aux_map() {
        let mut arr = Array4::new(4);
        arr.update(pack_coupon(5, 20));
        assert_eq!(arr.get(5), 20);
        assert_eq!(arr.get_raw(5), AUX_TOKEN);
        assert_eq!(arr.aux_map().map(|aux| aux.len()), Some(1));

        arr.update(pack_coupon(5, 30));
        assert_eq!(arr.get(5), 30);
    }

    #[test]
    fn test_from_registers() {
        let mut registers = vec![3u8; 16];
        registers[2] = 25;
        registers[9] = 7;
        let arr = Array4::from_registers(4, &registers, HipEstimator::new(4));
        assert_eq!(arr.cur_min(), 3);
        assert_eq!(arr.num_at_cur_min(), 14);
        assert!(arr.registers().eq(registers.iter().copied()));
        assert_eq!(arr.aux_map().map(|aux| aux.len()), Some(1));
    }

    #[test]
    fn test_serialize_round_trip_with_aux() {
        let mut arr = Array4::new(5);
        for i in 0..5_000 {
            arr.update(coupon(9001, i));
        }
        arr.update(pack_coupon(1, 60));
        arr.update(pack_coupon(2, 59));

        for compact in [true, false] {
            let bytes = arr.serialize(compact);
            assert_eq!(bytes.len(), arr.serialized_size(compact));
            let mut slice = SketchSlice::new(&bytes[8..]);
            let restored =
                Array4::deserialize(&mut slice, 5, bytes[6], bytes[4], compact, false).unwrap();
            assert!(restored.registers().eq(arr.registers()));
            assert_eq!(restored.serialize(compact), bytes);
        }
    }
}
