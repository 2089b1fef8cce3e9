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

//! HyperLogLog sketch front end: updates, mode promotion, estimation and serialization.

use std::fmt;
use std::hash::Hash;

use log::debug;

use crate::codec::Family;
use crate::codec::SketchSlice;
use crate::codec::ensure_preamble_longs_in;
use crate::codec::ensure_serial_version_is;
use crate::common::Datum;
use crate::common::NumStdDev;
use crate::common::canonical_double;
use crate::common::ensure_one_dimensional;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hll::HllMode;
use crate::hll::HllType;
use crate::hll::array4::Array4;
use crate::hll::array6::Array6;
use crate::hll::array6::num_bytes_for_k;
use crate::hll::array8::Array8;
use crate::hll::aux_map::AuxMap;
use crate::hll::check_lg_k;
use crate::hll::container::Container;
use crate::hll::coupon;
use crate::hll::estimator;
use crate::hll::get_slot;
use crate::hll::get_value;
use crate::hll::hash_set::HashSet;
use crate::hll::list::List;
use crate::hll::mode::Mode;
use crate::hll::serialization::*;

/// A HyperLogLog sketch.
///
/// See the [hll module level documentation](crate::hll) for more.
#[derive(Debug, Clone, PartialEq)]
pub struct HllSketch {
    lg_config_k: u8,
    seed: u64,
    /// Skip the coupon modes: start, and reset, directly in HLL mode.
    start_full_size: bool,
    mode: Mode,
}

impl HllSketch {
    /// Create a new empty HLL sketch with the default seed.
    ///
    /// # Arguments
    ///
    /// * `lg_config_k` - Log2 of the number of buckets (K). Must be in `[4, 21]`.
    /// * `hll_type` - Target HLL array type once the sketch leaves coupon mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) if `lg_config_k` is
    /// out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use synopses::hll::{HllSketch, HllType};
    /// let sketch = HllSketch::new(10, HllType::Hll8).unwrap();
    /// assert_eq!(sketch.lg_config_k(), 10);
    /// assert!(HllSketch::new(22, HllType::Hll8).is_err());
    /// ```
    pub fn new(lg_config_k: u8, hll_type: HllType) -> Result<Self, Error> {
        Self::with_seed(lg_config_k, hll_type, DEFAULT_UPDATE_SEED)
    }

    /// Create a new empty HLL sketch hashing with `seed`.
    ///
    /// Only sketches sharing a seed can be combined by [`HllUnion`](crate::hll::HllUnion).
    pub fn with_seed(lg_config_k: u8, hll_type: HllType, seed: u64) -> Result<Self, Error> {
        check_lg_k(lg_config_k)?;
        Ok(Self::from_parts(lg_config_k, seed, false, hll_type))
    }

    /// Create a new empty HLL sketch, optionally starting at its maximum size.
    ///
    /// With `start_max_size` the sketch allocates its full register array up front and never
    /// passes through LIST or SET mode, which saves the promotions when the stream is known
    /// to be large. [`reset`](Self::reset) returns such a sketch to an empty register array.
    ///
    /// # Examples
    ///
    /// ```
    /// # use synopses::hll::{HllMode, HllSketch, HllType};
    /// let mut sketch = HllSketch::with_start_max_size(10, HllType::Hll6, true).unwrap();
    /// assert_eq!(sketch.current_mode(), HllMode::Hll);
    /// assert!(sketch.is_empty());
    /// sketch.update(1);
    /// assert_eq!(sketch.current_mode(), HllMode::Hll);
    /// ```
    pub fn with_start_max_size(
        lg_config_k: u8,
        hll_type: HllType,
        start_max_size: bool,
    ) -> Result<Self, Error> {
        check_lg_k(lg_config_k)?;
        Ok(Self::from_parts(
            lg_config_k,
            DEFAULT_UPDATE_SEED,
            start_max_size,
            hll_type,
        ))
    }

    fn from_parts(lg_config_k: u8, seed: u64, start_full_size: bool, hll_type: HllType) -> Self {
        Self {
            lg_config_k,
            seed,
            start_full_size,
            mode: initial_mode(lg_config_k, hll_type, start_full_size),
        }
    }

    pub(super) fn from_mode(lg_config_k: u8, seed: u64, mode: Mode) -> Self {
        Self {
            lg_config_k,
            seed,
            start_full_size: false,
            mode,
        }
    }

    pub(super) fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    pub fn target_type(&self) -> HllType {
        self.mode.target_type()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn current_mode(&self) -> HllMode {
        self.mode.current_mode()
    }

    pub fn is_empty(&self) -> bool {
        self.mode.is_empty()
    }

    /// Whether the sketch was built to start in HLL mode.
    pub fn is_start_max_size(&self) -> bool {
        self.start_full_size
    }

    /// In-memory sketches are always updatable.
    pub fn is_compact(&self) -> bool {
        false
    }

    /// Whether the registers were combined out of stream order, so the HIP accumulator no
    /// longer applies. Coupon modes are never out of order.
    pub fn is_out_of_order(&self) -> bool {
        self.mode
            .estimator()
            .is_some_and(|estimator| estimator.is_out_of_order())
    }

    /// Update the sketch with a hashable value.
    ///
    /// Integers hash as their 8-byte little-endian form whatever their width, so
    /// `update(7u8)` and `update(7i64)` count the same item.
    pub fn update<T: Hash>(&mut self, value: T) {
        let coupon = coupon(self.seed, value);
        self.update_with_coupon(coupon);
    }

    /// Update with a double; `-0.0` and `0.0` are the same item, as are all NaNs.
    pub fn update_f64(&mut self, value: f64) {
        self.update(canonical_double(value));
    }

    /// Update with a float, widened to a double first.
    pub fn update_f32(&mut self, value: f32) {
        self.update_f64(value as f64);
    }

    /// Update with a dynamically typed value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`](crate::error::ErrorKind::InvalidInput) for a nested
    /// [`Datum::Seq`].
    pub fn update_datum(&mut self, datum: &Datum) -> Result<(), Error> {
        if let Datum::Seq(_) = datum {
            return Err(Error::invalid_input(
                "a sequence is not a single item; use update_batch",
            ));
        }
        self.update(datum);
        Ok(())
    }

    /// Update with every value of a flat batch.
    ///
    /// The batch is checked before any value is applied, so a rejected batch leaves the
    /// sketch untouched.
    pub fn update_batch(&mut self, data: &[Datum]) -> Result<(), Error> {
        ensure_one_dimensional(data)?;
        for datum in data {
            self.update(datum);
        }
        Ok(())
    }

    pub(super) fn update_with_coupon(&mut self, coupon: u32) {
        let lg_config_k = self.lg_config_k;
        match &mut self.mode {
            Mode::List { list, hll_type } => {
                list.update(coupon);
                if list.container().is_full() {
                    self.mode = if lg_config_k < 8 {
                        promote_to_array(list.container(), *hll_type, lg_config_k)
                    } else {
                        debug!("HLL sketch promoted from LIST to SET mode");
                        let mut set = HashSet::default();
                        for c in list.container().iter() {
                            set.update(c);
                        }
                        Mode::Set {
                            set,
                            hll_type: *hll_type,
                        }
                    };
                }
            }
            Mode::Set { set, hll_type } => {
                set.update(coupon);
                if set.needs_resize() {
                    let lg_size = set.container().lg_size();
                    if lg_size == lg_config_k - 3 {
                        self.mode = promote_to_array(set.container(), *hll_type, lg_config_k);
                    } else {
                        set.grow(lg_size + 1);
                    }
                }
            }
            Mode::Array4(arr) => arr.update(coupon),
            Mode::Array6(arr) => arr.update(coupon),
            Mode::Array8(arr) => arr.update(coupon),
        }
    }

    /// Current cardinality estimate.
    pub fn get_estimate(&self) -> f64 {
        self.mode.estimate()
    }

    /// Upper bound of the estimate at `num_std_dev` standard deviations.
    pub fn get_upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.mode.upper_bound(num_std_dev)
    }

    /// Lower bound of the estimate at `num_std_dev` standard deviations.
    pub fn get_lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.mode.lower_bound(num_std_dev)
    }

    /// Relative error of an HLL-mode estimate.
    ///
    /// `unioned` selects the out-of-order error (a union result) over the HIP error. The
    /// value is positive for lower bounds and negative for upper bounds.
    pub fn get_rel_err(
        upper_bound: bool,
        unioned: bool,
        lg_config_k: u8,
        num_std_dev: NumStdDev,
    ) -> f64 {
        estimator::get_rel_err(upper_bound, unioned, lg_config_k, num_std_dev)
    }

    /// Return to the empty state, keeping lg_k, target type, seed and starting size.
    pub fn reset(&mut self) {
        self.mode = initial_mode(self.lg_config_k, self.target_type(), self.start_full_size);
    }

    /// Serialize to the compact form.
    pub fn serialize(&self) -> Vec<u8> {
        self.mark_start_full_size(self.mode.serialize(self.lg_config_k, true))
    }

    /// Serialize with full hash tables and aux table, as kept in memory.
    pub fn serialize_updatable(&self) -> Vec<u8> {
        self.mark_start_full_size(self.mode.serialize(self.lg_config_k, false))
    }

    fn mark_start_full_size(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        if self.start_full_size {
            bytes[FLAGS_BYTE] |= FULL_SIZE_FLAG_MASK;
        }
        bytes
    }

    pub fn get_compact_serialization_bytes(&self) -> usize {
        self.mode.serialized_size(true)
    }

    pub fn get_updatable_serialization_bytes(&self) -> usize {
        self.mode.serialized_size(false)
    }

    /// Upper bound on [`get_updatable_serialization_bytes`](Self::get_updatable_serialization_bytes)
    /// for any sketch of this configuration.
    pub fn get_max_updatable_serialization_bytes(lg_config_k: u8, hll_type: HllType) -> usize {
        let k = 1usize << lg_config_k;
        let array_bytes = match hll_type {
            HllType::Hll4 => (k >> 1) + (4 << AuxMap::initial_lg_size(lg_config_k)),
            HllType::Hll6 => num_bytes_for_k(lg_config_k),
            HllType::Hll8 => k,
        };
        HLL_BYTE_ARR_START + array_bytes
    }

    /// Deserialize a sketch built with the default seed.
    pub fn deserialize(bytes: &[u8]) -> Result<HllSketch, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserialize a sketch built with `seed`.
    ///
    /// The serialized form does not record the seed, so a sketch built with a non-default
    /// seed must be restored through this function to keep hashing consistently.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<HllSketch, Error> {
        fn read_u8(slice: &mut SketchSlice<'_>, tag: &'static str) -> Result<u8, Error> {
            slice.read_u8().map_err(|_| Error::insufficient_data(tag))
        }

        let mut slice = SketchSlice::new(bytes);
        let preamble_ints = read_u8(&mut slice, "preamble_ints")?;
        let serial_version = read_u8(&mut slice, "serial_version")?;
        let family_id = read_u8(&mut slice, "family_id")?;
        let lg_config_k = read_u8(&mut slice, "lg_config_k")?;
        let lg_arr = read_u8(&mut slice, "lg_arr")?;
        let flags = read_u8(&mut slice, "flags")?;
        let byte6 = read_u8(&mut slice, "count_or_cur_min")?;
        let mode_byte = read_u8(&mut slice, "mode")?;

        Family::HLL.validate_id(family_id)?;
        ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
        check_lg_k(lg_config_k).map_err(|err| Error::deserial(err.message()))?;
        let hll_type = extract_tgt_hll_type(mode_byte)
            .ok_or_else(|| Error::deserial(format!("invalid HLL type in mode byte {mode_byte:#x}")))?;

        let empty = flags & EMPTY_FLAG_MASK != 0;
        let compact = flags & COMPACT_FLAG_MASK != 0;
        let ooo = flags & OUT_OF_ORDER_FLAG_MASK != 0;
        let start_full_size = flags & FULL_SIZE_FLAG_MASK != 0;
        let cur_mode = extract_cur_mode(mode_byte);
        if start_full_size && cur_mode != CUR_MODE_HLL {
            return Err(Error::deserial(
                "a sketch started at full size must be in HLL mode",
            ));
        }

        let mode = match cur_mode {
            CUR_MODE_LIST => {
                ensure_preamble_longs_in(&[LIST_PREINTS], preamble_ints)?;
                let list = List::deserialize(&mut slice, lg_arr, byte6 as usize, compact)?;
                Mode::List { list, hll_type }
            }
            CUR_MODE_SET => {
                ensure_preamble_longs_in(&[HASH_SET_PREINTS], preamble_ints)?;
                let set = HashSet::deserialize(&mut slice, lg_config_k, lg_arr, compact)?;
                Mode::Set { set, hll_type }
            }
            CUR_MODE_HLL => {
                ensure_preamble_longs_in(&[HLL_PREINTS], preamble_ints)?;
                match hll_type {
                    HllType::Hll4 => Mode::Array4(Array4::deserialize(
                        &mut slice,
                        lg_config_k,
                        byte6,
                        lg_arr,
                        compact,
                        ooo,
                    )?),
                    HllType::Hll6 => {
                        Mode::Array6(Array6::deserialize(&mut slice, lg_config_k, ooo)?)
                    }
                    HllType::Hll8 => {
                        Mode::Array8(Array8::deserialize(&mut slice, lg_config_k, ooo)?)
                    }
                }
            }
            mode => return Err(Error::deserial(format!("invalid HLL mode: {mode}"))),
        };

        if empty != mode.is_empty() {
            return Err(Error::deserial("empty flag does not match sketch contents"));
        }

        Ok(HllSketch {
            lg_config_k,
            seed,
            start_full_size,
            mode,
        })
    }

    /// Human-readable description of the sketch.
    ///
    /// * `summary` - configuration, estimate and bounds
    /// * `detail` - coupons (coupon modes) or registers (HLL mode)
    /// * `aux_detail` - HLL_4 exception table
    /// * `all` - with `detail`, also list zero registers
    pub fn to_summary_string(
        &self,
        summary: bool,
        detail: bool,
        aux_detail: bool,
        all: bool,
    ) -> String {
        Summary {
            sketch: self,
            summary,
            detail,
            aux_detail,
            all,
        }
        .to_string()
    }
}

/// The sections of [`HllSketch::to_summary_string`] to render.
struct Summary<'a> {
    sketch: &'a HllSketch,
    summary: bool,
    detail: bool,
    aux_detail: bool,
    all: bool,
}

impl Summary<'_> {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sketch = self.sketch;
        writeln!(f, "### HLL sketch summary:")?;
        writeln!(f, "  Log Config K   : {}", sketch.lg_config_k)?;
        writeln!(f, "  Hll Target     : {}", sketch.target_type())?;
        writeln!(f, "  Current Mode   : {}", sketch.current_mode())?;
        writeln!(f, "  LB             : {}", sketch.get_lower_bound(NumStdDev::One))?;
        writeln!(f, "  Estimate       : {}", sketch.get_estimate())?;
        writeln!(f, "  UB             : {}", sketch.get_upper_bound(NumStdDev::One))?;
        writeln!(f, "  OutOfOrder flag: {}", sketch.is_out_of_order())?;
        match &sketch.mode {
            Mode::List { list, .. } => {
                writeln!(f, "  Coupon count   : {}", list.container().len())?;
            }
            Mode::Set { set, .. } => {
                writeln!(f, "  Coupon count   : {}", set.container().len())?;
                writeln!(f, "  Table lg size  : {}", set.container().lg_size())?;
            }
            Mode::Array4(arr) => {
                writeln!(f, "  CurMin         : {}", arr.cur_min())?;
                writeln!(f, "  NumAtCurMin    : {}", arr.num_at_cur_min())?;
                let aux_count = arr.aux_map().map_or(0, |aux| aux.len());
                writeln!(f, "  Aux count      : {aux_count}")?;
            }
            Mode::Array6(_) | Mode::Array8(_) => {}
        }
        if let Some(estimator) = sketch.mode.estimator() {
            writeln!(f, "  HipAccum       : {}", estimator.hip_accum())?;
            writeln!(f, "  KxQ0           : {}", estimator.kxq0())?;
            writeln!(f, "  KxQ1           : {}", estimator.kxq1())?;
        }
        writeln!(f, "### End HLL sketch summary")
    }

    fn write_detail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### HLL sketch data detail:")?;
        if let Some(container) = self.sketch.mode.coupon_container() {
            writeln!(f, "  Index  Slot  Value")?;
            for (index, &c) in container.slots().iter().enumerate() {
                if c != 0 || self.all {
                    writeln!(f, "  {index}  {}  {}", get_slot(c), get_value(c))?;
                }
            }
        } else if let Some(registers) = self.sketch.mode.register_values() {
            writeln!(f, "  Slot  Value")?;
            for (slot, value) in registers.into_iter().enumerate() {
                if value != 0 || self.all {
                    writeln!(f, "  {slot}  {value}")?;
                }
            }
        }
        writeln!(f, "### End HLL sketch data detail")
    }

    fn write_aux_detail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Mode::Array4(arr) = &self.sketch.mode else {
            return Ok(());
        };
        writeln!(f, "### HLL sketch aux detail:")?;
        if let Some(aux) = arr.aux_map() {
            let mut entries: Vec<(u32, u8)> = aux.iter().collect();
            entries.sort_unstable();
            for (slot, value) in entries {
                writeln!(f, "  {slot}: {value}")?;
            }
        }
        writeln!(f, "### End HLL sketch aux detail")
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.summary {
            self.write_summary(f)?;
        }
        if self.detail {
            self.write_detail(f)?;
        }
        if self.aux_detail {
            self.write_aux_detail(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for HllSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Summary {
            sketch: self,
            summary: true,
            detail: false,
            aux_detail: false,
            all: false,
        }
        .write_summary(f)
    }
}

/// Empty mode of a new or reset sketch.
fn initial_mode(lg_config_k: u8, hll_type: HllType, start_full_size: bool) -> Mode {
    if !start_full_size {
        return Mode::List {
            list: List::default(),
            hll_type,
        };
    }
    match hll_type {
        HllType::Hll4 => Mode::Array4(Array4::new(lg_config_k)),
        HllType::Hll6 => Mode::Array6(Array6::new(lg_config_k)),
        HllType::Hll8 => Mode::Array8(Array8::new(lg_config_k)),
    }
}

/// Replay coupons into a fresh register array, seeding HIP with the coupon-mode estimate.
fn promote_to_array(container: &Container, hll_type: HllType, lg_config_k: u8) -> Mode {
    debug!(
        "HLL sketch promoted to HLL mode ({hll_type}, lg_k {lg_config_k}) with {} coupons",
        container.len()
    );
    let estimate = container.estimate();
    match hll_type {
        HllType::Hll4 => {
            let mut arr = Array4::new(lg_config_k);
            container.iter().for_each(|c| arr.update(c));
            arr.estimator_mut().set_hip_accum(estimate);
            Mode::Array4(arr)
        }
        HllType::Hll6 => {
            let mut arr = Array6::new(lg_config_k);
            container.iter().for_each(|c| arr.update(c));
            arr.estimator_mut().set_hip_accum(estimate);
            Mode::Array6(arr)
        }
        HllType::Hll8 => {
            let mut arr = Array8::new(lg_config_k);
            container.iter().for_each(|c| arr.update(c));
            arr.estimator_mut().set_hip_accum(estimate);
            Mode::Array8(arr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_mode_transitions() {
        let mut sketch = HllSketch::new(12, HllType::Hll4).unwrap();
        assert_eq!(sketch.current_mode(), HllMode::List);

        for i in 0..8 {
            sketch.update(i);
        }
        assert_eq!(sketch.current_mode(), HllMode::Set);

        for i in 8..1000 {
            sketch.update(i);
        }
        assert_eq!(sketch.current_mode(), HllMode::Hll);
        assert!(!sketch.is_out_of_order());
    }

    #[test]
    fn test_small_lg_k_skips_set() {
        let mut sketch = HllSketch::new(6, HllType::Hll6).unwrap();
        for i in 0..7 {
            sketch.update(i);
        }
        assert_eq!(sketch.current_mode(), HllMode::List);
        sketch.update(7);
        assert_eq!(sketch.current_mode(), HllMode::Hll);
    }

    #[test]
    fn test_reset() {
        let mut sketch = HllSketch::new(8, HllType::Hll8).unwrap();
        for i in 0..500 {
            sketch.update(i);
        }
        sketch.reset();
        assert!(sketch.is_empty());
        assert_eq!(sketch.get_estimate(), 0.0);
        assert_eq!(sketch.target_type(), HllType::Hll8);
        assert_eq!(sketch.current_mode(), HllMode::List);
    }

    #[test]
    fn test_deserialize_rejects_bad_header() {
        let mut sketch = HllSketch::new(10, HllType::Hll4).unwrap();
        sketch.update(1);
        let bytes = sketch.serialize();

        let mut bad = bytes.clone();
        bad[2] = 16;
        let err = HllSketch::deserialize(&bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);

        let mut bad = bytes.clone();
        bad[3] = 30;
        assert!(HllSketch::deserialize(&bad).is_err());

        assert!(HllSketch::deserialize(&bytes[..5]).is_err());
        assert!(HllSketch::deserialize(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_max_updatable_bytes_bounds_actual() {
        for hll_type in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
            let mut sketch = HllSketch::new(10, hll_type).unwrap();
            for i in 0..10_000 {
                sketch.update(i);
            }
            let max = HllSketch::get_max_updatable_serialization_bytes(10, hll_type);
            assert!(sketch.get_updatable_serialization_bytes() <= max);
        }
    }
}
