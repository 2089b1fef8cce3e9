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

use std::fmt;
use std::hash::Hash;

use log::debug;

use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::ensure_serial_version_is;
use crate::common::Datum;
use crate::common::INVERSE_POWERS_OF_2;
use crate::common::NumStdDev;
use crate::common::canonical_double;
use crate::common::ensure_one_dimensional;
use crate::cpc::DEFAULT_LG_K;
use crate::cpc::Flavor;
use crate::cpc::MAX_LG_K;
use crate::cpc::MIN_LG_K;
use crate::cpc::confidence::hip_confidence_lb;
use crate::cpc::confidence::hip_confidence_ub;
use crate::cpc::confidence::icon_confidence_lb;
use crate::cpc::confidence::icon_confidence_ub;
use crate::cpc::estimator::icon_estimate;
use crate::cpc::pair_table::PairTable;
use crate::cpc::serialization::FLAG_COMPRESSED;
use crate::cpc::serialization::FLAG_HAS_HIP;
use crate::cpc::serialization::FLAG_HAS_TABLE;
use crate::cpc::serialization::FLAG_HAS_WINDOW;
use crate::cpc::serialization::HEADER_INTS;
use crate::cpc::serialization::SERIAL_VERSION;
use crate::cpc::serialization::has_flag;
use crate::cpc::serialization::make_preamble_ints;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::MurmurHash3X64128;
use crate::hash::compute_seed_hash;

/// The window covers columns `offset..offset + 8` and never slides past the last byte.
const MAX_WINDOW_OFFSET: u8 = 56;

/// `KXP_BYTE_TABLE[b]` sums `2^-(j+1)` over the bits `j` that are clear in `b`.
const KXP_BYTE_TABLE: [f64; 256] = {
    let mut table = [0.0; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut sum = 0.0;
        let mut j = 0;
        while j < 8 {
            if (byte >> j) & 1 == 0 {
                sum += INVERSE_POWERS_OF_2[j + 1];
            }
            j += 1;
        }
        table[byte] = sum;
        byte += 1;
    }
    table
};

/// A Compressed Probabilistic Counting sketch.
#[derive(Debug, Clone)]
pub struct CpcSketch {
    // immutable config variables
    lg_k: u8,
    seed: u64,

    // sketch state
    /// Part of a speed optimization.
    first_interesting_column: u8,
    /// The number of coupons collected so far.
    num_coupons: u32,
    /// Surprising values table in sparse mode.
    surprising_value_table: Option<PairTable>,
    /// Derivable from num_coupons, but made explicit for speed.
    window_offset: u8,
    /// Size K bytes in dense mode.
    sliding_window: Vec<u8>,

    // estimator state
    /// Whether the sketch is a result of merging.
    ///
    /// If `false`, the HIP (Historical Inverse Probability) estimator is used.
    /// If `true`, the ICON (Inter-Column Optimal) Estimator is fallback in use.
    merge_flag: bool,
    // the following variables are only valid in HIP estimator
    /// A pre-calculated probability factor (`k * p`) used to compute the increment delta.
    kxp: f64,
    /// The accumulated cardinality estimate.
    hip_est_accum: f64,
}

impl Default for CpcSketch {
    fn default() -> Self {
        Self::empty(DEFAULT_LG_K, DEFAULT_UPDATE_SEED)
    }
}

impl CpcSketch {
    /// Creates a new `CpcSketch` with the given `lg_k` and default seed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) unless `lg_k` is in
    /// `[4, 26]`.
    pub fn new(lg_k: u8) -> Result<Self, Error> {
        Self::with_seed(lg_k, DEFAULT_UPDATE_SEED)
    }

    /// Creates a new `CpcSketch` with the given `lg_k` and `seed`.
    pub fn with_seed(lg_k: u8, seed: u64) -> Result<Self, Error> {
        check_lg_k(lg_k)?;
        Ok(Self::empty(lg_k, seed))
    }

    pub(super) fn empty(lg_k: u8, seed: u64) -> Self {
        Self {
            lg_k,
            seed,
            first_interesting_column: 0,
            num_coupons: 0,
            surprising_value_table: None,
            window_offset: 0,
            sliding_window: vec![],
            merge_flag: false,
            kxp: (1u64 << lg_k) as f64,
            hip_est_accum: 0.0,
        }
    }

    /// Return the parameter lg_k.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The number of distinct `(row, column)` coupons collected.
    pub fn num_coupons(&self) -> u32 {
        self.num_coupons
    }

    pub fn flavor(&self) -> Flavor {
        determine_flavor(self.lg_k, self.num_coupons)
    }

    /// Whether the sketch is the result of a union.
    pub fn is_merged(&self) -> bool {
        self.merge_flag
    }

    /// Returns the best estimate of the cardinality of the sketch.
    pub fn get_estimate(&self) -> f64 {
        if !self.merge_flag {
            self.hip_est_accum
        } else {
            icon_estimate(self.lg_k, self.num_coupons)
        }
    }

    /// Returns the best estimate of the lower bound of the confidence interval given `kappa`.
    pub fn get_lower_bound(&self, kappa: NumStdDev) -> f64 {
        if !self.merge_flag {
            hip_confidence_lb(self.lg_k, self.num_coupons, self.hip_est_accum, kappa)
        } else {
            icon_confidence_lb(self.lg_k, self.num_coupons, kappa)
        }
    }

    /// Returns the best estimate of the upper bound of the confidence interval given `kappa`.
    pub fn get_upper_bound(&self, kappa: NumStdDev) -> f64 {
        if !self.merge_flag {
            hip_confidence_ub(self.lg_k, self.num_coupons, self.hip_est_accum, kappa)
        } else {
            icon_confidence_ub(self.lg_k, self.num_coupons, kappa)
        }
    }

    /// Returns true if the sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.num_coupons == 0
    }

    /// Update the sketch with a hashable value.
    ///
    /// For `f32`/`f64` values, use `update_f32`/`update_f64` instead.
    pub fn update<T: Hash>(&mut self, value: T) {
        let mut hasher = MurmurHash3X64128::with_seed(self.seed);
        value.hash(&mut hasher);
        let (h1, h2) = hasher.finish128();

        let k = 1 << self.lg_k;
        let col = h2.leading_zeros(); // 0 <= col <= 64
        let col = if col > 63 { 63 } else { col as u8 }; // clip so that 0 <= col <= 63
        let row = (h1 & (k - 1)) as u32;
        let mut row_col = (row << 6) | (col as u32);
        // To avoid the hash table's "empty" value, we change the row of the following pair.
        // This case is extremely unlikely, but we might as well handle it.
        if row_col == u32::MAX {
            row_col ^= 1 << 6;
        }
        self.row_col_update(row_col);
    }

    /// Update the sketch with a f64 value.
    pub fn update_f64(&mut self, value: f64) {
        self.update(canonical_double(value));
    }

    /// Update the sketch with a f32 value.
    pub fn update_f32(&mut self, value: f32) {
        self.update_f64(value as f64);
    }

    /// Update the sketch with a dynamically typed scalar.
    pub fn update_datum(&mut self, datum: &Datum) -> Result<(), Error> {
        if let Datum::Seq(_) = datum {
            return Err(Error::invalid_input(
                "a sequence is not a single item; use update_batch",
            ));
        }
        self.update(datum);
        Ok(())
    }

    /// Update the sketch with every value of a flat batch; nothing is applied if the batch
    /// is rejected.
    pub fn update_batch(&mut self, data: &[Datum]) -> Result<(), Error> {
        ensure_one_dimensional(data)?;
        for datum in data {
            self.update(datum);
        }
        Ok(())
    }

    pub(super) fn row_col_update(&mut self, row_col: u32) {
        let col = (row_col & 63) as u8;
        if col < self.first_interesting_column {
            // important speed optimization
            return;
        }

        if self.num_coupons == 0 {
            debug!("CPC sketch promoted from EMPTY to SPARSE");
        }

        if self.sliding_window.is_empty() {
            self.update_sparse(row_col);
        } else {
            self.update_windowed(row_col);
        }
    }

    fn table_mut(&mut self) -> &mut PairTable {
        let lg_k = self.lg_k;
        self.surprising_value_table
            .get_or_insert_with(|| PairTable::new(2, 6 + lg_k))
    }

    fn update_hip(&mut self, row_col: u32) {
        let k = 1u64 << self.lg_k;
        let col = (row_col & 63) as usize;
        let one_over_p = (k as f64) / self.kxp;
        self.hip_est_accum += one_over_p;
        self.kxp -= INVERSE_POWERS_OF_2[col + 1] // notice the "+1"
    }

    fn update_sparse(&mut self, row_col: u32) {
        let k = 1u64 << self.lg_k;
        let c32pre = (self.num_coupons as u64) << 5;
        assert!(c32pre < 3 * k); // C < 3K/32, in other words, flavor == SPARSE
        let is_novel = self.table_mut().maybe_insert(row_col);
        if is_novel {
            self.num_coupons += 1;
            self.update_hip(row_col);
            let c32post = (self.num_coupons as u64) << 5;
            if c32post >= 3 * k {
                self.promote_sparse_to_windowed();
            }
        }
    }

    fn promote_sparse_to_windowed(&mut self) {
        assert_eq!(self.window_offset, 0);

        let k = 1u64 << self.lg_k;
        let c32 = (self.num_coupons as u64) << 5;
        assert!((c32 == (3 * k)) || ((self.lg_k == 4) && (c32 > (3 * k))));
        debug!(
            "CPC sketch promoted from SPARSE to windowed with {} coupons",
            self.num_coupons
        );

        self.sliding_window.resize(k as usize, 0);

        let old_table = self
            .surprising_value_table
            .replace(PairTable::new(2, 6 + self.lg_k));
        for row_col in old_table.iter().flat_map(|table| table.iter()) {
            let col = (row_col & 63) as u8;
            if col < 8 {
                let row = (row_col >> 6) as usize;
                self.sliding_window[row] |= 1 << col;
            } else {
                // cannot use must_insert(), because it doesn't provide for growth
                let is_novel = self.table_mut().maybe_insert(row_col);
                assert!(is_novel);
            }
        }
    }

    fn update_windowed(&mut self, row_col: u32) {
        assert!(self.window_offset <= MAX_WINDOW_OFFSET);
        let k = 1u64 << self.lg_k;
        let c32pre = (self.num_coupons as u64) << 5;
        assert!(c32pre >= 3 * k); // C >= 3K/32, in other words flavor >= HYBRID
        let c8pre = (self.num_coupons as u64) << 3;
        let w8pre = (self.window_offset as u64) << 3;
        assert!(c8pre < (27 + w8pre) * k); // C < (K * 27/8) + (K * windowOffset)

        let col = (row_col & 63) as u8;
        let is_novel = if col < self.window_offset {
            // track the surprising 0's "before" the window
            self.table_mut().maybe_delete(row_col) // inverted logic
        } else if col < self.window_offset + 8 {
            // track the 8 bits inside the window
            let row = (row_col >> 6) as usize;
            let old_bits = self.sliding_window[row];
            let new_bits = old_bits | (1 << (col - self.window_offset));
            self.sliding_window[row] = new_bits;
            old_bits != new_bits
        } else {
            // track the surprising 1's "after" the window
            self.table_mut().maybe_insert(row_col) // normal logic
        };

        if is_novel {
            self.num_coupons += 1;
            self.update_hip(row_col);
            let c8post = (self.num_coupons as u64) << 3;
            if c8post >= (27 + w8pre) * k {
                self.move_window();
                assert!((1..=MAX_WINDOW_OFFSET).contains(&self.window_offset));
                let w8post = (self.window_offset as u64) << 3;
                assert!(c8post < ((27 + w8post) * k)); // C < (K * 27/8) + (K * windowOffset)
            }
        }
    }

    /// Slide the window one column to the right, rebuilding window and table.
    fn move_window(&mut self) {
        let new_offset = self.window_offset + 1;
        assert!(new_offset <= MAX_WINDOW_OFFSET);
        assert_eq!(
            new_offset,
            determine_correct_offset(self.lg_k, self.num_coupons)
        );

        let bit_matrix = self.build_bit_matrix();
        // kxp drifts after many small subtractions, refresh it from scratch
        self.refresh_kxp(&bit_matrix);

        self.window_offset = new_offset;
        self.rebuild_window_and_table(&bit_matrix);
        debug!(
            "CPC sketch window moved to offset {new_offset} at {} coupons",
            self.num_coupons
        );
    }

    /// Fill window and table from a full bit matrix at the current `window_offset`.
    fn rebuild_window_and_table(&mut self, bit_matrix: &[u64]) {
        let offset = self.window_offset;
        let mask_for_clearing_window = !(0xFFu64 << offset);
        let mask_for_flipping_early_zone = (1u64 << offset) - 1;
        let mut all_surprises_ored = 0u64;

        self.sliding_window.resize(bit_matrix.len(), 0);
        let mut table = PairTable::new(2, 6 + self.lg_k);
        for (row, &bits) in bit_matrix.iter().enumerate() {
            self.sliding_window[row] = ((bits >> offset) & 0xFF) as u8;
            // flipping turns the surprising zeros into ones
            let mut pattern = (bits & mask_for_clearing_window) ^ mask_for_flipping_early_zone;
            all_surprises_ored |= pattern;
            while pattern != 0 {
                let col = pattern.trailing_zeros();
                pattern ^= 1 << col;
                let row_col = ((row as u32) << 6) | col;
                let is_novel = table.maybe_insert(row_col);
                assert!(is_novel);
            }
        }
        self.surprising_value_table = Some(table);

        // columns below this are full in every row
        self.first_interesting_column = (all_surprises_ored.trailing_zeros() as u8).min(offset);
    }

    fn refresh_kxp(&mut self, bit_matrix: &[u64]) {
        // sum each byte lane separately for numerical accuracy
        let mut byte_sums = [0.0f64; 8];
        for &row in bit_matrix {
            let mut word = row;
            for sum in byte_sums.iter_mut() {
                *sum += KXP_BYTE_TABLE[(word & 0xFF) as usize];
                word >>= 8;
            }
        }
        let mut total = 0.0;
        for (j, sum) in byte_sums.iter().enumerate().rev() {
            total += INVERSE_POWERS_OF_2[8 * j] * sum;
        }
        self.kxp = total;
    }

    /// One 64-bit word per row holding every collected coupon.
    pub(super) fn build_bit_matrix(&self) -> Vec<u64> {
        let k = 1usize << self.lg_k;
        let offset = self.window_offset;
        assert!(offset <= MAX_WINDOW_OFFSET);

        if self.num_coupons == 0 {
            return vec![0; k];
        }
        // columns before the window are assumed set, the table lists their exceptions
        let mut matrix = vec![(1u64 << offset) - 1; k];

        if !self.sliding_window.is_empty() {
            for (row, &bits) in matrix.iter_mut().zip(self.sliding_window.iter()) {
                *row |= (bits as u64) << offset;
            }
        }

        if let Some(table) = &self.surprising_value_table {
            for row_col in table.iter() {
                let col = row_col & 63;
                let row = (row_col >> 6) as usize;
                // flips the surprising zeros off and the surprising ones on
                matrix[row] ^= 1 << col;
            }
        }
        matrix
    }

    pub(super) fn window(&self) -> &[u8] {
        &self.sliding_window
    }

    pub(super) fn window_offset(&self) -> u8 {
        self.window_offset
    }

    pub(super) fn surprising_pairs(&self) -> impl Iterator<Item = u32> + '_ {
        self.surprising_value_table
            .iter()
            .flat_map(|table| table.iter())
    }

    /// Sketch holding exactly the coupons of `bit_matrix`, flagged as merged.
    pub(super) fn from_bit_matrix(lg_k: u8, seed: u64, bit_matrix: &[u64]) -> Self {
        let mut sketch = Self::empty(lg_k, seed);
        sketch.merge_flag = true;
        sketch.num_coupons = bit_matrix.iter().map(|row| row.count_ones()).sum();

        match sketch.flavor() {
            Flavor::Empty => {}
            Flavor::Sparse => {
                let mut table = PairTable::new(2, 6 + lg_k);
                for (row, &bits) in bit_matrix.iter().enumerate() {
                    let mut pattern = bits;
                    while pattern != 0 {
                        let col = pattern.trailing_zeros();
                        pattern ^= 1 << col;
                        let is_novel = table.maybe_insert(((row as u32) << 6) | col);
                        debug_assert!(is_novel);
                    }
                }
                sketch.surprising_value_table = Some(table);
            }
            _ => {
                sketch.window_offset = determine_correct_offset(lg_k, sketch.num_coupons);
                sketch.rebuild_window_and_table(bit_matrix);
            }
        }
        sketch
    }

    /// Copy of a sketch with the merge flag raised and the HIP state reset.
    pub(super) fn into_merged(mut self) -> Self {
        self.merge_flag = true;
        self.kxp = (1u64 << self.lg_k) as f64;
        self.hip_est_accum = 0.0;
        self
    }
}

impl CpcSketch {
    /// Returns an upper bound on the serialized size of a sketch.
    ///
    /// The bound holds for all but vanishingly unlikely inputs: in windowed flavors the
    /// table of surprising values stays far below K/8 entries.
    pub fn max_serialized_bytes(lg_k: u8) -> usize {
        const MAX_PREAMBLE_SIZE_BYTES: usize = 4 * 9;
        let k = 1usize << lg_k.clamp(MIN_LG_K, MAX_LG_K);
        // window plus a table of at most K/8 pairs
        MAX_PREAMBLE_SIZE_BYTES + k + 4 * (k / 8)
    }

    /// Serializes this sketch to bytes, uncompressed.
    pub fn serialize(&self) -> Vec<u8> {
        let num_coupons = self.num_coupons;
        let has_hip = !self.merge_flag;
        let has_table = num_coupons > 0;
        let has_window = !self.sliding_window.is_empty();
        let preamble_ints = make_preamble_ints(num_coupons, has_hip, has_table, has_window);

        let mut flags = 0u8;
        if num_coupons > 0 {
            if has_hip {
                flags |= 1 << FLAG_HAS_HIP;
            }
            if has_table {
                flags |= 1 << FLAG_HAS_TABLE;
            }
            if has_window {
                flags |= 1 << FLAG_HAS_WINDOW;
            }
        }

        let pairs = match &self.surprising_value_table {
            Some(table) if has_table => table.sorted_items(),
            _ => vec![],
        };

        let mut bytes = SketchBytes::with_capacity(
            4 * preamble_ints as usize + 4 * pairs.len() + self.sliding_window.len(),
        );
        bytes.write_u8(preamble_ints);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::CPC.id);
        bytes.write_u8(self.lg_k);
        bytes.write_u8(self.first_interesting_column);
        bytes.write_u8(flags);
        bytes.write_u16_le(compute_seed_hash(self.seed));
        if num_coupons == 0 {
            return bytes.into_bytes();
        }

        bytes.write_u32_le(num_coupons);
        if has_table {
            bytes.write_u32_le(pairs.len() as u32);
        }
        if has_window {
            bytes.write_u8(self.window_offset);
            bytes.write_padding(3);
        }
        if has_hip {
            bytes.write_f64_le(self.kxp);
            bytes.write_f64_le(self.hip_est_accum);
        }
        for pair in pairs {
            bytes.write_u32_le(pair);
        }
        if has_window {
            bytes.write(&self.sliding_window);
        }
        bytes.into_bytes()
    }

    /// Deserializes a sketch built with the default seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes a sketch built with `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) if the bytes were
    /// produced with another seed, or
    /// [`MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData) if
    /// they are not a valid CPC sketch.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |_| Error::insufficient_data(tag)
        }

        let mut cursor = SketchSlice::new(bytes);
        let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let lg_k = cursor.read_u8().map_err(make_error("lg_k"))?;
        let first_interesting_column = cursor
            .read_u8()
            .map_err(make_error("first_interesting_column"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(make_error("seed_hash"))?;

        Family::CPC.validate_id(family_id)?;
        ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
        Family::CPC.validate_preamble_size(preamble_ints)?;
        check_lg_k(lg_k).map_err(|err| Error::deserial(err.message()))?;
        if has_flag(flags, FLAG_COMPRESSED) {
            return Err(Error::deserial("compressed CPC sketches are not supported"));
        }
        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, seed_hash));
        }

        let mut sketch = Self::empty(lg_k, seed);
        if preamble_ints == HEADER_INTS {
            if flags != 0 || first_interesting_column != 0 {
                return Err(Error::deserial("empty CPC sketch with state flags"));
            }
            return Ok(sketch);
        }

        let has_hip = has_flag(flags, FLAG_HAS_HIP);
        let has_table = has_flag(flags, FLAG_HAS_TABLE);
        let has_window = has_flag(flags, FLAG_HAS_WINDOW);

        let num_coupons = cursor.read_u32_le().map_err(make_error("num_coupons"))?;
        let expected_ints = make_preamble_ints(num_coupons, has_hip, has_table, has_window);
        if preamble_ints != expected_ints {
            return Err(Error::invalid_preamble_longs(&[expected_ints], preamble_ints));
        }
        let k = 1u64 << lg_k;
        if num_coupons as u64 > 64 * k {
            return Err(Error::deserial(format!(
                "{num_coupons} coupons exceed the capacity of lg_k {lg_k}"
            )));
        }

        let num_pairs = if has_table {
            cursor.read_u32_le().map_err(make_error("num_pairs"))?
        } else {
            0
        };
        let window_offset = if has_window {
            let offset = cursor.read_u8().map_err(make_error("window_offset"))?;
            let mut padding = [0u8; 3];
            cursor
                .read_exact(&mut padding)
                .map_err(make_error("window_offset"))?;
            offset
        } else {
            0
        };
        if has_hip {
            sketch.kxp = cursor.read_f64_le().map_err(make_error("kxp"))?;
            sketch.hip_est_accum = cursor.read_f64_le().map_err(make_error("hip_est_accum"))?;
        }

        let flavor = determine_flavor(lg_k, num_coupons);
        if has_window != (flavor > Flavor::Sparse) {
            return Err(Error::deserial(format!(
                "window presence does not match flavor {flavor}"
            )));
        }
        // no sketch holds enough coupons to push the window further
        if has_window && determine_correct_offset(lg_k, num_coupons) > MAX_WINDOW_OFFSET {
            return Err(Error::deserial(format!(
                "{num_coupons} coupons put the window beyond column {MAX_WINDOW_OFFSET}"
            )));
        }
        if window_offset != determine_correct_offset(lg_k, num_coupons) && has_window {
            return Err(Error::deserial(format!(
                "window offset {window_offset} does not match {num_coupons} coupons"
            )));
        }
        if first_interesting_column > window_offset {
            return Err(Error::deserial(format!(
                "first interesting column {first_interesting_column} beyond window offset {window_offset}"
            )));
        }

        let mut table = PairTable::new(2, 6 + lg_k);
        let mut ones_after_window = 0u64;
        let mut zeros_before_window = 0u64;
        for _ in 0..num_pairs {
            let row_col = cursor.read_u32_le().map_err(make_error("pairs"))?;
            let row = (row_col >> 6) as u64;
            let col = (row_col & 63) as u8;
            if row_col == u32::MAX || row >= k {
                return Err(Error::deserial(format!("invalid pair: {row_col:#x}")));
            }
            if has_window {
                if col < window_offset {
                    zeros_before_window += 1;
                } else if col >= window_offset + 8 {
                    ones_after_window += 1;
                } else {
                    return Err(Error::deserial(format!("pair inside the window: {row_col:#x}")));
                }
            }
            if !table.maybe_insert(row_col) {
                return Err(Error::deserial(format!("duplicate pair: {row_col:#x}")));
            }
        }

        let found = if has_window {
            let mut window = vec![0u8; k as usize];
            cursor
                .read_exact(&mut window)
                .map_err(make_error("window"))?;
            let window_bits: u64 = window.iter().map(|b| b.count_ones() as u64).sum();
            sketch.sliding_window = window;
            (window_offset as u64 * k + window_bits + ones_after_window)
                .checked_sub(zeros_before_window)
        } else {
            Some(num_pairs as u64)
        };
        if found != Some(num_coupons as u64) {
            return Err(Error::deserial(format!(
                "coupon count {num_coupons} does not match the serialized state"
            )));
        }

        sketch.num_coupons = num_coupons;
        sketch.first_interesting_column = first_interesting_column;
        sketch.window_offset = window_offset;
        sketch.surprising_value_table = Some(table);
        sketch.merge_flag = !has_hip;
        Ok(sketch)
    }
}

impl fmt::Display for CpcSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### CPC sketch summary:")?;
        writeln!(f, "   lg_k           : {}", self.lg_k)?;
        writeln!(f, "   seed hash      : {:x}", compute_seed_hash(self.seed))?;
        writeln!(f, "   C              : {}", self.num_coupons)?;
        writeln!(f, "   flavor         : {}", self.flavor())?;
        writeln!(f, "   merged         : {}", self.merge_flag)?;
        if !self.merge_flag {
            writeln!(f, "   HIP estimate   : {}", self.hip_est_accum)?;
            writeln!(f, "   kxp            : {}", self.kxp)?;
        }
        writeln!(f, "   interesting col: {}", self.first_interesting_column)?;
        let table_entries = self
            .surprising_value_table
            .as_ref()
            .map_or(0, |table| table.num_items());
        writeln!(f, "   table entries  : {table_entries}")?;
        if self.sliding_window.is_empty() {
            writeln!(f, "   window         : not allocated")?;
        } else {
            writeln!(f, "   window         : allocated")?;
            writeln!(f, "   window offset  : {}", self.window_offset)?;
        }
        writeln!(f, "### End sketch summary")
    }
}

pub(super) fn check_lg_k(lg_k: u8) -> Result<(), Error> {
    if (MIN_LG_K..=MAX_LG_K).contains(&lg_k) {
        Ok(())
    } else {
        Err(Error::invalid_config(format!(
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        )))
    }
}

pub(super) fn determine_flavor(lg_k: u8, num_coupons: u32) -> Flavor {
    let k = 1u64 << lg_k;
    let c = num_coupons as u64;
    if c == 0 {
        Flavor::Empty
    } else if (c << 5) < 3 * k {
        Flavor::Sparse
    } else if (c << 1) < k {
        Flavor::Hybrid
    } else if (c << 3) < 27 * k {
        Flavor::Pinned
    } else {
        Flavor::Sliding
    }
}

/// Window offset for `num_coupons`: zero up to `19K/8` coupons, then one more per K.
pub(super) fn determine_correct_offset(lg_k: u8, num_coupons: u32) -> u8 {
    let k = 1i64 << lg_k;
    let tmp = ((num_coupons as i64) << 3) - (19 * k);
    if tmp < 0 {
        0
    } else {
        (tmp >> (lg_k + 3)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_thresholds() {
        // K = 1024
        assert_eq!(determine_flavor(10, 0), Flavor::Empty);
        assert_eq!(determine_flavor(10, 95), Flavor::Sparse);
        assert_eq!(determine_flavor(10, 96), Flavor::Hybrid);
        assert_eq!(determine_flavor(10, 511), Flavor::Hybrid);
        assert_eq!(determine_flavor(10, 512), Flavor::Pinned);
        assert_eq!(determine_flavor(10, 3455), Flavor::Pinned);
        assert_eq!(determine_flavor(10, 3456), Flavor::Sliding);
    }

    #[test]
    fn test_correct_offset() {
        assert_eq!(determine_correct_offset(10, 0), 0);
        assert_eq!(determine_correct_offset(10, 3455), 0);
        assert_eq!(determine_correct_offset(10, 3456), 1);
        assert_eq!(determine_correct_offset(10, 3456 + 1024), 2);
    }

    #[test]
    fn test_window_moves_keep_coupons() {
        let mut sketch = CpcSketch::new(6).unwrap();
        for i in 0..20_000 {
            sketch.update(i);
        }
        assert_eq!(sketch.flavor(), Flavor::Sliding);
        assert!(sketch.window_offset() > 1);
        assert_eq!(
            sketch.window_offset(),
            determine_correct_offset(6, sketch.num_coupons())
        );

        let matrix = sketch.build_bit_matrix();
        let total: u32 = matrix.iter().map(|row| row.count_ones()).sum();
        assert_eq!(total, sketch.num_coupons());
    }

    #[test]
    fn test_from_bit_matrix_round_trip() {
        let mut sketch = CpcSketch::new(8).unwrap();
        for i in 0..3_000 {
            sketch.update(i);
        }
        let matrix = sketch.build_bit_matrix();
        let rebuilt = CpcSketch::from_bit_matrix(8, DEFAULT_UPDATE_SEED, &matrix);
        assert!(rebuilt.is_merged());
        assert_eq!(rebuilt.num_coupons(), sketch.num_coupons());
        assert_eq!(rebuilt.window_offset(), sketch.window_offset());
        assert_eq!(rebuilt.build_bit_matrix(), matrix);
    }

    #[test]
    fn test_invalid_lg_k() {
        assert!(CpcSketch::new(3).is_err());
        assert!(CpcSketch::new(27).is_err());
        assert!(CpcSketch::new(26).is_ok());
    }
}
