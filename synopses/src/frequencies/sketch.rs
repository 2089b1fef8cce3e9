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

//! Frequent items sketch implementation.

use std::fmt;
use std::hash::Hash;

use log::debug;
use log::trace;

use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::ensure_serial_version_is;
use crate::common::Datum;
use crate::common::ensure_one_dimensional;
use crate::error::Error;
use crate::frequencies::serde::I64Serde;
use crate::frequencies::serde::ItemsSerde;
use crate::frequencies::serde::StringSerde;
use crate::frequencies::serialization::ACTIVE_ITEMS_INT;
use crate::frequencies::serialization::EMPTY_FLAG_MASK;
use crate::frequencies::serialization::MAXIMUM_ERROR_LONG;
use crate::frequencies::serialization::PREAMBLE_LONGS_EMPTY;
use crate::frequencies::serialization::PREAMBLE_LONGS_NONEMPTY;
use crate::frequencies::serialization::SERIAL_VERSION;
use crate::frequencies::serialization::TOTAL_WEIGHT_LONG;
use crate::frequencies::space_saving_map::LG_MIN_MAP_SIZE;
use crate::frequencies::space_saving_map::SpaceSavingMap;

/// Smallest accepted `lg_max_map_size`.
pub const MIN_LG_MAX_MAP_SIZE: u8 = 3;
/// Largest accepted `lg_max_map_size`.
pub const MAX_LG_MAX_MAP_SIZE: u8 = 26;

/// Error guarantees for frequent item queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Include items whose upper bound reaches the threshold (no false negatives).
    NoFalseNegatives,
    /// Include items whose lower bound reaches the threshold (no false positives).
    NoFalsePositives,
}

/// Result row for frequent item queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<T> {
    item: T,
    estimate: u64,
    upper_bound: u64,
    lower_bound: u64,
}

impl<T> Row<T> {
    /// Returns the item value.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Returns the estimated frequency.
    pub fn estimate(&self) -> u64 {
        self.estimate
    }

    /// Returns the upper bound for the frequency.
    pub fn upper_bound(&self) -> u64 {
        self.upper_bound
    }

    /// Returns the lower bound for the frequency.
    pub fn lower_bound(&self) -> u64 {
        self.lower_bound
    }
}

/// Frequent items sketch for generic item types.
///
/// Tracks at most `2^lg_max_map_size` items. Each tracked item carries an estimate and an
/// offset such that its true frequency lies in `[estimate - offset, estimate]`; untracked
/// items occurred at most [`get_maximum_error`](Self::get_maximum_error) times.
#[derive(Debug, Clone)]
pub struct FrequentItemsSketch<T> {
    lg_max_map_size: u8,
    max_error: u64,
    total_weight: u64,
    map: SpaceSavingMap<T>,
}

impl<T: Eq + Hash> FrequentItemsSketch<T> {
    /// Creates a new sketch tracking up to `2^lg_max_map_size` items.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) unless
    /// `lg_max_map_size` is in `[3, 26]`.
    pub fn new(lg_max_map_size: u8) -> Result<Self, Error> {
        if !(MIN_LG_MAX_MAP_SIZE..=MAX_LG_MAX_MAP_SIZE).contains(&lg_max_map_size) {
            return Err(Error::invalid_config(format!(
                "lg_max_map_size must be in [{MIN_LG_MAX_MAP_SIZE}, {MAX_LG_MAX_MAP_SIZE}], got {lg_max_map_size}"
            )));
        }
        Ok(Self::with_lg_map_sizes(lg_max_map_size, LG_MIN_MAP_SIZE))
    }

    /// Returns true if the sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of active items being tracked.
    pub fn get_num_active_items(&self) -> usize {
        self.map.len()
    }

    /// Returns the total weight of the stream.
    pub fn get_total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the estimated frequency for an item, 0 if it is not tracked.
    pub fn get_estimate(&self, item: &T) -> u64 {
        self.map.get(item).map_or(0, |entry| entry.estimate)
    }

    /// Returns the guaranteed lower bound for an item's frequency.
    pub fn get_lower_bound(&self, item: &T) -> u64 {
        self.map
            .get(item)
            .map_or(0, |entry| entry.estimate - entry.offset)
    }

    /// Returns the upper bound for an item's frequency.
    pub fn get_upper_bound(&self, item: &T) -> u64 {
        self.map
            .get(item)
            .map_or(self.max_error, |entry| entry.estimate)
    }

    /// Returns the largest frequency an untracked item may have.
    pub fn get_maximum_error(&self) -> u64 {
        self.max_error
    }

    /// Returns epsilon for this sketch.
    pub fn get_epsilon(&self) -> f64 {
        Self::get_epsilon_for_lg_size(self.lg_max_map_size)
    }

    /// Returns epsilon for a sketch configured with `lg_max_map_size`.
    pub fn get_epsilon_for_lg_size(lg_max_map_size: u8) -> f64 {
        1.0 / (1u64 << lg_max_map_size) as f64
    }

    /// Returns the a priori bound on the maximum error after `estimated_total_weight`.
    pub fn get_apriori_error(lg_max_map_size: u8, estimated_total_weight: u64) -> f64 {
        Self::get_epsilon_for_lg_size(lg_max_map_size) * estimated_total_weight as f64
    }

    /// Returns the maximum number of tracked items.
    pub fn get_maximum_map_capacity(&self) -> usize {
        1usize << self.lg_max_map_size
    }

    /// Returns the configured lg_max_map_size.
    pub fn get_lg_max_map_size(&self) -> u8 {
        self.lg_max_map_size
    }

    /// Returns the current hash table size in log2.
    pub fn get_lg_cur_map_size(&self) -> u8 {
        self.map.lg_length()
    }

    /// Updates the sketch with a count of one.
    pub fn update(&mut self, item: T) {
        self.update_with_count(item, 1);
    }

    /// Updates the sketch with an item and weight; a zero weight is ignored.
    ///
    /// Weights saturate: the total weight and every estimate stop at `u64::MAX`.
    pub fn update_with_count(&mut self, item: T, weight: u64) {
        if weight == 0 {
            return;
        }
        self.total_weight = self.total_weight.saturating_add(weight);
        if self.map.adjust(&item, weight, 0) {
            return;
        }
        if self.map.len() >= self.get_maximum_map_capacity() {
            self.evict_min();
        }
        // an untracked item may have occurred up to max_error times already
        self.map
            .insert(item, weight.saturating_add(self.max_error), self.max_error);
    }

    fn evict_min(&mut self) {
        if let Some((min, evicted)) = self.map.evict_min() {
            self.max_error = self.max_error.max(min);
            debug!(
                "frequent items sketch evicted {} items at estimate {min}",
                evicted.len()
            );
            for entry in &evicted {
                trace!(
                    "evicted entry: estimate {}, offset {}",
                    entry.estimate, entry.offset
                );
            }
        }
    }

    /// Merges another sketch into this one.
    ///
    /// Estimates and offsets of shared items add up, saturating at `u64::MAX`; an item tracked
    /// on one side only absorbs the other side's maximum error. Entries at the minimum estimate are evicted until the
    /// result fits the capacity.
    pub fn merge(&mut self, other: &Self)
    where
        T: Clone,
    {
        if other.is_empty() && other.max_error == 0 {
            self.total_weight = self.total_weight.saturating_add(other.total_weight);
            return;
        }
        let self_error = self.max_error;
        let other_error = other.max_error;

        let other_only: Vec<(T, u64, u64)> = other
            .map
            .iter_ordered()
            .filter(|entry| self.map.get(&entry.item).is_none())
            .map(|entry| {
                (
                    entry.item.clone(),
                    entry.estimate.saturating_add(self_error),
                    entry.offset.saturating_add(self_error),
                )
            })
            .collect();

        let mine = std::mem::replace(
            &mut self.map,
            SpaceSavingMap::new(LG_MIN_MAP_SIZE, self.lg_max_map_size + 1),
        );
        let mut combined: Vec<(T, u64, u64)> = mine
            .into_ordered()
            .into_iter()
            .map(|entry| match other.map.get(&entry.item) {
                Some(theirs) => (
                    entry.item,
                    entry.estimate.saturating_add(theirs.estimate),
                    entry.offset.saturating_add(theirs.offset),
                ),
                None => (
                    entry.item,
                    entry.estimate.saturating_add(other_error),
                    entry.offset.saturating_add(other_error),
                ),
            })
            .collect();
        combined.extend(other_only);
        combined.sort_by_key(|&(_, estimate, _)| estimate);

        let mut max_error = self_error.saturating_add(other_error);
        let capacity = self.get_maximum_map_capacity();
        let mut start = 0;
        while combined.len() - start > capacity {
            let min = combined[start].1;
            let end = start + combined[start..].partition_point(|&(_, estimate, _)| estimate == min);
            debug!(
                "frequent items merge evicted {} items at estimate {min}",
                end - start
            );
            max_error = max_error.max(min);
            start = end;
        }

        for (item, estimate, offset) in combined.into_iter().skip(start) {
            self.map.insert(item, estimate, offset);
        }
        self.max_error = max_error;
        self.total_weight = self.total_weight.saturating_add(other.total_weight);
    }

    /// Resets the sketch to an empty state.
    pub fn reset(&mut self) {
        *self = Self::with_lg_map_sizes(self.lg_max_map_size, LG_MIN_MAP_SIZE);
    }

    /// Returns frequent items for `threshold`; a threshold of 0 stands for the maximum error.
    ///
    /// Rows are sorted by estimate, largest first.
    pub fn get_frequent_items(&self, error_type: ErrorType, threshold: u64) -> Vec<Row<T>>
    where
        T: Clone,
    {
        let threshold = if threshold == 0 {
            self.max_error
        } else {
            threshold
        };
        let mut rows: Vec<Row<T>> = self
            .map
            .iter_ordered()
            .filter(|entry| match error_type {
                ErrorType::NoFalseNegatives => entry.estimate >= threshold,
                ErrorType::NoFalsePositives => entry.estimate - entry.offset >= threshold,
            })
            .map(|entry| Row {
                item: entry.item.clone(),
                estimate: entry.estimate,
                upper_bound: entry.estimate,
                lower_bound: entry.estimate - entry.offset,
            })
            .collect();
        rows.reverse();
        rows
    }

    /// Serializes this sketch into a byte vector using the provided item codec.
    pub fn serialize_with<S: ItemsSerde<T>>(&self, serde: &S) -> Vec<u8> {
        if self.is_empty() {
            let mut bytes = SketchBytes::with_capacity(8);
            self.write_header(&mut bytes, PREAMBLE_LONGS_EMPTY, EMPTY_FLAG_MASK);
            return bytes.into_bytes();
        }

        let entries: Vec<_> = self.map.iter_ordered().collect();
        let items: Vec<&T> = entries.iter().map(|entry| &entry.item).collect();
        let items_bytes = serde.serialize_items(&items);
        let mut bytes = SketchBytes::with_capacity(
            PREAMBLE_LONGS_NONEMPTY as usize * 8 + entries.len() * 16 + items_bytes.len(),
        );
        self.write_header(&mut bytes, PREAMBLE_LONGS_NONEMPTY, 0);
        bytes.write_u32_le(entries.len() as u32);
        bytes.write_padding(4);
        bytes.write_u64_le(self.total_weight);
        bytes.write_u64_le(self.max_error);
        for entry in &entries {
            bytes.write_u64_le(entry.estimate);
        }
        for entry in &entries {
            bytes.write_u64_le(entry.offset);
        }
        bytes.write(&items_bytes);
        bytes.into_bytes()
    }

    fn write_header(&self, bytes: &mut SketchBytes, preamble_longs: u8, flags: u8) {
        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::FREQUENCY.id);
        bytes.write_u8(self.lg_max_map_size);
        bytes.write_u8(self.map.lg_length());
        bytes.write_u8(flags);
        bytes.write_padding(2);
    }

    /// Returns the size of [`serialize_with`](Self::serialize_with) output.
    pub fn get_serialized_size_bytes_with<S: ItemsSerde<T>>(&self, serde: &S) -> usize {
        if self.is_empty() {
            return 8;
        }
        let items: Vec<&T> = self.map.iter_ordered().map(|entry| &entry.item).collect();
        PREAMBLE_LONGS_NONEMPTY as usize * 8
            + items.len() * 16
            + serde.serialize_items(&items).len()
    }

    /// Deserializes a sketch from bytes using the provided item codec.
    pub fn deserialize_with<S: ItemsSerde<T>>(bytes: &[u8], serde: &S) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |_| Error::insufficient_data(tag)
        }

        let mut cursor = SketchSlice::new(bytes);
        let pre_longs = cursor.read_u8().map_err(make_error("preamble_longs"))? & 0x3f;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family = cursor.read_u8().map_err(make_error("family"))?;
        let lg_max = cursor.read_u8().map_err(make_error("lg_max_map_size"))?;
        let lg_cur = cursor.read_u8().map_err(make_error("lg_cur_map_size"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;

        Family::FREQUENCY.validate_id(family)?;
        ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
        Family::FREQUENCY.validate_preamble_size(pre_longs)?;
        if !(MIN_LG_MAX_MAP_SIZE..=MAX_LG_MAX_MAP_SIZE).contains(&lg_max) {
            return Err(Error::deserial(format!(
                "lg_max_map_size out of range: {lg_max}"
            )));
        }
        if !(LG_MIN_MAP_SIZE..=lg_max + 1).contains(&lg_cur) {
            return Err(Error::deserial(format!(
                "lg_cur_map_size {lg_cur} out of range for lg_max_map_size {lg_max}"
            )));
        }

        let is_empty = (flags & EMPTY_FLAG_MASK) != 0;
        if is_empty {
            if pre_longs != PREAMBLE_LONGS_EMPTY {
                return Err(Error::invalid_preamble_longs(
                    &[PREAMBLE_LONGS_EMPTY],
                    pre_longs,
                ));
            }
            return Ok(Self::with_lg_map_sizes(lg_max, lg_cur));
        }
        if pre_longs != PREAMBLE_LONGS_NONEMPTY {
            return Err(Error::invalid_preamble_longs(
                &[PREAMBLE_LONGS_NONEMPTY],
                pre_longs,
            ));
        }

        cursor
            .seek_to(ACTIVE_ITEMS_INT)
            .map_err(make_error("active_items"))?;
        let active_items = cursor.read_u32_le().map_err(make_error("active_items"))? as usize;
        cursor
            .seek_to(TOTAL_WEIGHT_LONG)
            .map_err(make_error("total_weight"))?;
        let total_weight = cursor.read_u64_le().map_err(make_error("total_weight"))?;
        cursor
            .seek_to(MAXIMUM_ERROR_LONG)
            .map_err(make_error("maximum_error"))?;
        let max_error = cursor.read_u64_le().map_err(make_error("maximum_error"))?;

        if active_items == 0 || active_items > 1usize << lg_max {
            return Err(Error::deserial(format!(
                "{active_items} active items invalid for lg_max_map_size {lg_max}"
            )));
        }
        if cursor.remaining() < active_items * 16 {
            return Err(Error::insufficient_data("estimates"));
        }
        let mut estimates = Vec::with_capacity(active_items);
        for _ in 0..active_items {
            estimates.push(cursor.read_u64_le().map_err(make_error("estimates"))?);
        }
        let mut offsets = Vec::with_capacity(active_items);
        for _ in 0..active_items {
            offsets.push(cursor.read_u64_le().map_err(make_error("offsets"))?);
        }
        let (items, consumed) = serde.deserialize_items(&bytes[cursor.position()..], active_items)?;
        if items.len() != active_items || consumed > cursor.remaining() {
            return Err(Error::deserial("item count mismatch during deserialization"));
        }

        let mut sketch = Self::with_lg_map_sizes(lg_max, lg_cur);
        let mut lower_bound_sum = 0u64;
        let mut previous_estimate = 0;
        for ((item, estimate), offset) in items.into_iter().zip(estimates).zip(offsets) {
            if estimate == 0 || offset > estimate || estimate < previous_estimate {
                return Err(Error::deserial(format!(
                    "invalid entry: estimate {estimate}, offset {offset}"
                )));
            }
            if sketch.map.get(&item).is_some() {
                return Err(Error::deserial("duplicate item"));
            }
            previous_estimate = estimate;
            lower_bound_sum = lower_bound_sum.saturating_add(estimate - offset);
            sketch.map.insert(item, estimate, offset);
        }
        if lower_bound_sum > total_weight {
            return Err(Error::deserial(format!(
                "total weight {total_weight} below the sum of lower bounds {lower_bound_sum}"
            )));
        }
        sketch.total_weight = total_weight;
        sketch.max_error = max_error;
        Ok(sketch)
    }

    /// Summary of the sketch state, optionally listing every tracked item.
    pub fn to_summary_string(&self, print_items: bool) -> String
    where
        T: fmt::Display,
    {
        let mut out = self.to_string();
        if print_items {
            out.push_str("### Items in descending estimate order:\n");
            out.push_str("   item, estimate, lower bound, upper bound\n");
            for entry in self.map.iter_ordered().collect::<Vec<_>>().into_iter().rev() {
                out.push_str(&format!(
                    "   {}, {}, {}, {}\n",
                    entry.item,
                    entry.estimate,
                    entry.estimate - entry.offset,
                    entry.estimate
                ));
            }
            out.push_str("### End items\n");
        }
        out
    }

    fn with_lg_map_sizes(lg_max_map_size: u8, lg_cur_map_size: u8) -> Self {
        Self {
            lg_max_map_size,
            max_error: 0,
            total_weight: 0,
            map: SpaceSavingMap::new(lg_cur_map_size, lg_max_map_size + 1),
        }
    }
}

impl FrequentItemsSketch<String> {
    /// Updates with every value of a flat batch, numbers taken by their decimal form.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`](crate::error::ErrorKind::InvalidInput) if the batch contains a
    /// nested sequence. Nothing is applied in that case.
    pub fn update_batch(&mut self, data: &[Datum]) -> Result<(), Error> {
        ensure_one_dimensional(data)?;
        for datum in data {
            self.update(datum.to_string());
        }
        Ok(())
    }

    /// Serializes this sketch with [`StringSerde`].
    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_with(&StringSerde)
    }

    /// Deserializes a sketch written by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with(bytes, &StringSerde)
    }

    pub fn get_serialized_size_bytes(&self) -> usize {
        self.get_serialized_size_bytes_with(&StringSerde)
    }
}

impl FrequentItemsSketch<i64> {
    /// Serializes this sketch with [`I64Serde`].
    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_with(&I64Serde)
    }

    /// Deserializes a sketch written by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with(bytes, &I64Serde)
    }

    pub fn get_serialized_size_bytes(&self) -> usize {
        self.get_serialized_size_bytes_with(&I64Serde)
    }
}

impl<T: Eq + Hash> fmt::Display for FrequentItemsSketch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### Frequent items sketch summary:")?;
        writeln!(f, "   lg max map size : {}", self.lg_max_map_size)?;
        writeln!(f, "   lg cur map size : {}", self.map.lg_length())?;
        writeln!(f, "   num active items: {}", self.map.len())?;
        writeln!(f, "   total weight    : {}", self.total_weight)?;
        writeln!(f, "   max error       : {}", self.max_error)?;
        writeln!(f, "### End sketch summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_below_capacity() {
        let mut sketch = FrequentItemsSketch::new(4).unwrap();
        for _ in 0..100 {
            sketch.update("a".to_string());
        }
        sketch.update("b".to_string());
        let a = "a".to_string();
        assert_eq!(sketch.get_estimate(&a), 100);
        assert_eq!(sketch.get_lower_bound(&a), 100);
        assert_eq!(sketch.get_upper_bound(&a), 100);
        assert_eq!(sketch.get_maximum_error(), 0);
        assert_eq!(sketch.get_total_weight(), 101);
    }

    #[test]
    fn test_eviction_keeps_bounds() {
        let mut sketch = FrequentItemsSketch::<i64>::new(3).unwrap();
        let mut truth = std::collections::HashMap::new();
        for i in 0..2_000i64 {
            let item = if i % 3 == 0 { i % 5 } else { i % 97 };
            sketch.update(item);
            *truth.entry(item).or_insert(0u64) += 1;
        }
        assert!(sketch.get_num_active_items() <= 8);
        assert!(sketch.get_maximum_error() > 0);
        for (item, &count) in &truth {
            assert!(sketch.get_lower_bound(item) <= count, "item {item}");
            assert!(sketch.get_upper_bound(item) >= count, "item {item}");
        }
    }

    #[test]
    fn test_weight_zero_is_ignored() {
        let mut sketch = FrequentItemsSketch::<i64>::new(3).unwrap();
        sketch.update_with_count(1, 0);
        assert!(sketch.is_empty());
        assert_eq!(sketch.get_total_weight(), 0);
    }

    #[test]
    fn test_threshold_zero_uses_maximum_error() {
        let mut sketch = FrequentItemsSketch::<i64>::new(3).unwrap();
        for i in 0..9 {
            sketch.update(i);
        }
        sketch.update_with_count(100, 50);
        let max_error = sketch.get_maximum_error();
        assert_eq!(max_error, 1);
        let rows = sketch.get_frequent_items(ErrorType::NoFalseNegatives, 0);
        assert!(rows.iter().all(|row| row.estimate() >= max_error));
        assert_eq!(*rows[0].item(), 100);
        assert!(rows.windows(2).all(|w| w[0].estimate() >= w[1].estimate()));
    }

    #[test]
    fn test_merge_absorbs_other_error() {
        let mut a = FrequentItemsSketch::<i64>::new(3).unwrap();
        let mut b = FrequentItemsSketch::<i64>::new(3).unwrap();
        a.update_with_count(1, 10);
        b.update_with_count(1, 5);
        b.update_with_count(2, 7);
        a.merge(&b);
        assert_eq!(a.get_estimate(&1), 15);
        assert_eq!(a.get_estimate(&2), 7);
        assert_eq!(a.get_total_weight(), 22);
        assert_eq!(a.get_maximum_error(), 0);
    }

    #[test]
    fn test_invalid_lg_max_map_size() {
        assert!(FrequentItemsSketch::<i64>::new(2).is_err());
        assert!(FrequentItemsSketch::<i64>::new(27).is_err());
    }

    #[test]
    fn test_epsilon() {
        assert_eq!(FrequentItemsSketch::<i64>::get_epsilon_for_lg_size(4), 1.0 / 16.0);
        assert_eq!(FrequentItemsSketch::<i64>::get_apriori_error(4, 1600), 100.0);
    }
}
