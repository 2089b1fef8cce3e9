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

//! HyperLogLog union: combines sketches into an HLL_8 accumulator.
//!
//! Coupon-mode operands are replayed coupon by coupon, so an accumulator that only ever saw
//! coupon-mode sketches stays in stream order. Register-array operands are merged by
//! register maximum, after which the accumulator estimates out of order.

use std::fmt;
use std::hash::Hash;

use log::debug;

use crate::common::Datum;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hll::HllSketch;
use crate::hll::HllType;
use crate::hll::array4::Array4;
use crate::hll::array6::Array6;
use crate::hll::array8::Array8;
use crate::hll::check_lg_k;
use crate::hll::estimator::HipEstimator;
use crate::hll::list::List;
use crate::hll::mode::Mode;

/// An HLL union.
///
/// The union keeps its own accumulator ("gadget") of at most `lg_max_k`; operands are
/// only borrowed.
#[derive(Debug, Clone)]
pub struct HllUnion {
    lg_max_k: u8,
    gadget: HllSketch,
}

impl HllUnion {
    /// Create an empty union with the default seed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) unless
    /// `lg_max_k` is in `[4, 21]`.
    pub fn new(lg_max_k: u8) -> Result<Self, Error> {
        Self::with_seed(lg_max_k, DEFAULT_UPDATE_SEED)
    }

    pub fn with_seed(lg_max_k: u8, seed: u64) -> Result<Self, Error> {
        check_lg_k(lg_max_k)?;
        Ok(Self {
            lg_max_k,
            gadget: HllSketch::with_seed(lg_max_k, HllType::Hll8, seed)?,
        })
    }

    pub fn lg_max_k(&self) -> u8 {
        self.lg_max_k
    }

    /// Current lg_k of the accumulator; it shrinks below `lg_max_k` after merging a
    /// smaller sketch in HLL mode.
    pub fn lg_config_k(&self) -> u8 {
        self.gadget.lg_config_k()
    }

    pub fn seed(&self) -> u64 {
        self.gadget.seed()
    }

    pub fn is_empty(&self) -> bool {
        self.gadget.is_empty()
    }

    pub fn reset(&mut self) {
        let mode = Mode::List {
            list: List::default(),
            hll_type: HllType::Hll8,
        };
        self.gadget = HllSketch::from_mode(self.lg_max_k, self.gadget.seed(), mode);
    }

    /// Feed a value straight into the accumulator.
    pub fn update_value<T: Hash>(&mut self, value: T) {
        self.gadget.update(value);
    }

    pub fn update_f64(&mut self, value: f64) {
        self.gadget.update_f64(value);
    }

    pub fn update_datum(&mut self, datum: &Datum) -> Result<(), Error> {
        self.gadget.update_datum(datum)
    }

    pub fn update_batch(&mut self, data: &[Datum]) -> Result<(), Error> {
        self.gadget.update_batch(data)
    }

    /// Merge a sketch into the union.
    ///
    /// # Errors
    ///
    /// Returns [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) if the sketch hashes
    /// with a different seed; the union is left unchanged.
    pub fn update(&mut self, sketch: &HllSketch) -> Result<(), Error> {
        if sketch.seed() != self.gadget.seed() {
            return Err(Error::seed_mismatch(self.gadget.seed(), sketch.seed()));
        }
        if sketch.is_empty() {
            return Ok(());
        }

        if let Some(container) = sketch.mode().coupon_container() {
            for coupon in container.iter() {
                self.gadget.update_with_coupon(coupon);
            }
            return Ok(());
        }

        let src_lg_k = sketch.lg_config_k();
        let (Some(src_registers), Some(src_estimator)) =
            (sketch.mode().register_values(), sketch.mode().estimator())
        else {
            return Ok(());
        };

        let seed = self.gadget.seed();
        let dst_lg_k = self.gadget.lg_config_k();
        let gadget = match self.gadget.mode() {
            Mode::Array8(dst) => {
                let mut dst = if src_lg_k < dst_lg_k {
                    debug!("HLL union downsized from lg_k {dst_lg_k} to {src_lg_k}");
                    dst.downsample(src_lg_k)
                } else {
                    dst.clone()
                };
                dst.merge_registers(src_lg_k, &src_registers);
                dst
            }
            gadget_mode => {
                // the accumulator is still in coupon mode: start from the operand's
                // registers and replay the accumulated coupons on top
                let mut dst = if src_lg_k <= self.lg_max_k {
                    Array8::from_registers(src_lg_k, &src_registers, src_estimator.clone())
                } else {
                    let mut dst = Array8::new(self.lg_max_k);
                    dst.merge_registers(src_lg_k, &src_registers);
                    dst.estimator_mut().set_out_of_order(true);
                    dst
                };
                if let Some(container) = gadget_mode.coupon_container() {
                    container.iter().for_each(|c| dst.update(c));
                }
                dst
            }
        };

        let lg_k = gadget.lg_config_k();
        self.gadget = HllSketch::from_mode(lg_k, seed, Mode::Array8(gadget));
        Ok(())
    }

    /// A new sketch of the requested type holding the union's current state.
    pub fn get_result(&self, hll_type: HllType) -> HllSketch {
        let lg_k = self.gadget.lg_config_k();
        let seed = self.gadget.seed();
        let mode = match self.gadget.mode() {
            Mode::List { list, .. } => Mode::List {
                list: list.clone(),
                hll_type,
            },
            Mode::Set { set, .. } => Mode::Set {
                set: set.clone(),
                hll_type,
            },
            Mode::Array8(arr) => convert_array8(arr, hll_type),
            other => other.clone(),
        };
        HllSketch::from_mode(lg_k, seed, mode)
    }

    pub fn get_estimate(&self) -> f64 {
        self.gadget.get_estimate()
    }

    pub fn get_lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.gadget.get_lower_bound(num_std_dev)
    }

    pub fn get_upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        self.gadget.get_upper_bound(num_std_dev)
    }
}

fn convert_array8(arr: &Array8, hll_type: HllType) -> Mode {
    let registers: Vec<u8> = arr.registers().collect();
    let estimator: HipEstimator = arr.estimator().clone();
    let lg_k = arr.lg_config_k();
    match hll_type {
        HllType::Hll4 => Mode::Array4(Array4::from_registers(lg_k, &registers, estimator)),
        HllType::Hll6 => Mode::Array6(Array6::from_registers(lg_k, &registers, estimator)),
        HllType::Hll8 => Mode::Array8(arr.clone()),
    }
}

impl fmt::Display for HllUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### HLL union summary:")?;
        writeln!(f, "  Log Max K      : {}", self.lg_max_k)?;
        write!(f, "{}", self.gadget)?;
        writeln!(f, "### End HLL union summary")
    }
}
