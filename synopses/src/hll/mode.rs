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

use crate::common::NumStdDev;
use crate::hll::HllType;
use crate::hll::array4::Array4;
use crate::hll::array6::Array6;
use crate::hll::array8::Array8;
use crate::hll::container::Container;
use crate::hll::estimator::HipEstimator;
use crate::hll::hash_set::HashSet;
use crate::hll::list::List;

/// Storage mode a sketch is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HllMode {
    /// Short list of coupons.
    List,
    /// Hash set of coupons.
    Set,
    /// Dense register array.
    Hll,
}

impl fmt::Display for HllMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HllMode::List => f.write_str("LIST"),
            HllMode::Set => f.write_str("SET"),
            HllMode::Hll => f.write_str("HLL"),
        }
    }
}

/// Current sketch mode, owning exactly the buffers that mode needs.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Mode {
    List { list: List, hll_type: HllType },
    Set { set: HashSet, hll_type: HllType },
    Array4(Array4),
    Array6(Array6),
    Array8(Array8),
}

impl Mode {
    pub fn current_mode(&self) -> HllMode {
        match self {
            Mode::List { .. } => HllMode::List,
            Mode::Set { .. } => HllMode::Set,
            Mode::Array4(_) | Mode::Array6(_) | Mode::Array8(_) => HllMode::Hll,
        }
    }

    pub fn target_type(&self) -> HllType {
        match self {
            Mode::List { hll_type, .. } | Mode::Set { hll_type, .. } => *hll_type,
            Mode::Array4(_) => HllType::Hll4,
            Mode::Array6(_) => HllType::Hll6,
            Mode::Array8(_) => HllType::Hll8,
        }
    }

    /// The coupon store in LIST or SET mode.
    pub fn coupon_container(&self) -> Option<&Container> {
        match self {
            Mode::List { list, .. } => Some(list.container()),
            Mode::Set { set, .. } => Some(set.container()),
            _ => None,
        }
    }

    /// Register values in slot order, in HLL mode.
    pub fn register_values(&self) -> Option<Vec<u8>> {
        match self {
            Mode::Array4(arr) => Some(arr.registers().collect()),
            Mode::Array6(arr) => Some(arr.registers().collect()),
            Mode::Array8(arr) => Some(arr.registers().collect()),
            _ => None,
        }
    }

    pub fn estimator(&self) -> Option<&HipEstimator> {
        match self {
            Mode::Array4(arr) => Some(arr.estimator()),
            Mode::Array6(arr) => Some(arr.estimator()),
            Mode::Array8(arr) => Some(arr.estimator()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Mode::List { list, .. } => list.container().is_empty(),
            Mode::Set { set, .. } => set.container().is_empty(),
            Mode::Array4(arr) => arr.is_empty(),
            Mode::Array6(arr) => arr.is_empty(),
            Mode::Array8(arr) => arr.is_empty(),
        }
    }

    pub fn estimate(&self) -> f64 {
        match self {
            Mode::List { list, .. } => list.container().estimate(),
            Mode::Set { set, .. } => set.container().estimate(),
            Mode::Array4(arr) => arr.estimate(),
            Mode::Array6(arr) => arr.estimate(),
            Mode::Array8(arr) => arr.estimate(),
        }
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        match self {
            Mode::List { list, .. } => list.container().upper_bound(num_std_dev),
            Mode::Set { set, .. } => set.container().upper_bound(num_std_dev),
            Mode::Array4(arr) => arr.upper_bound(num_std_dev),
            Mode::Array6(arr) => arr.upper_bound(num_std_dev),
            Mode::Array8(arr) => arr.upper_bound(num_std_dev),
        }
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        match self {
            Mode::List { list, .. } => list.container().lower_bound(num_std_dev),
            Mode::Set { set, .. } => set.container().lower_bound(num_std_dev),
            Mode::Array4(arr) => arr.lower_bound(num_std_dev),
            Mode::Array6(arr) => arr.lower_bound(num_std_dev),
            Mode::Array8(arr) => arr.lower_bound(num_std_dev),
        }
    }

    pub fn serialized_size(&self, compact: bool) -> usize {
        match self {
            Mode::List { list, .. } => list.serialized_size(compact),
            Mode::Set { set, .. } => set.serialized_size(compact),
            Mode::Array4(arr) => arr.serialized_size(compact),
            Mode::Array6(arr) => arr.serialized_size(),
            Mode::Array8(arr) => arr.serialized_size(),
        }
    }

    pub fn serialize(&self, lg_config_k: u8, compact: bool) -> Vec<u8> {
        match self {
            Mode::List { list, hll_type } => list.serialize(lg_config_k, *hll_type, compact),
            Mode::Set { set, hll_type } => set.serialize(lg_config_k, *hll_type, compact),
            Mode::Array4(arr) => arr.serialize(compact),
            Mode::Array6(arr) => arr.serialize(compact),
            Mode::Array8(arr) => arr.serialize(compact),
        }
    }
}
