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

//! LIST mode: an unordered array of up to 8 distinct coupons.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::hll::HllType;
use crate::hll::container::COUPON_EMPTY;
use crate::hll::container::Container;
use crate::hll::serialization::*;

pub const LG_INIT_LIST_SIZE: u8 = 3;

/// List for sequential coupon storage with duplicate detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    container: Container,
}

impl Default for List {
    fn default() -> Self {
        Self {
            container: Container::new(LG_INIT_LIST_SIZE),
        }
    }
}

impl List {
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Insert coupon into list, ignoring duplicates
    pub fn update(&mut self, coupon: u32) {
        let container = &mut self.container;
        let mut inserted = false;
        for value in container.slots_mut().iter_mut() {
            if *value == COUPON_EMPTY {
                *value = coupon;
                inserted = true;
                break;
            } else if *value == coupon {
                break;
            }
        }
        if inserted {
            container.increment_len();
        }
    }

    pub fn serialized_size(&self, compact: bool) -> usize {
        let n = if compact {
            self.container.len()
        } else {
            self.container.capacity()
        };
        LIST_INT_ARR_START + n * 4
    }

    pub fn serialize(&self, lg_config_k: u8, hll_type: HllType, compact: bool) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(self.serialized_size(compact));
        Preamble {
            preamble_ints: LIST_PREINTS,
            lg_config_k,
            lg_arr: self.container.lg_size(),
            flags: flags(self.container.is_empty(), compact, false),
            byte6: self.container.len() as u8,
            cur_mode: CUR_MODE_LIST,
            hll_type,
        }
        .write(&mut bytes);

        if compact {
            // coupons fill the list from the front, so this keeps insertion order
            for coupon in self.container.iter() {
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
        lg_arr: u8,
        count: usize,
        compact: bool,
    ) -> Result<Self, Error> {
        if lg_arr != LG_INIT_LIST_SIZE {
            return Err(Error::deserial(format!(
                "LIST lg_arr must be {LG_INIT_LIST_SIZE}, got {lg_arr}"
            )));
        }
        let capacity = 1usize << lg_arr;
        if count > capacity {
            return Err(Error::deserial(format!(
                "LIST coupon count {count} exceeds capacity {capacity}"
            )));
        }

        let to_read = if compact { count } else { capacity };
        let mut coupons = vec![COUPON_EMPTY; capacity].into_boxed_slice();
        for coupon in coupons.iter_mut().take(to_read) {
            *coupon = slice
                .read_u32_le()
                .map_err(|_| Error::insufficient_data("list_coupons"))?;
        }

        let container = Container::from_raw(lg_arr, coupons);
        let packed = container.slots()[..container.len()]
            .iter()
            .all(|&c| c != COUPON_EMPTY);
        if container.len() != count || !packed {
            return Err(Error::deserial(format!(
                "LIST coupon count mismatch: header says {count}, found {}",
                container.len()
            )));
        }
        Ok(Self { container })
    }
}
