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

//! Shared coupon storage for LIST and SET modes.

use crate::common::NumStdDev;
use crate::hll::COUPON_RSE;
use crate::hll::KEY_BITS_26;

pub const COUPON_EMPTY: u32 = 0;

/// Number of distinct coupons a stream can produce, discounted for the skew of the
/// value bits: coupons with small values are far more likely than large ones.
const COUPON_SPACE: f64 = 3.0 * (1u64 << KEY_BITS_26) as f64;

/// Container for coupon storage, used by both List and HashSet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Log2 of container capacity
    lg_size: u8,
    /// Array of coupon values (0 = empty)
    coupons: Box<[u32]>,
    /// Number of non-empty coupons
    len: usize,
}

impl Container {
    pub fn new(lg_size: u8) -> Self {
        Self {
            lg_size,
            coupons: vec![COUPON_EMPTY; 1 << lg_size].into_boxed_slice(),
            len: 0,
        }
    }

    /// Wrap an existing coupon array; `len` is recounted from the array.
    pub fn from_raw(lg_size: u8, coupons: Box<[u32]>) -> Self {
        debug_assert_eq!(coupons.len(), 1 << lg_size);
        let len = coupons.iter().filter(|&&c| c != COUPON_EMPTY).count();
        Self {
            lg_size,
            coupons,
            len,
        }
    }

    pub fn lg_size(&self) -> u8 {
        self.lg_size
    }

    pub fn capacity(&self) -> usize {
        self.coupons.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw slots, including empty ones.
    pub fn slots(&self) -> &[u32] {
        &self.coupons
    }

    pub fn slots_mut(&mut self) -> &mut [u32] {
        &mut self.coupons
    }

    pub fn increment_len(&mut self) {
        self.len += 1;
    }

    /// Non-empty coupons in slot order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.coupons.iter().copied().filter(|&c| c != COUPON_EMPTY)
    }

    /// Linear counting over the coupon space.
    pub fn estimate(&self) -> f64 {
        let len = self.len as f64;
        let est = -COUPON_SPACE * (-len / COUPON_SPACE).ln_1p();
        len.max(est)
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let len = self.len as f64;
        let bound = self.estimate() / (1.0 - num_std_dev.as_f64() * COUPON_RSE);
        len.max(bound)
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let len = self.len as f64;
        let bound = self.estimate() / (1.0 + num_std_dev.as_f64() * COUPON_RSE);
        len.max(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_close_to_count() {
        let mut container = Container::new(5);
        for (i, slot) in container.slots_mut().iter_mut().enumerate().take(20) {
            *slot = (i as u32 + 1) | (1 << 26);
        }
        let container = Container::from_raw(5, container.coupons.clone());
        assert_eq!(container.len(), 20);
        let est = container.estimate();
        assert!(est >= 20.0);
        assert!(est < 20.01);
        assert!(container.lower_bound(NumStdDev::Two) <= est);
        assert!(container.upper_bound(NumStdDev::Two) >= est);
    }

    #[test]
    fn test_empty_estimate() {
        let container = Container::new(3);
        assert!(container.is_empty());
        assert_eq!(container.estimate(), 0.0);
        assert_eq!(container.lower_bound(NumStdDev::One), 0.0);
    }
}
