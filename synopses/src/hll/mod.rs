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

//! HyperLogLog sketch implementation for cardinality estimation.
//!
//! This module provides a probabilistic data structure for estimating the number of distinct
//! elements (cardinality) in a data stream with bounded memory and known error.
//!
//! # Modes
//!
//! A sketch starts in LIST mode (a short list of coupons), moves to SET mode (a hash set of
//! coupons) and finally to HLL mode (a dense register array) as it fills. Transitions only go
//! forward.
//!
//! Three target HLL types are supported, trading precision for memory:
//!
//! - [`HllType::Hll4`]: 4 bits per bucket (most compact)
//! - [`HllType::Hll6`]: 6 bits per bucket (balanced)
//! - [`HllType::Hll8`]: 8 bits per bucket (fastest)
//!
//! All three produce identical estimates for identical input; HLL_4 keeps registers that
//! overflow its nibble in an auxiliary exception table.
//!
//! # Coupons
//!
//! A coupon is a 32-bit value encoding both a slot number (26 bits) and a value (6 bits).
//! The slot identifies which bucket to update, and the value represents the number of
//! leading zeros in the hash plus one.
//!
//! # Usage
//!
//! ```rust
//! # use synopses::common::NumStdDev;
//! # use synopses::hll::{HllSketch, HllType, HllUnion};
//! let mut a = HllSketch::new(12, HllType::Hll4).unwrap();
//! let mut b = HllSketch::new(12, HllType::Hll8).unwrap();
//! for i in 0..1000i64 {
//!     a.update(i);
//!     b.update(i + 500);
//! }
//!
//! let mut union = HllUnion::new(12).unwrap();
//! union.update(&a).unwrap();
//! union.update(&b).unwrap();
//! let result = union.get_result(HllType::Hll6);
//! assert!(result.get_lower_bound(NumStdDev::Three) <= 1500.0);
//! assert!(result.get_upper_bound(NumStdDev::Three) >= 1500.0);
//! ```

use std::fmt;
use std::hash::Hash;

use crate::hash::MurmurHash3X64128;

mod array4;
mod array6;
mod array8;
mod aux_map;
mod container;
mod estimator;
mod hash_set;
mod list;
mod mode;
mod serialization;
mod sketch;
mod union;

// Re-export public API
pub use self::mode::HllMode;
pub use self::sketch::HllSketch;
pub use self::union::HllUnion;

/// Target HLL type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HllType {
    /// 4 bits per register, with an exception table for large values.
    #[default]
    Hll4 = 0,
    /// 6 bits per register.
    Hll6 = 1,
    /// 8 bits per register.
    Hll8 = 2,
}

impl fmt::Display for HllType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HllType::Hll4 => f.write_str("HLL_4"),
            HllType::Hll6 => f.write_str("HLL_6"),
            HllType::Hll8 => f.write_str("HLL_8"),
        }
    }
}

/// Min log2 of K.
pub const MIN_LG_K: u8 = 4;
/// Max log2 of K.
pub const MAX_LG_K: u8 = 21;

const KEY_BITS_26: u32 = 26;
const KEY_MASK_26: u32 = (1 << KEY_BITS_26) - 1;

const COUPON_RSE_FACTOR: f64 = 0.409; // at transition point not the asymptote
const COUPON_RSE: f64 = COUPON_RSE_FACTOR / (1 << 13) as f64;

// Resize at 3/4 = 75% load factor
const RESIZE_NUMERATOR: usize = 3;
const RESIZE_DENOMINATOR: usize = 4;

/// Extract slot number (low 26 bits) from coupon
#[inline]
fn get_slot(coupon: u32) -> u32 {
    coupon & KEY_MASK_26
}

/// Extract value (upper 6 bits) from coupon
#[inline]
fn get_value(coupon: u32) -> u8 {
    (coupon >> KEY_BITS_26) as u8
}

/// Pack slot number and value into a coupon
///
/// Format: [value (6 bits) << 26] | [slot (26 bits)]
#[inline]
fn pack_coupon(slot: u32, value: u8) -> u32 {
    ((value as u32) << KEY_BITS_26) | (slot & KEY_MASK_26)
}

/// Hash a value into a coupon.
fn coupon<H: Hash>(seed: u64, v: H) -> u32 {
    let mut hasher = MurmurHash3X64128::with_seed(seed);
    v.hash(&mut hasher);
    let (lo, hi) = hasher.finish128();

    let addr26 = lo as u32 & KEY_MASK_26;
    let lz = hi.leading_zeros();
    let capped = lz.min(62);
    let value = capped + 1;

    (value << KEY_BITS_26) | addr26
}

fn check_lg_k(lg_config_k: u8) -> Result<(), crate::error::Error> {
    if (MIN_LG_K..=MAX_LG_K).contains(&lg_config_k) {
        Ok(())
    } else {
        Err(crate::error::Error::invalid_config(format!(
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_config_k}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DEFAULT_UPDATE_SEED;

    #[test]
    fn test_pack_unpack_coupon() {
        let slot = 12345u32;
        let value = 42u8;
        let coupon = pack_coupon(slot, value);
        assert_eq!(get_slot(coupon), slot);
        assert_eq!(get_value(coupon), value);
    }

    #[test]
    fn test_coupon_value_range() {
        for i in 0..10_000i64 {
            let c = coupon(DEFAULT_UPDATE_SEED, i);
            assert!((1..=63).contains(&get_value(c)));
        }
    }

    #[test]
    fn test_coupon_depends_on_seed() {
        let differ = (0..100i64)
            .filter(|i| coupon(1, i) != coupon(2, i))
            .count();
        assert!(differ > 90);
    }
}
