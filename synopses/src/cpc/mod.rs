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

//! Compressed Probabilistic Counting sketch for cardinality estimation.
//!
//! A CPC sketch reaches the same accuracy as HLL in less serialized space. Each input is hashed
//! to a `(row, column)` coupon; the sketch keeps the set of distinct coupons in one of several
//! representations ("flavors") chosen by the coupon count C relative to K = 2^lg_k:
//!
//! - EMPTY: no coupons.
//! - SPARSE: `32C < 3K`, every coupon sits in a hash table of pairs.
//! - HYBRID, PINNED: an 8-bit-per-row window at column offset 0 plus a table of the
//!   coupons right of it.
//! - SLIDING: the window moves right as C grows. Columns left of it are assumed full and the
//!   table records the coupons still missing there.
//!
//! A sketch that has never been merged estimates with the HIP (historical inverse
//! probability) accumulator. Union results fall back to the ICON estimator, which only needs
//! the coupon count.
//!
//! # Usage
//!
//! ```rust
//! # use synopses::common::NumStdDev;
//! # use synopses::cpc::CpcSketch;
//! let mut sketch = CpcSketch::new(11).unwrap();
//! for i in 0..10_000u64 {
//!     sketch.update(i);
//! }
//! let estimate = sketch.get_estimate();
//! assert!(sketch.get_lower_bound(NumStdDev::Two) <= estimate);
//! assert!(sketch.get_upper_bound(NumStdDev::Two) >= estimate);
//!
//! let bytes = sketch.serialize();
//! let restored = CpcSketch::deserialize(&bytes).unwrap();
//! assert_eq!(restored.get_estimate(), estimate);
//! ```

use std::fmt;

mod confidence;
mod estimator;
mod pair_table;
mod serialization;
mod sketch;
mod union;

pub use self::sketch::CpcSketch;
pub use self::union::CpcUnion;

/// Default log2 of the number of rows.
pub const DEFAULT_LG_K: u8 = 11;
/// Minimum log2 of the number of rows.
pub const MIN_LG_K: u8 = 4;
/// Maximum log2 of the number of rows.
pub const MAX_LG_K: u8 = 26;

/// Representation of a CPC sketch, derived from its coupon count.
///
/// Flavors are ordered by density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flavor {
    Empty,
    Sparse,
    Hybrid,
    Pinned,
    Sliding,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flavor::Empty => "EMPTY",
            Flavor::Sparse => "SPARSE",
            Flavor::Hybrid => "HYBRID",
            Flavor::Pinned => "PINNED",
            Flavor::Sliding => "SLIDING",
        };
        f.write_str(name)
    }
}
