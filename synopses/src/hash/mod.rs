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

//! Seeded hashing shared by every sketch.
//!
//! All sketches hash their input with [`MurmurHash3X64128`]. The hasher feeds integers as
//! fixed-width little-endian words, so a given value hashes to the same 128 bits on every
//! platform. Floating point values should go through [`canonical_double`] first so that `-0.0`
//! and `0.0`, or two NaN payloads, land on the same hash.
//!
//! [`canonical_double`]: crate::common::canonical_double

mod murmurhash;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

pub use self::murmurhash::MurmurHash3X64128;

/// The seed used by every sketch unless another one is configured.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Computes the 16-bit fingerprint of a seed that is stored in serialized sketches.
///
/// Two sketches can only be combined if they were built with the same seed; the fingerprint
/// lets a deserializer reject foreign bytes without storing the seed itself.
pub fn compute_seed_hash(seed: u64) -> u16 {
    let mut hasher = MurmurHash3X64128::with_seed(0);
    hasher.write_bytes(&seed.to_le_bytes());
    let (h1, _) = hasher.finish128();
    (h1 & 0xFFFF) as u16
}

#[inline]
fn read_u64_le(bytes: &[u8]) -> u64 {
    LittleEndian::read_u64(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_hash_is_stable() {
        assert_eq!(compute_seed_hash(9001), compute_seed_hash(DEFAULT_UPDATE_SEED));
        assert_ne!(compute_seed_hash(9001), compute_seed_hash(9002));
    }
}
