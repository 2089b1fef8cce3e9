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

//! Constants of the CPC binary format.

pub(super) const SERIAL_VERSION: u8 = 1;

// bit positions within the flags byte
pub(super) const FLAG_COMPRESSED: u8 = 1;
pub(super) const FLAG_HAS_HIP: u8 = 2;
pub(super) const FLAG_HAS_TABLE: u8 = 3;
pub(super) const FLAG_HAS_WINDOW: u8 = 4;

/// Size of the fixed header, in 4-byte ints.
pub(super) const HEADER_INTS: u8 = 2;

pub(super) fn has_flag(flags: u8, flag: u8) -> bool {
    flags & (1 << flag) != 0
}

/// Preamble size in 4-byte ints: header, coupon count, table length, window offset and the
/// two HIP doubles, each only when present.
pub(super) fn make_preamble_ints(
    num_coupons: u32,
    has_hip: bool,
    has_table: bool,
    has_window: bool,
) -> u8 {
    let mut preamble_ints = HEADER_INTS;
    if num_coupons > 0 {
        preamble_ints += 1; // number of coupons
        if has_table {
            preamble_ints += 1; // number of table entries
        }
        if has_window {
            preamble_ints += 1; // window offset and padding
        }
        if has_hip {
            preamble_ints += 4; // kxp and HIP accumulator
        }
    }
    preamble_ints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_ints() {
        assert_eq!(make_preamble_ints(0, true, true, true), 2);
        assert_eq!(make_preamble_ints(10, true, true, false), 8);
        assert_eq!(make_preamble_ints(10, true, true, true), 9);
        assert_eq!(make_preamble_ints(10, false, true, true), 5);
    }

    #[test]
    fn test_flags_are_bit_positions() {
        let flags = (1 << FLAG_HAS_HIP) | (1 << FLAG_HAS_WINDOW);
        assert!(has_flag(flags, FLAG_HAS_HIP));
        assert!(has_flag(flags, FLAG_HAS_WINDOW));
        assert!(!has_flag(flags, FLAG_HAS_TABLE));
        assert!(!has_flag(flags, FLAG_COMPRESSED));
    }
}
