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

//! Helpers shared by the sketch families.

mod datum;

use std::fmt;

pub use self::datum::Datum;
pub(crate) use self::datum::ensure_one_dimensional;

use crate::error::Error;

/// Number of standard deviations for confidence bounds.
///
/// Higher values give wider intervals with greater certainty that the true cardinality lies
/// within the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumStdDev {
    /// One standard deviation (\~68% confidence interval)
    One = 1,
    /// Two standard deviations (\~95% confidence interval)
    Two = 2,
    /// Three standard deviations (\~99.7% confidence interval)
    Three = 3,
}

impl NumStdDev {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn as_f64(self) -> f64 {
        self as u8 as f64
    }
}

impl TryFrom<u8> for NumStdDev {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NumStdDev::One),
            2 => Ok(NumStdDev::Two),
            3 => Ok(NumStdDev::Three),
            _ => Err(Error::invalid_input(format!(
                "number of standard deviations must be 1, 2 or 3, got {value}"
            ))),
        }
    }
}

impl fmt::Display for NumStdDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Canonical bit pattern of NaN used for hashing.
const CANONICAL_NAN_BITS: i64 = 0x7FF8_0000_0000_0000;

/// Maps a double to the 64-bit word that is hashed for it.
///
/// `-0.0` and `0.0` share a word, as do all NaN payloads.
pub fn canonical_double(value: f64) -> i64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        CANONICAL_NAN_BITS
    } else {
        value.to_bits() as i64
    }
}

/// `INVERSE_POWERS_OF_2[i] == 2^-i`
pub(crate) const INVERSE_POWERS_OF_2: [f64; 66] = {
    let mut table = [0.0; 66];
    let mut value = 1.0;
    let mut i = 0;
    while i < table.len() {
        table[i] = value;
        value /= 2.0;
        i += 1;
    }
    table
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_canonical_double() {
        assert_eq!(canonical_double(-0.0), canonical_double(0.0));
        assert_eq!(canonical_double(f64::NAN), canonical_double(-f64::NAN));
        assert_eq!(canonical_double(1.5), 1.5f64.to_bits() as i64);
        assert_ne!(canonical_double(1.5), canonical_double(-1.5));
    }

    #[test]
    fn test_inverse_powers_of_two() {
        assert_eq!(INVERSE_POWERS_OF_2[0], 1.0);
        assert_eq!(INVERSE_POWERS_OF_2[1], 0.5);
        assert_eq!(INVERSE_POWERS_OF_2[64], 1.0 / 18446744073709551616.0);
    }

    #[test]
    fn test_num_std_dev_from_u8() {
        assert_eq!(NumStdDev::try_from(2).unwrap(), NumStdDev::Two);
        let err = NumStdDev::try_from(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
