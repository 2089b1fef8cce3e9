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
use std::hash::Hash;
use std::hash::Hasher;

use crate::common::canonical_double;
use crate::error::Error;

/// A dynamically typed value handed to the batch update APIs.
///
/// Integers, doubles and strings hash exactly like the corresponding typed `update` calls, so
/// `update_batch(&[Datum::Int(7)])` and `update(7i64)` have the same effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// A 64-bit signed integer.
    Int(i64),
    /// A double, hashed through [`canonical_double`].
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// A nested sequence. Sketches only accept flat input, so a batch containing one is rejected.
    Seq(Vec<Datum>),
}

impl Datum {
    /// Nesting depth of this value: scalars are 0, a flat sequence is 1.
    fn depth(&self) -> usize {
        match self {
            Datum::Seq(items) => 1 + items.iter().map(Datum::depth).max().unwrap_or(0),
            _ => 0,
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Datum::Int(v) => v.hash(state),
            Datum::Float(v) => canonical_double(*v).hash(state),
            Datum::Str(s) => s.as_str().hash(state),
            Datum::Seq(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Str(s) => f.write_str(s),
            Datum::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Int(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Float(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Str(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::Str(value)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(value: Vec<T>) -> Self {
        Datum::Seq(value.into_iter().map(Into::into).collect())
    }
}

/// Rejects a batch whose elements are themselves sequences.
pub(crate) fn ensure_one_dimensional(items: &[Datum]) -> Result<(), Error> {
    let depth = 1 + items.iter().map(Datum::depth).max().unwrap_or(0);
    if depth == 1 {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "input data must have only one dimension. Found: {depth}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hash::MurmurHash3X64128;

    fn hash_of<T: Hash>(value: T) -> (u64, u64) {
        let mut hasher = MurmurHash3X64128::default();
        value.hash(&mut hasher);
        hasher.finish128()
    }

    #[test]
    fn test_datum_hashes_like_typed_values() {
        assert_eq!(hash_of(Datum::Int(-3)), hash_of(-3i64));
        assert_eq!(hash_of(Datum::from("abc")), hash_of("abc"));
        assert_eq!(hash_of(Datum::Float(-0.0)), hash_of(canonical_double(0.0)));
    }

    #[test]
    fn test_ensure_one_dimensional() {
        let flat = vec![Datum::Int(1), Datum::from("x"), Datum::Float(2.5)];
        assert!(ensure_one_dimensional(&flat).is_ok());
        assert!(ensure_one_dimensional(&[]).is_ok());

        let nested = vec![Datum::Int(1), Datum::from(vec![1i64, 2])];
        let err = ensure_one_dimensional(&nested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.message().contains("Found: 2"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Datum::from(vec![1i64, 2]).to_string(), "[1, 2]");
        assert_eq!(Datum::Float(0.5).to_string(), "0.5");
    }
}
