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

//! Item codecs for serializing frequent items sketches.

use std::str;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;

/// Serializer/deserializer for items stored in a frequency sketch.
pub trait ItemsSerde<T> {
    /// Serializes a slice of items to a byte buffer.
    fn serialize_items(&self, items: &[&T]) -> Vec<u8>;

    /// Deserializes `num_items` from bytes, returning items and bytes consumed.
    fn deserialize_items(&self, bytes: &[u8], num_items: usize) -> Result<(Vec<T>, usize), Error>;
}

/// UTF-8 strings, each prefixed by its byte length as a little-endian u32.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerde;

impl ItemsSerde<String> for StringSerde {
    fn serialize_items(&self, items: &[&String]) -> Vec<u8> {
        let size = items.iter().map(|item| 4 + item.len()).sum();
        let mut bytes = SketchBytes::with_capacity(size);
        for item in items {
            bytes.write_u32_le(item.len() as u32);
            bytes.write(item.as_bytes());
        }
        bytes.into_bytes()
    }

    fn deserialize_items(
        &self,
        bytes: &[u8],
        num_items: usize,
    ) -> Result<(Vec<String>, usize), Error> {
        let mut cursor = SketchSlice::new(bytes);
        let mut items = Vec::with_capacity(num_items.min(bytes.len() / 4));
        for _ in 0..num_items {
            let len = cursor
                .read_u32_le()
                .map_err(|_| Error::insufficient_data("item_length"))? as usize;
            if len > cursor.remaining() {
                return Err(Error::insufficient_data("item"));
            }
            let mut buf = vec![0u8; len];
            cursor
                .read_exact(&mut buf)
                .map_err(|_| Error::insufficient_data("item"))?;
            let item = String::from_utf8(buf).map_err(|err| {
                Error::deserial("invalid UTF-8 string payload").set_source(err)
            })?;
            items.push(item);
        }
        Ok((items, cursor.position()))
    }
}

/// `i64` items as little-endian 8-byte words.
#[derive(Debug, Default, Clone, Copy)]
pub struct I64Serde;

impl ItemsSerde<i64> for I64Serde {
    fn serialize_items(&self, items: &[&i64]) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(items.len() * 8);
        for &&item in items {
            bytes.write_i64_le(item);
        }
        bytes.into_bytes()
    }

    fn deserialize_items(&self, bytes: &[u8], num_items: usize) -> Result<(Vec<i64>, usize), Error> {
        let needed = num_items
            .checked_mul(8)
            .ok_or_else(|| Error::deserial("items size overflow"))?;
        if bytes.len() < needed {
            return Err(Error::insufficient_data("items"));
        }
        let mut cursor = SketchSlice::new(bytes);
        let mut items = Vec::with_capacity(num_items);
        for _ in 0..num_items {
            let item = cursor
                .read_i64_le()
                .map_err(|_| Error::insufficient_data("items"))?;
            items.push(item);
        }
        Ok((items, needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_string_items_layout() {
        let a = "ab".to_string();
        let b = String::new();
        let bytes = StringSerde.serialize_items(&[&a, &b]);
        assert_eq!(bytes, vec![2, 0, 0, 0, b'a', b'b', 0, 0, 0, 0]);

        let (items, consumed) = StringSerde.deserialize_items(&bytes, 2).unwrap();
        assert_eq!(items, vec![a, b]);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_string_items_errors() {
        let err = StringSerde.deserialize_items(&[5, 0, 0, 0, b'a'], 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);

        let err = StringSerde
            .deserialize_items(&[2, 0, 0, 0, 0xff, 0xfe], 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_i64_items() {
        let bytes = I64Serde.serialize_items(&[&-1, &2]);
        assert_eq!(bytes.len(), 16);
        let (items, consumed) = I64Serde.deserialize_items(&bytes, 2).unwrap();
        assert_eq!(items, vec![-1, 2]);
        assert_eq!(consumed, 16);
        assert!(I64Serde.deserialize_items(&bytes, 3).is_err());
    }
}
