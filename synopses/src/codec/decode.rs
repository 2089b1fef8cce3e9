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

use std::io;
use std::io::Cursor;
use std::io::Read;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

/// A cursor over serialized sketch bytes.
///
/// Every read fails with [`io::ErrorKind::UnexpectedEof`] instead of panicking when the input is
/// shorter than announced, so truncated payloads surface as errors.
pub(crate) struct SketchSlice<'a> {
    slice: Cursor<&'a [u8]>,
}

impl<'a> SketchSlice<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        SketchSlice {
            slice: Cursor::new(slice),
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.slice.position() as usize
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.slice.get_ref().len().saturating_sub(self.position())
    }

    /// Moves the cursor to an absolute offset, failing if it lies past the end.
    pub fn seek_to(&mut self, offset: usize) -> io::Result<()> {
        if offset > self.slice.get_ref().len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        self.slice.set_position(offset as u64);
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.slice.read_exact(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.slice.read_u8()
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        self.slice.read_u16::<LittleEndian>()
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.slice.read_u32::<LittleEndian>()
    }

    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        self.slice.read_u64::<LittleEndian>()
    }

    pub fn read_i64_le(&mut self) -> io::Result<i64> {
        self.slice.read_i64::<LittleEndian>()
    }

    pub fn read_f64_le(&mut self) -> io::Result<f64> {
        self.slice.read_f64::<LittleEndian>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let bytes = [1u8, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut slice = SketchSlice::new(&bytes);
        assert_eq!(slice.read_u8().unwrap(), 1);
        assert_eq!(slice.read_u16_le().unwrap(), 0x1234);
        assert_eq!(slice.read_u32_le().unwrap(), 0x12345678);
        assert_eq!(slice.remaining(), 0);
    }

    #[test]
    fn test_short_read_is_error() {
        let bytes = [1u8, 2, 3];
        let mut slice = SketchSlice::new(&bytes);
        assert!(slice.read_u32_le().is_err());
        assert!(slice.seek_to(4).is_err());
        assert!(slice.seek_to(3).is_ok());
    }
}
