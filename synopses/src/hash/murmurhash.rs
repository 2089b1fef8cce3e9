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

use std::hash::Hasher;

use crate::hash::DEFAULT_UPDATE_SEED;

const C1: u64 = 0x87C37B91114253D5;
const C2: u64 = 0x4CF5AD432745937F;

/// MurmurHash3 x64 128-bit variant with a 64-bit seed.
///
/// Both hash lanes start from the seed, which makes the output identical to the reference
/// implementation for any seed that fits in 32 bits.
///
/// Unlike most [`Hasher`]s, every integer write is widened to a fixed-width little-endian word
/// (`u8..u64` and `usize` to eight bytes zero-extended, `i8..i64` and `isize` sign-extended), so
/// numerically equal integers of different widths hash identically.
#[derive(Debug, Clone)]
pub struct MurmurHash3X64128 {
    h1: u64,
    h2: u64,
    total_len: u64,
    buffer: [u8; 16],
    buffer_len: usize,
}

impl Default for MurmurHash3X64128 {
    fn default() -> Self {
        Self::with_seed(DEFAULT_UPDATE_SEED)
    }
}

impl MurmurHash3X64128 {
    pub fn with_seed(seed: u64) -> Self {
        MurmurHash3X64128 {
            h1: seed,
            h2: seed,
            total_len: 0,
            buffer: [0; 16],
            buffer_len: 0,
        }
    }

    /// Feeds raw bytes without any framing.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.total_len += bytes.len() as u64;

        let mut input = bytes;
        if self.buffer_len > 0 {
            let fill = (16 - self.buffer_len).min(input.len());
            self.buffer[self.buffer_len..self.buffer_len + fill].copy_from_slice(&input[..fill]);
            self.buffer_len += fill;
            input = &input[fill..];
            if self.buffer_len < 16 {
                return;
            }
            let block = self.buffer;
            self.update(&block);
            self.buffer_len = 0;
        }

        while input.len() >= 16 {
            let (block, rest) = input.split_at(16);
            self.update(block);
            input = rest;
        }

        self.buffer[..input.len()].copy_from_slice(input);
        self.buffer_len = input.len();
    }

    /// Returns both 64-bit halves of the hash.
    pub fn finish128(&self) -> (u64, u64) {
        let mut h1 = self.h1;
        let mut h2 = self.h2;

        let tail = &self.buffer[..self.buffer_len];
        if tail.len() > 8 {
            let mut k2 = 0u64;
            for (i, &b) in tail[8..].iter().enumerate() {
                k2 ^= (b as u64) << (i * 8);
            }
            h2 ^= mix_k2(k2);
        }
        if !tail.is_empty() {
            let mut k1 = 0u64;
            for (i, &b) in tail[..tail.len().min(8)].iter().enumerate() {
                k1 ^= (b as u64) << (i * 8);
            }
            h1 ^= mix_k1(k1);
        }

        h1 ^= self.total_len;
        h2 ^= self.total_len;
        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);
        h1 = fmix64(h1);
        h2 = fmix64(h2);
        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);
        (h1, h2)
    }

    #[inline]
    fn update(&mut self, block: &[u8]) {
        let k1 = super::read_u64_le(&block[0..8]);
        let k2 = super::read_u64_le(&block[8..16]);

        self.h1 ^= mix_k1(k1);
        self.h1 = self.h1.rotate_left(27);
        self.h1 = self.h1.wrapping_add(self.h2);
        self.h1 = self.h1.wrapping_mul(5).wrapping_add(0x52DCE729);

        self.h2 ^= mix_k2(k2);
        self.h2 = self.h2.rotate_left(31);
        self.h2 = self.h2.wrapping_add(self.h1);
        self.h2 = self.h2.wrapping_mul(5).wrapping_add(0x38495AB5);
    }
}

impl Hasher for MurmurHash3X64128 {
    fn finish(&self) -> u64 {
        self.finish128().0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.write_bytes(bytes);
    }

    fn write_u8(&mut self, i: u8) {
        self.write_u64(i as u64);
    }

    fn write_u16(&mut self, i: u16) {
        self.write_u64(i as u64);
    }

    fn write_u32(&mut self, i: u32) {
        self.write_u64(i as u64);
    }

    fn write_u64(&mut self, i: u64) {
        self.write_bytes(&i.to_le_bytes());
    }

    fn write_u128(&mut self, i: u128) {
        self.write_bytes(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_i8(&mut self, i: i8) {
        self.write_i64(i as i64);
    }

    fn write_i16(&mut self, i: i16) {
        self.write_i64(i as i64);
    }

    fn write_i32(&mut self, i: i32) {
        self.write_i64(i as i64);
    }

    fn write_i64(&mut self, i: i64) {
        self.write_bytes(&i.to_le_bytes());
    }

    fn write_i128(&mut self, i: i128) {
        self.write_bytes(&i.to_le_bytes());
    }

    fn write_isize(&mut self, i: isize) {
        self.write_i64(i as i64);
    }
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xFF51AFD7ED558CCD);
    k ^= k >> 33;
    k = k.wrapping_mul(0xC4CEB9FE1A85EC53);
    k ^= k >> 33;
    k
}
