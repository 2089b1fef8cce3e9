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

//! Union of CPC sketches.
//!
//! While every operand is sparse the union accumulates into a sparse working sketch. The
//! first denser operand switches it to a bit matrix holding one 64-bit word per row.

use std::fmt;

use log::debug;

use crate::cpc::CpcSketch;
use crate::cpc::Flavor;
use crate::cpc::sketch::check_lg_k;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;

#[derive(Debug, Clone)]
enum Accumulator {
    Sparse(CpcSketch),
    Matrix(Vec<u64>),
}

/// A union of [`CpcSketch`]es.
///
/// # Examples
///
/// ```
/// # use synopses::cpc::{CpcSketch, CpcUnion};
/// let mut a = CpcSketch::new(10).unwrap();
/// let mut b = CpcSketch::new(10).unwrap();
/// for i in 0..100 {
///     a.update(i);
///     b.update(i + 50);
/// }
/// let mut union = CpcUnion::new(10).unwrap();
/// union.update(&a).unwrap();
/// union.update(&b).unwrap();
/// let estimate = union.get_result().get_estimate();
/// assert!((estimate - 150.0).abs() < 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct CpcUnion {
    lg_k: u8,
    seed: u64,
    accumulator: Accumulator,
}

impl CpcUnion {
    /// Creates an empty union with the default seed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) unless `lg_k` is in
    /// `[4, 26]`.
    pub fn new(lg_k: u8) -> Result<Self, Error> {
        Self::with_seed(lg_k, DEFAULT_UPDATE_SEED)
    }

    pub fn with_seed(lg_k: u8, seed: u64) -> Result<Self, Error> {
        check_lg_k(lg_k)?;
        Ok(Self {
            lg_k,
            seed,
            accumulator: Accumulator::Sparse(CpcSketch::with_seed(lg_k, seed)?),
        })
    }

    /// Current lg_k of the union; merging a sketch with a smaller lg_k reduces it.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Merges `sketch` into the union.
    ///
    /// # Errors
    ///
    /// Returns [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) if the sketch was built
    /// with a different seed. The union is left untouched.
    pub fn update(&mut self, sketch: &CpcSketch) -> Result<(), Error> {
        if sketch.seed() != self.seed {
            return Err(Error::seed_mismatch(
                compute_seed_hash(self.seed),
                compute_seed_hash(sketch.seed()),
            ));
        }
        if sketch.is_empty() {
            return Ok(());
        }
        if sketch.lg_k() < self.lg_k {
            self.reduce_k(sketch.lg_k());
        }

        let mask = (1u32 << self.lg_k) - 1;
        let flavor = sketch.flavor();
        if flavor == Flavor::Sparse {
            if let Accumulator::Sparse(acc) = &mut self.accumulator {
                for row_col in sketch.surprising_pairs() {
                    let row = (row_col >> 6) & mask;
                    acc.row_col_update((row << 6) | (row_col & 63));
                }
                if acc.flavor() > Flavor::Sparse {
                    debug!(
                        "CPC union switched to bit matrix at {} coupons",
                        acc.num_coupons()
                    );
                    self.accumulator = Accumulator::Matrix(acc.build_bit_matrix());
                }
                return Ok(());
            }
        }

        let matrix = self.matrix_mut();
        match flavor {
            Flavor::Empty => {}
            Flavor::Sparse => {
                for row_col in sketch.surprising_pairs() {
                    let row = ((row_col >> 6) & mask) as usize;
                    matrix[row] |= 1 << (row_col & 63);
                }
            }
            Flavor::Hybrid | Flavor::Pinned => {
                // offset is zero, so the table only holds surprising ones
                debug_assert_eq!(sketch.window_offset(), 0);
                for (row, &bits) in sketch.window().iter().enumerate() {
                    matrix[row & mask as usize] |= bits as u64;
                }
                for row_col in sketch.surprising_pairs() {
                    let row = ((row_col >> 6) & mask) as usize;
                    matrix[row] |= 1 << (row_col & 63);
                }
            }
            Flavor::Sliding => {
                for (row, bits) in sketch.build_bit_matrix().into_iter().enumerate() {
                    matrix[row & mask as usize] |= bits;
                }
            }
        }
        Ok(())
    }

    /// Returns a sketch holding every coupon merged so far.
    ///
    /// The result always estimates with ICON, since HIP history does not survive a merge.
    pub fn get_result(&self) -> CpcSketch {
        match &self.accumulator {
            Accumulator::Sparse(acc) => acc.clone().into_merged(),
            Accumulator::Matrix(matrix) => {
                CpcSketch::from_bit_matrix(self.lg_k, self.seed, matrix)
            }
        }
    }

    fn matrix_mut(&mut self) -> &mut Vec<u64> {
        if let Accumulator::Sparse(acc) = &self.accumulator {
            debug!(
                "CPC union switched to bit matrix at {} coupons",
                acc.num_coupons()
            );
            self.accumulator = Accumulator::Matrix(acc.build_bit_matrix());
        }
        match &mut self.accumulator {
            Accumulator::Matrix(matrix) => matrix,
            Accumulator::Sparse(_) => unreachable!("accumulator was just converted"),
        }
    }

    fn reduce_k(&mut self, new_lg_k: u8) {
        debug!("CPC union reduced lg_k from {} to {new_lg_k}", self.lg_k);
        self.accumulator = match &self.accumulator {
            Accumulator::Sparse(acc) if acc.is_empty() => {
                Accumulator::Sparse(CpcSketch::empty(new_lg_k, self.seed))
            }
            Accumulator::Sparse(acc) => {
                Accumulator::Matrix(fold_rows(&acc.build_bit_matrix(), new_lg_k))
            }
            Accumulator::Matrix(matrix) => Accumulator::Matrix(fold_rows(matrix, new_lg_k)),
        };
        self.lg_k = new_lg_k;
    }
}

fn fold_rows(matrix: &[u64], new_lg_k: u8) -> Vec<u64> {
    let mask = (1usize << new_lg_k) - 1;
    let mut folded = vec![0u64; mask + 1];
    for (row, &bits) in matrix.iter().enumerate() {
        folded[row & mask] |= bits;
    }
    folded
}

impl fmt::Display for CpcUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (state, num_coupons) = match &self.accumulator {
            Accumulator::Sparse(acc) => ("sparse sketch", acc.num_coupons()),
            Accumulator::Matrix(matrix) => (
                "bit matrix",
                matrix.iter().map(|row| row.count_ones()).sum::<u32>(),
            ),
        };
        writeln!(f, "### CPC union summary:")?;
        writeln!(f, "   lg_k           : {}", self.lg_k)?;
        writeln!(f, "   seed hash      : {:x}", compute_seed_hash(self.seed))?;
        writeln!(f, "   accumulator    : {state}")?;
        writeln!(f, "   C              : {num_coupons}")?;
        writeln!(f, "### End union summary")
    }
}
