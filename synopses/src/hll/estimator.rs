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

//! Cardinality estimators for HLL mode.
//!
//! While a sketch only sees its own stream, the HIP (historical inverse probability)
//! accumulator gives the lowest-variance estimate. Once registers are combined out of stream
//! order (a union merge), the HIP history is meaningless and the estimate falls back to
//! Ertl's improved raw estimator over the register histogram.

use std::f64::consts::LN_2;

use crate::common::INVERSE_POWERS_OF_2;
use crate::common::NumStdDev;

/// Number of value bits a register can record before the range is exhausted.
const Q: usize = 62;

/// HIP accumulator plus the running `Σ 2^-register` sums it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct HipEstimator {
    hip_accum: f64,
    /// Σ 2^-v over registers with v < 32
    kxq0: f64,
    /// Σ 2^-v over registers with v >= 32
    kxq1: f64,
    out_of_order: bool,
}

impl HipEstimator {
    pub fn new(lg_config_k: u8) -> Self {
        Self {
            hip_accum: 0.0,
            // every register starts at zero
            kxq0: (1u64 << lg_config_k) as f64,
            kxq1: 0.0,
            out_of_order: false,
        }
    }

    /// Rebuild the kxq sums from a full set of register values.
    pub fn from_registers(registers: impl Iterator<Item = u8>, hip_accum: f64, ooo: bool) -> Self {
        let mut kxq0 = 0.0;
        let mut kxq1 = 0.0;
        for v in registers {
            if v < 32 {
                kxq0 += INVERSE_POWERS_OF_2[v as usize];
            } else {
                kxq1 += INVERSE_POWERS_OF_2[v as usize];
            }
        }
        Self {
            hip_accum,
            kxq0,
            kxq1,
            out_of_order: ooo,
        }
    }

    /// Record a register increase from `old_value` to `new_value`.
    ///
    /// Must be called before the register itself changes, the HIP increment uses the
    /// probability of the state the update was drawn from.
    pub fn update(&mut self, lg_config_k: u8, old_value: u8, new_value: u8) {
        let k = (1u64 << lg_config_k) as f64;
        if !self.out_of_order {
            self.hip_accum += k / (self.kxq0 + self.kxq1);
        }

        if old_value < 32 {
            self.kxq0 -= INVERSE_POWERS_OF_2[old_value as usize];
        } else {
            self.kxq1 -= INVERSE_POWERS_OF_2[old_value as usize];
        }
        if new_value < 32 {
            self.kxq0 += INVERSE_POWERS_OF_2[new_value as usize];
        } else {
            self.kxq1 += INVERSE_POWERS_OF_2[new_value as usize];
        }
    }

    /// Estimate from the HIP accumulator, or from `registers` once out of order.
    ///
    /// `registers` is only consumed in the out-of-order case.
    pub fn estimate(&self, lg_config_k: u8, registers: impl Iterator<Item = u8>) -> f64 {
        if self.out_of_order {
            improved_estimate(lg_config_k, registers)
        } else {
            self.hip_accum
        }
    }

    pub fn lower_bound(
        &self,
        lg_config_k: u8,
        estimate: f64,
        num_non_zero: u32,
        num_std_dev: NumStdDev,
    ) -> f64 {
        let rel_err = get_rel_err(false, self.out_of_order, lg_config_k, num_std_dev);
        (estimate / (1.0 + rel_err)).max(num_non_zero as f64)
    }

    pub fn upper_bound(&self, lg_config_k: u8, estimate: f64, num_std_dev: NumStdDev) -> f64 {
        let rel_err = get_rel_err(true, self.out_of_order, lg_config_k, num_std_dev);
        estimate / (1.0 + rel_err)
    }

    pub fn hip_accum(&self) -> f64 {
        self.hip_accum
    }

    pub fn kxq0(&self) -> f64 {
        self.kxq0
    }

    pub fn kxq1(&self) -> f64 {
        self.kxq1
    }

    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    /// Mark the registers as merged out of stream order.
    ///
    /// The accumulator keeps its last value so a serialized sketch restores exactly.
    pub fn set_out_of_order(&mut self, ooo: bool) {
        self.out_of_order = ooo;
    }

    pub fn set_hip_accum(&mut self, value: f64) {
        self.hip_accum = value;
    }

    pub fn set_kxq(&mut self, kxq0: f64, kxq1: f64) {
        self.kxq0 = kxq0;
        self.kxq1 = kxq1;
    }
}

/// Ertl's improved raw estimator over the register histogram.
fn improved_estimate(lg_config_k: u8, registers: impl Iterator<Item = u8>) -> f64 {
    let m = (1u64 << lg_config_k) as f64;
    let mut histogram = [0u32; Q + 2];
    for v in registers {
        histogram[(v as usize).min(Q + 1)] += 1;
    }
    if histogram[0] as f64 == m {
        return 0.0;
    }

    let mut z = m * tau(1.0 - histogram[Q + 1] as f64 / m);
    for count in histogram[1..=Q].iter().rev() {
        z = 0.5 * (z + *count as f64);
    }
    z += m * sigma(histogram[0] as f64 / m);
    m * m / (2.0 * LN_2) / z
}

fn sigma(mut x: f64) -> f64 {
    if x == 1.0 {
        return f64::INFINITY;
    }
    let mut y = 1.0;
    let mut z = x;
    loop {
        x *= x;
        let z_old = z;
        z += x * y;
        y += y;
        if z == z_old {
            return z;
        }
    }
}

fn tau(mut x: f64) -> f64 {
    if x == 0.0 || x == 1.0 {
        return 0.0;
    }
    let mut y = 1.0;
    let mut z = 1.0 - x;
    loop {
        x = x.sqrt();
        let z_old = z;
        y *= 0.5;
        z -= (1.0 - x).powi(2) * y;
        if z == z_old {
            return z / 3.0;
        }
    }
}

const HLL_HIP_RSE_FACTOR: f64 = 0.8325546; // sqrt(ln 2)
const HLL_NON_HIP_RSE_FACTOR: f64 = 1.03896; // sqrt(3 ln 2 - 1)

/// Relative error of an HLL estimate at the given confidence.
///
/// Positive for lower bounds, negative for upper bounds, so that `estimate / (1 + rel_err)`
/// is the bound in both cases.
pub fn get_rel_err(upper_bound: bool, unioned: bool, lg_config_k: u8, num_std_dev: NumStdDev) -> f64 {
    if lg_config_k > 12 {
        let rse_factor = if unioned {
            HLL_NON_HIP_RSE_FACTOR
        } else {
            HLL_HIP_RSE_FACTOR
        };
        let k = (1u64 << lg_config_k) as f64;
        let sign = if upper_bound { -1.0 } else { 1.0 };
        return sign * num_std_dev.as_f64() * rse_factor / k.sqrt();
    }

    let idx = (lg_config_k.max(4) as usize - 4) * 3 + (num_std_dev.as_u8() as usize - 1);
    match (unioned, upper_bound) {
        (false, false) => HIP_LB[idx],
        (false, true) => HIP_UB[idx],
        (true, false) => NON_HIP_LB[idx],
        (true, true) => NON_HIP_UB[idx],
    }
}

// Empirical quantiles Q(.84134), Q(.97725), Q(.99865) per lg_k in 4..=12.
#[rustfmt::skip]
const HIP_LB: [f64; 27] = [
    0.207316195, 0.502865572, 0.882303765, // 4
    0.146981579, 0.335426881, 0.557052,    // 5
    0.104026721, 0.227683872, 0.365888317, // 6
    0.073614601, 0.156781585, 0.245740374, // 7
    0.05205248,  0.108783763, 0.168030442, // 8
    0.036770852, 0.075727545, 0.11593785,  // 9
    0.025990219, 0.053145536, 0.080772263, // 10
    0.018373987, 0.037266176, 0.056271814, // 11
    0.012936253, 0.02613829,  0.039387631, // 12
];

// Q(.15866), Q(.02275), Q(.00135)
#[rustfmt::skip]
const HIP_UB: [f64; 27] = [
    -0.207805347, -0.355574279, -0.475535095, // 4
    -0.146988328, -0.262390832, -0.360864026, // 5
    -0.103877775, -0.191503663, -0.269311582, // 6
    -0.073452978, -0.138513438, -0.198487447, // 7
    -0.051982806, -0.099703123, -0.144128618, // 8
    -0.036768609, -0.07138158,  -0.104430324, // 9
    -0.025991325, -0.050854296, -0.0748143,   // 10
    -0.01834533,  -0.036121138, -0.05327616,  // 11
    -0.012920332, -0.025572893, -0.037896952, // 12
];

#[rustfmt::skip]
const NON_HIP_LB: [f64; 27] = [
    0.254409839, 0.682266712, 1.304022158, // 4
    0.181817353, 0.443389054, 0.778776219, // 5
    0.129432281, 0.295782195, 0.49252279,  // 6
    0.091640655, 0.201175925, 0.323664385, // 7
    0.064858051, 0.138523393, 0.218805328, // 8
    0.045851855, 0.095925072, 0.148635751, // 9
    0.032454144, 0.067009668, 0.102660669, // 10
    0.022921382, 0.046868565, 0.071307398, // 11
    0.016155679, 0.032825719, 0.049677541, // 12
];

#[rustfmt::skip]
const NON_HIP_UB: [f64; 27] = [
    -0.256980172, -0.411905944, -0.52651057,  // 4
    -0.182332109, -0.310275547, -0.412660505, // 5
    -0.129314228, -0.230142294, -0.315636197, // 6
    -0.091584836, -0.16834013,  -0.236346847, // 7
    -0.06487411,  -0.122045231, -0.174112107, // 8
    -0.04591465,  -0.08784505,  -0.126917615, // 9
    -0.032433119, -0.062897613, -0.091862929, // 10
    -0.022960633, -0.044875401, -0.065736049, // 11
    -0.016186662, -0.031827816, -0.046973459, // 12
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_initialization() {
        let est = HipEstimator::new(10);
        assert_eq!(est.hip_accum(), 0.0);
        assert_eq!(est.kxq0(), 1024.0);
        assert_eq!(est.kxq1(), 0.0);
        assert!(!est.is_out_of_order());
    }

    #[test]
    fn test_update_moves_kxq() {
        let mut est = HipEstimator::new(4);
        est.update(4, 0, 1);
        assert_eq!(est.hip_accum(), 1.0);
        assert_eq!(est.kxq0(), 15.5);

        est.update(4, 1, 40);
        assert_eq!(est.kxq0(), 15.0);
        assert!(est.kxq1() > 0.0);
    }

    #[test]
    fn test_out_of_order_freezes_hip() {
        let mut est = HipEstimator::new(4);
        est.update(4, 0, 2);
        let hip = est.hip_accum();
        est.set_out_of_order(true);
        est.update(4, 0, 3);
        assert_eq!(est.hip_accum(), hip);
    }

    #[test]
    fn test_improved_estimate_empty_and_small() {
        assert_eq!(improved_estimate(8, std::iter::repeat_n(0, 256)), 0.0);

        // a single register at 1 is one item seen
        let registers = std::iter::once(1).chain(std::iter::repeat_n(0, 255));
        let est = improved_estimate(8, registers);
        assert!((est - 1.0).abs() < 0.05, "{est}");
    }

    #[test]
    fn test_rel_err_sign_and_table() {
        assert!(get_rel_err(false, false, 10, NumStdDev::Two) > 0.0);
        assert!(get_rel_err(true, true, 10, NumStdDev::Two) < 0.0);
        assert_eq!(get_rel_err(false, false, 4, NumStdDev::One), 0.207316195);

        let expected = 3.0 * HLL_NON_HIP_RSE_FACTOR / 128.0;
        assert_eq!(get_rel_err(false, true, 14, NumStdDev::Three), expected);
    }
}
