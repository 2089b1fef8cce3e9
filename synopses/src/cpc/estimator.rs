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

//! ICON (inter-column optimal) estimator, used once a sketch is the result of a merge.
//!
//! The estimate is the `n` whose expected coupon count matches the observed one: each of
//! the K rows independently collects column `j` with probability `q_j = 2^-(j+1)` per item
//! (column 63 absorbs the tail, `q_63 = 2^-63`).

use crate::common::INVERSE_POWERS_OF_2;

const MAX_BISECTION_STEPS: usize = 200;

/// Expected number of coupons after `n` distinct items.
fn expected_coupons(k: f64, n: f64) -> f64 {
    (0..64)
        .map(|col| {
            let q = if col == 63 {
                INVERSE_POWERS_OF_2[63]
            } else {
                INVERSE_POWERS_OF_2[col + 1]
            };
            // k * (1 - (1 - q/k)^n), kept accurate for tiny q/k
            -k * (n * (-q / k).ln_1p()).exp_m1()
        })
        .sum()
}

pub(super) fn icon_estimate(lg_k: u8, num_coupons: u32) -> f64 {
    if num_coupons == 0 {
        return 0.0;
    }
    let k = (1u64 << lg_k) as f64;
    let c = num_coupons as f64;
    if c >= 64.0 * k {
        return f64::INFINITY;
    }

    // every item yields at most one coupon, so the answer is at least c
    let mut lo = c;
    let mut hi = 2.0 * c;
    while expected_coupons(k, hi) < c {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return hi;
        }
    }

    for _ in 0..MAX_BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if expected_coupons(k, mid) < c {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_counts_are_nearly_exact() {
        assert_eq!(icon_estimate(10, 0), 0.0);
        let est = icon_estimate(10, 1);
        assert!((est - 1.0).abs() < 1e-3, "{est}");
        let est = icon_estimate(10, 50);
        assert!(est >= 50.0 && est < 51.5, "{est}");
    }

    #[test]
    fn test_monotone_in_coupons() {
        let mut prev = 0.0;
        for c in (100..20_000).step_by(997) {
            let est = icon_estimate(11, c);
            assert!(est > prev);
            prev = est;
        }
    }

    #[test]
    fn test_inverts_expectation() {
        let k = 2048.0;
        let n = 123_456.0;
        let c = expected_coupons(k, n).round() as u32;
        let est = icon_estimate(11, c);
        assert!((est - n).abs() / n < 0.01, "{est}");
    }
}
