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

use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::eq;
use googletest::prelude::ge;
use googletest::prelude::le;
use googletest::prelude::near;
use synopses::common::NumStdDev;
use synopses::cpc::CpcSketch;
use synopses::cpc::CpcUnion;
use synopses::cpc::Flavor;
use synopses::error::ErrorKind;

fn sketch_of(lg_k: u8, range: std::ops::Range<u64>) -> CpcSketch {
    let mut sketch = CpcSketch::new(lg_k).unwrap();
    for i in range {
        sketch.update(i);
    }
    sketch
}

#[test]
fn test_empty_union() {
    let union = CpcUnion::new(11).unwrap();
    let result = union.get_result();
    assert!(result.is_empty());
    assert_that!(result.get_estimate(), eq(0.0));
}

#[test]
fn test_union_matches_single_sketch_coupons() {
    let n = 100_000;
    let lg_k = 10;
    let sk1 = sketch_of(lg_k, 0..n);
    let sk2 = sketch_of(lg_k, n..2 * n);
    let sk_dst = sketch_of(lg_k, 0..2 * n);

    let mut union = CpcUnion::new(lg_k).unwrap();
    union.update(&sk1).unwrap();
    union.update(&sk2).unwrap();
    let merged = union.get_result();

    assert!(merged.is_merged());
    assert_that!(merged.lg_k(), eq(lg_k));
    assert_that!(merged.num_coupons(), eq(sk_dst.num_coupons()));
    assert_that!(merged.flavor(), eq(sk_dst.flavor()));
    assert_that!(merged.get_estimate(), near(2e5, 2e5 * 0.1));
    assert_that!(merged.get_lower_bound(NumStdDev::Two), le(merged.get_estimate()));
    assert_that!(merged.get_upper_bound(NumStdDev::Two), ge(merged.get_estimate()));
}

#[test]
fn test_every_flavor_combination() {
    // counts chosen to land in SPARSE, HYBRID, PINNED and SLIDING at lg_k 10
    let sizes = [20u64, 300, 1_500, 20_000];
    for &a in &sizes {
        for &b in &sizes {
            let sk1 = sketch_of(10, 0..a);
            let sk2 = sketch_of(10, 1_000_000..1_000_000 + b);
            let mut expected = sk1.clone();
            for i in 1_000_000..1_000_000 + b {
                expected.update(i);
            }

            let mut union = CpcUnion::new(10).unwrap();
            union.update(&sk1).unwrap();
            union.update(&sk2).unwrap();
            let result = union.get_result();
            assert_that!(result.num_coupons(), eq(expected.num_coupons()));
            assert_that!(result.flavor(), eq(expected.flavor()));
        }
    }
}

#[test]
fn test_overlapping_union_estimate() {
    let sk1 = sketch_of(11, 0..30_000);
    let sk2 = sketch_of(11, 15_000..45_000);
    let mut union = CpcUnion::new(11).unwrap();
    union.update(&sk1).unwrap();
    union.update(&sk2).unwrap();
    assert_that!(union.get_result().get_estimate(), near(45_000.0, 45_000.0 * 0.06));
}

#[test]
fn test_union_is_idempotent() {
    let sk = sketch_of(11, 0..50_000);
    let copy = CpcSketch::deserialize(&sk.serialize()).unwrap();
    let mut union = CpcUnion::new(11).unwrap();
    union.update(&sk).unwrap();
    let once = union.get_result();
    union.update(&copy).unwrap();
    let twice = union.get_result();
    assert_that!(twice.num_coupons(), eq(once.num_coupons()));
    assert_that!(twice.get_estimate(), eq(once.get_estimate()));
}

#[test]
fn test_smaller_lg_k_reduces_union() {
    let big = sketch_of(12, 0..20_000);
    let small = sketch_of(9, 10_000..30_000);
    let mut union = CpcUnion::new(12).unwrap();
    union.update(&big).unwrap();
    union.update(&small).unwrap();
    assert_that!(union.lg_k(), eq(9));
    let result = union.get_result();
    assert_that!(result.lg_k(), eq(9));
    assert_that!(result.get_estimate(), near(30_000.0, 30_000.0 * 0.15));
}

#[test]
fn test_larger_lg_k_folds_into_union() {
    let big = sketch_of(12, 0..20_000);
    let mut union = CpcUnion::new(10).unwrap();
    union.update(&big).unwrap();
    assert_that!(union.lg_k(), eq(10));
    let result = union.get_result();
    assert_that!(result.flavor(), eq(Flavor::Sliding));
    assert_that!(result.get_estimate(), near(20_000.0, 20_000.0 * 0.1));
}

#[test]
fn test_seed_mismatch() {
    let mut union = CpcUnion::with_seed(10, 1).unwrap();
    let sketch = sketch_of(10, 0..10);
    let err = union.update(&sketch).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
}

#[test]
fn test_invalid_lg_k() {
    let err = CpcUnion::new(30).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::ConfigInvalid));
}

#[test]
fn test_summary() {
    let mut union = CpcUnion::new(10).unwrap();
    union.update(&sketch_of(10, 0..5_000)).unwrap();
    assert_that!(union.to_string(), contains_substring("bit matrix"));
}
