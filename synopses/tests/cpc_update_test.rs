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
use synopses::common::Datum;
use synopses::common::NumStdDev;
use synopses::cpc::CpcSketch;
use synopses::cpc::Flavor;
use synopses::error::ErrorKind;

const RELATIVE_ERROR_FOR_LG_K_11: f64 = 0.02;

#[test]
fn test_empty() {
    let sketch = CpcSketch::new(11).unwrap();
    assert!(sketch.is_empty());
    assert_that!(sketch.flavor(), eq(Flavor::Empty));
    assert_that!(sketch.get_estimate(), eq(0.0));
    assert_that!(sketch.get_lower_bound(NumStdDev::One), eq(0.0));
    assert_that!(sketch.get_upper_bound(NumStdDev::One), eq(0.0));
}

#[test]
fn test_default() {
    let sketch = CpcSketch::default();
    assert_that!(sketch.lg_k(), eq(11));
    assert!(sketch.is_empty());
}

#[test]
fn test_one_value() {
    let mut sketch = CpcSketch::new(11).unwrap();
    sketch.update(1);
    assert!(!sketch.is_empty());
    assert_that!(sketch.get_estimate(), eq(1.0));
    assert_that!(
        sketch.get_estimate(),
        ge(sketch.get_lower_bound(NumStdDev::One))
    );
    assert_that!(
        sketch.get_estimate(),
        le(sketch.get_upper_bound(NumStdDev::One))
    );
}

#[test]
fn test_many_values() {
    let _ = env_logger::builder().is_test(true).try_init();
    const N: usize = 10000;
    const N_F64: f64 = N as f64;

    let mut sketch = CpcSketch::new(11).unwrap();
    for i in 0..N {
        sketch.update(i);
    }
    assert!(!sketch.is_empty());
    assert_that!(sketch.flavor(), eq(Flavor::Sliding));
    assert_that!(
        sketch.get_estimate(),
        near(N_F64, RELATIVE_ERROR_FOR_LG_K_11 * N_F64)
    );
    assert_that!(
        sketch.get_estimate(),
        ge(sketch.get_lower_bound(NumStdDev::One))
    );
    assert_that!(
        sketch.get_estimate(),
        le(sketch.get_upper_bound(NumStdDev::One))
    );
}

#[test]
fn test_flavor_progression() {
    // K = 256: SPARSE below 24 coupons, HYBRID below 128, PINNED below 864
    let mut sketch = CpcSketch::new(8).unwrap();
    let mut seen = vec![sketch.flavor()];
    for i in 0..5_000u64 {
        sketch.update(i);
        let flavor = sketch.flavor();
        if seen.last() != Some(&flavor) {
            seen.push(flavor);
        }
    }
    assert_that!(
        seen,
        eq(&vec![
            Flavor::Empty,
            Flavor::Sparse,
            Flavor::Hybrid,
            Flavor::Pinned,
            Flavor::Sliding
        ])
    );
}

#[test]
fn test_duplicates_do_not_count() {
    let mut sketch = CpcSketch::new(10).unwrap();
    for i in 0..1_000 {
        sketch.update(i);
    }
    let coupons = sketch.num_coupons();
    let estimate = sketch.get_estimate();
    for i in 0..1_000 {
        sketch.update(i);
    }
    assert_that!(sketch.num_coupons(), eq(coupons));
    assert_that!(sketch.get_estimate(), eq(estimate));
}

#[test]
fn test_numeric_and_batch_updates() {
    let mut a = CpcSketch::new(10).unwrap();
    let mut b = CpcSketch::new(10).unwrap();
    a.update_f64(-0.0);
    b.update_f32(0.0);
    assert_that!(a.serialize(), eq(&b.serialize()));

    let mut batch = CpcSketch::new(10).unwrap();
    let mut single = CpcSketch::new(10).unwrap();
    batch
        .update_batch(&[Datum::Int(1), Datum::Float(2.5), Datum::from("three")])
        .unwrap();
    single.update(1i64);
    single.update_f64(2.5);
    single.update("three");
    assert_that!(batch.serialize(), eq(&single.serialize()));

    let err = batch
        .update_batch(&[Datum::from(vec![1i64, 2])])
        .unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidInput));
}

#[test]
fn test_invalid_lg_k() {
    for lg_k in [0, 3, 27] {
        let err = CpcSketch::new(lg_k).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::ConfigInvalid));
    }
}

#[test]
fn test_summary() {
    let mut sketch = CpcSketch::new(10).unwrap();
    for i in 0..200 {
        sketch.update(i);
    }
    let summary = sketch.to_string();
    assert_that!(summary, contains_substring("### CPC sketch summary:"));
    assert_that!(summary, contains_substring("HYBRID"));
}
