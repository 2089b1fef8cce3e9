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
use synopses::error::ErrorKind;
use synopses::hll::HllMode;
use synopses::hll::HllSketch;
use synopses::hll::HllType;

const ALL_TYPES: [HllType; 3] = [HllType::Hll4, HllType::Hll6, HllType::Hll8];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_empty() {
    for hll_type in ALL_TYPES {
        let sketch = HllSketch::new(12, hll_type).unwrap();
        assert!(sketch.is_empty());
        assert_that!(sketch.current_mode(), eq(HllMode::List));
        assert_that!(sketch.get_estimate(), eq(0.0));
        assert_that!(sketch.get_lower_bound(NumStdDev::One), eq(0.0));
        assert_that!(sketch.get_upper_bound(NumStdDev::One), eq(0.0));
    }
}

#[test]
fn test_ten_thousand_distinct_within_five_percent() {
    init_logger();
    for hll_type in ALL_TYPES {
        let mut sketch = HllSketch::new(12, hll_type).unwrap();
        for i in 0..10_000u64 {
            sketch.update(i);
        }
        assert_that!(sketch.current_mode(), eq(HllMode::Hll));
        assert_that!(sketch.get_estimate(), near(10_000.0, 500.0));
        assert_that!(
            sketch.get_lower_bound(NumStdDev::Two),
            le(sketch.get_estimate())
        );
        assert_that!(
            sketch.get_upper_bound(NumStdDev::Two),
            ge(sketch.get_estimate())
        );
    }
}

#[test]
fn test_mode_promotions() {
    init_logger();
    // lg_k 10: LIST holds 8 coupons, SET promotes to HLL at 3/4 of 128 slots
    let mut sketch = HllSketch::new(10, HllType::Hll8).unwrap();
    for i in 0..7 {
        sketch.update(i);
    }
    assert_that!(sketch.current_mode(), eq(HllMode::List));
    assert_that!(sketch.get_estimate(), near(7.0, 0.01));

    for i in 7..50 {
        sketch.update(i);
    }
    assert_that!(sketch.current_mode(), eq(HllMode::Set));
    assert_that!(sketch.get_estimate(), near(50.0, 1.0));

    for i in 50..1_000 {
        sketch.update(i);
    }
    assert_that!(sketch.current_mode(), eq(HllMode::Hll));
    assert_that!(sketch.get_estimate(), near(1_000.0, 100.0));
    assert!(!sketch.is_out_of_order());
}

#[test]
fn test_duplicates_do_not_count() {
    let mut sketch = HllSketch::new(11, HllType::Hll4).unwrap();
    for _ in 0..5 {
        for i in 0..2_000 {
            sketch.update(i);
        }
    }
    assert_that!(sketch.get_estimate(), near(2_000.0, 200.0));
}

#[test]
fn test_types_agree() {
    let mut sketches: Vec<HllSketch> = ALL_TYPES
        .iter()
        .map(|&hll_type| HllSketch::new(8, hll_type).unwrap())
        .collect();
    // large n drives HLL_4 registers into the aux table
    for i in 0..200_000u64 {
        for sketch in &mut sketches {
            sketch.update(i);
        }
    }
    let estimate = sketches[0].get_estimate();
    for sketch in &sketches[1..] {
        assert_that!(sketch.get_estimate(), near(estimate, 1e-6 * estimate));
    }
}

#[test]
fn test_numeric_canonicalization() {
    let mut a = HllSketch::new(12, HllType::Hll8).unwrap();
    let mut b = HllSketch::new(12, HllType::Hll8).unwrap();
    a.update_f64(0.0);
    a.update_f64(f64::NAN);
    b.update_f64(-0.0);
    b.update_f32(f32::NAN);
    assert_that!(a.serialize(), eq(&b.serialize()));

    let mut c = HllSketch::new(12, HllType::Hll8).unwrap();
    let mut d = HllSketch::new(12, HllType::Hll8).unwrap();
    c.update(7i32);
    d.update(7i64);
    assert_that!(c.get_estimate(), eq(d.get_estimate()));
    assert_that!(c.serialize(), eq(&d.serialize()));
}

#[test]
fn test_update_batch() {
    let mut batch = HllSketch::new(12, HllType::Hll6).unwrap();
    let mut single = HllSketch::new(12, HllType::Hll6).unwrap();
    let data: Vec<Datum> = (0..100i64).map(Datum::from).collect();
    batch.update_batch(&data).unwrap();
    for i in 0..100i64 {
        single.update(i);
    }
    assert_that!(batch.serialize(), eq(&single.serialize()));

    let nested = vec![Datum::Int(1), Datum::from(vec![2i64, 3])];
    let err = batch.update_batch(&nested).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidInput));
    assert_that!(batch.serialize(), eq(&single.serialize()));

    let err = batch.update_datum(&Datum::from(vec![1i64])).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidInput));
}

#[test]
fn test_invalid_lg_k() {
    for lg_k in [0, 3, 22, 100] {
        let err = HllSketch::new(lg_k, HllType::Hll4).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::ConfigInvalid));
    }
    assert!(HllSketch::new(4, HllType::Hll4).is_ok());
    assert!(HllSketch::new(21, HllType::Hll4).is_ok());
}

#[test]
fn test_reset() {
    let mut sketch = HllSketch::new(10, HllType::Hll4).unwrap();
    for i in 0..5_000 {
        sketch.update(i);
    }
    sketch.reset();
    assert!(sketch.is_empty());
    assert_that!(sketch.current_mode(), eq(HllMode::List));
    assert_that!(sketch.lg_config_k(), eq(10));
    assert_that!(sketch.target_type(), eq(HllType::Hll4));
}

#[test]
fn test_rel_err_tables() {
    let ub = HllSketch::get_rel_err(true, false, 12, NumStdDev::Two);
    let lb = HllSketch::get_rel_err(false, false, 12, NumStdDev::Two);
    assert!(ub < 0.0 && lb > 0.0);
    // beyond the tables the error follows the asymptotic factor
    let big = HllSketch::get_rel_err(true, false, 16, NumStdDev::One);
    assert!(big.abs() < 0.01);
}

#[test]
fn test_summary_string() {
    let mut sketch = HllSketch::new(10, HllType::Hll4).unwrap();
    for i in 0..3_000 {
        sketch.update(i);
    }
    let summary = sketch.to_string();
    assert_that!(summary, contains_substring("### HLL sketch summary:"));
    assert_that!(summary, contains_substring("HLL_4"));
    assert_that!(summary, contains_substring("Current Mode   : HLL"));
}

#[test]
fn test_summary_sections() {
    let mut sketch = HllSketch::new(8, HllType::Hll4).unwrap();
    for i in 0..2_000 {
        sketch.update(i);
    }
    assert_that!(
        sketch.to_summary_string(true, false, false, false),
        eq(&sketch.to_string())
    );
    let full = sketch.to_summary_string(true, true, true, true);
    assert_that!(full, contains_substring("### End HLL sketch summary"));
    assert_that!(full, contains_substring("### HLL sketch data detail:"));
    assert_that!(full, contains_substring("### End HLL sketch aux detail"));
    assert_that!(sketch.to_summary_string(false, false, false, false), eq(""));
}

#[test]
fn test_start_max_size_matches_promoted_sketch() {
    init_logger();
    let n = 20_000u64;
    for hll_type in ALL_TYPES {
        let mut promoted = HllSketch::new(11, hll_type).unwrap();
        let mut direct = HllSketch::with_start_max_size(11, hll_type, true).unwrap();
        assert!(direct.is_start_max_size());
        assert!(direct.is_empty());
        assert_that!(direct.current_mode(), eq(HllMode::Hll));
        assert_that!(direct.get_estimate(), eq(0.0));

        for i in 0..n {
            promoted.update(i);
            direct.update(i);
            if i < 100 {
                assert_that!(direct.current_mode(), eq(HllMode::Hll));
            }
        }
        assert_that!(promoted.current_mode(), eq(HllMode::Hll));
        assert!(!direct.is_out_of_order());

        // same registers, HIP histories that differ only before the promotion
        assert_that!(
            direct.to_summary_string(false, true, false, true),
            eq(&promoted.to_summary_string(false, true, false, true))
        );
        assert_that!(
            direct.get_estimate(),
            near(promoted.get_estimate(), 0.01 * n as f64)
        );
        assert_that!(direct.get_estimate(), near(n as f64, 0.08 * n as f64));
    }

    let without = HllSketch::with_start_max_size(11, HllType::Hll8, false).unwrap();
    assert_that!(without.current_mode(), eq(HllMode::List));
    assert!(!without.is_start_max_size());
}

#[test]
fn test_start_max_size_reset_stays_in_hll_mode() {
    let mut sketch = HllSketch::with_start_max_size(10, HllType::Hll4, true).unwrap();
    for i in 0..5_000 {
        sketch.update(i);
    }
    sketch.reset();
    assert!(sketch.is_empty());
    assert_that!(sketch.current_mode(), eq(HllMode::Hll));
    assert_that!(sketch.get_estimate(), eq(0.0));
    assert!(sketch.is_start_max_size());
}
