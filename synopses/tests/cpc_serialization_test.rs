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
use googletest::prelude::eq;
use googletest::prelude::le;
use synopses::common::NumStdDev;
use synopses::cpc::CpcSketch;
use synopses::cpc::CpcUnion;
use synopses::cpc::Flavor;
use synopses::error::ErrorKind;

fn sketch_of(lg_k: u8, n: u64) -> CpcSketch {
    let mut sketch = CpcSketch::new(lg_k).unwrap();
    for i in 0..n {
        sketch.update(i);
    }
    sketch
}

#[test]
fn test_round_trip_every_flavor() {
    for (n, flavor) in [
        (0, Flavor::Empty),
        (10, Flavor::Sparse),
        (200, Flavor::Hybrid),
        (1_500, Flavor::Pinned),
        (50_000, Flavor::Sliding),
    ] {
        let sketch = sketch_of(10, n);
        assert_that!(sketch.flavor(), eq(flavor));

        let bytes = sketch.serialize();
        assert_that!(bytes.len(), le(CpcSketch::max_serialized_bytes(10)));
        let restored = CpcSketch::deserialize(&bytes).unwrap();
        assert_that!(restored.flavor(), eq(flavor));
        assert_that!(restored.num_coupons(), eq(sketch.num_coupons()));
        assert_that!(restored.get_estimate(), eq(sketch.get_estimate()));
        assert_that!(
            restored.get_upper_bound(NumStdDev::Two),
            eq(sketch.get_upper_bound(NumStdDev::Two))
        );
        assert_that!(restored.serialize(), eq(&bytes));
    }
}

#[test]
fn test_restored_sketch_keeps_updating() {
    let mut original = sketch_of(11, 3_000);
    let mut restored = CpcSketch::deserialize(&original.serialize()).unwrap();
    for i in 3_000..30_000 {
        original.update(i);
        restored.update(i);
    }
    assert_that!(restored.serialize(), eq(&original.serialize()));
}

#[test]
fn test_merged_result_round_trip() {
    let mut union = CpcUnion::new(10).unwrap();
    union.update(&sketch_of(10, 20_000)).unwrap();
    let result = union.get_result();
    let bytes = result.serialize();
    // no HIP flag for a merged sketch
    assert_that!(bytes[5] & (1 << 2), eq(0));
    let restored = CpcSketch::deserialize(&bytes).unwrap();
    assert!(restored.is_merged());
    assert_that!(restored.get_estimate(), eq(result.get_estimate()));
    assert_that!(restored.serialize(), eq(&bytes));
}

#[test]
fn test_empty_layout() {
    let bytes = CpcSketch::new(11).unwrap().serialize();
    assert_that!(bytes.len(), eq(8));
    assert_that!(bytes[0], eq(2)); // preamble ints
    assert_that!(bytes[1], eq(1)); // serial version
    assert_that!(bytes[2], eq(16)); // family
    assert_that!(bytes[3], eq(11)); // lg_k
    assert_that!(bytes[5], eq(0)); // flags
}

#[test]
fn test_seed_mismatch() {
    let bytes = sketch_of(10, 100).serialize();
    let err = CpcSketch::deserialize_with_seed(&bytes, 123).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));

    let mut sketch = CpcSketch::with_seed(10, 123).unwrap();
    sketch.update(1);
    let restored = CpcSketch::deserialize_with_seed(&sketch.serialize(), 123).unwrap();
    assert_that!(restored.seed(), eq(123));
}

#[test]
fn test_malformed_input() {
    let bytes = sketch_of(10, 5_000).serialize();

    let err = CpcSketch::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    let mut wrong_family = bytes.clone();
    wrong_family[2] = 7;
    let err = CpcSketch::deserialize(&wrong_family).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    let mut compressed = bytes.clone();
    compressed[5] |= 1 << 1;
    let err = CpcSketch::deserialize(&compressed).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    let mut wrong_count = bytes.clone();
    wrong_count[8] ^= 1;
    let err = CpcSketch::deserialize(&wrong_count).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    // lg_k 4 with 950 coupons: offset 57 plus 38 window bits, consistent but past the last column
    let mut window_too_far = vec![9, 1, 16, 4, 0, (1 << 2) | (1 << 3) | (1 << 4)];
    window_too_far.extend_from_slice(&bytes[6..8]);
    window_too_far.extend_from_slice(&950u32.to_le_bytes());
    window_too_far.extend_from_slice(&0u32.to_le_bytes());
    window_too_far.extend_from_slice(&[57, 0, 0, 0]);
    window_too_far.extend_from_slice(&1.0f64.to_le_bytes());
    window_too_far.extend_from_slice(&950.0f64.to_le_bytes());
    window_too_far.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x3f]);
    window_too_far.extend_from_slice(&[0; 11]);
    let err = CpcSketch::deserialize(&window_too_far).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    assert!(CpcSketch::deserialize(&[]).is_err());
}
