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

//! Frequency sketches for finding heavy hitters in data streams.
//!
//! The Frequent Items sketch tracks a bounded number of items with the space-saving
//! algorithm. Every tracked item carries an estimate and an offset bracketing its true
//! frequency, and queries can be answered with either no false positives or no false
//! negatives.
//!
//! When the table is full, a new item evicts every entry at the minimum estimate and enters
//! with that minimum as its offset. Merging two sketches adds estimates and offsets, and the
//! maximum errors of both sides add up.
//!
//! # Usage
//!
//! ```rust
//! # use synopses::frequencies::ErrorType;
//! # use synopses::frequencies::FrequentItemsSketch;
//! let mut sketch = FrequentItemsSketch::<i64>::new(6).unwrap();
//! sketch.update_with_count(1, 3);
//! sketch.update(2);
//! let rows = sketch.get_frequent_items(ErrorType::NoFalseNegatives, 2);
//! assert!(rows.iter().any(|row| *row.item() == 1));
//! ```
//!
//! # Serialization
//!
//! ```rust
//! # use synopses::frequencies::FrequentItemsSketch;
//! let mut sketch = FrequentItemsSketch::<String>::new(6).unwrap();
//! sketch.update_with_count("apple".to_string(), 2);
//!
//! let bytes = sketch.serialize();
//! let decoded = FrequentItemsSketch::<String>::deserialize(&bytes).unwrap();
//! assert_eq!(decoded.get_estimate(&"apple".to_string()), 2);
//! assert_eq!(decoded.serialize(), bytes);
//! ```

mod serde;
mod serialization;
mod sketch;
mod space_saving_map;

pub use self::serde::I64Serde;
pub use self::serde::ItemsSerde;
pub use self::serde::StringSerde;
pub use self::sketch::ErrorType;
pub use self::sketch::FrequentItemsSketch;
pub use self::sketch::MAX_LG_MAX_MAP_SIZE;
pub use self::sketch::MIN_LG_MAX_MAP_SIZE;
pub use self::sketch::Row;
