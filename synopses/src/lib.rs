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

//! Mergeable streaming synopses.
//!
//! Sketches summarize a stream in bounded memory and answer approximate queries with known
//! error. Every sketch here can be serialized and combined with others of its kind:
//!
//! - [`hll`]: HyperLogLog distinct counting, with an [`hll::HllUnion`].
//! - [`cpc`]: Compressed Probabilistic Counting, with a [`cpc::CpcUnion`].
//! - [`frequencies`]: frequent items (heavy hitters) with per-item error bounds.
//!
//! The library logs structural transitions through the [`log`] facade and never installs a
//! logger itself.

pub mod common;
pub mod cpc;
pub mod error;
pub mod frequencies;
pub mod hash;
pub mod hll;

mod codec;
