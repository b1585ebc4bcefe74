// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared helpers for integration tests

#![allow(dead_code)]

use state_function_bench::engines::eval_native;
use state_function_bench::{BenchmarkConfig, StateFunction, StateRecord};

/// Records from the reference scenario: 42 now, 31 a timestep ago
pub fn reference_records() -> (StateRecord, StateRecord) {
    (StateRecord::new(31.0), StateRecord::new(42.0))
}

/// Value the native baseline computes for the given pair
pub fn native_value(prev: f64, current: f64) -> f64 {
    eval_native().compute_value(&StateRecord::new(prev), &StateRecord::new(current))
}

/// Configuration short enough for tests
pub fn quick_config() -> BenchmarkConfig {
    BenchmarkConfig {
        forks: 1,
        warmup_iterations: 1,
        measurement_iterations: 2,
        iteration_time_ms: 5,
        ..Default::default()
    }
}

/// Input pairs spread over signs and magnitudes
pub fn sample_pairs() -> Vec<(f64, f64)> {
    vec![
        (31.0, 42.0),
        (0.0, 0.0),
        (-7.25, 3.5),
        (1e6, 1e6 + 0.125),
        (42.0, 31.0),
    ]
}

/// Assert `function` agrees with the native baseline on every sample pair
pub fn assert_matches_native(function: &dyn StateFunction) {
    for (prev, current) in sample_pairs() {
        let actual = function.compute_value(&StateRecord::new(prev), &StateRecord::new(current));
        assert_eq!(actual, native_value(prev, current), "prev={prev} current={current}");
    }
}
