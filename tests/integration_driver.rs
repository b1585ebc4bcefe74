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

//! Integration tests for the benchmark driver and report

use pretty_assertions::assert_eq;
use state_function_bench::engines::eval_native;
use state_function_bench::{
    BenchmarkConfig, BenchmarkDriver, BenchmarkReport, EngineError, EngineKind, StateFunction,
    Trial,
};

mod utils;
use utils::quick_config;

#[test]
fn test_include_pattern_selects_benchmarks() {
    let config = BenchmarkConfig {
        include: Some("native|polyglot".to_string()),
        ..quick_config()
    };
    let results = BenchmarkDriver::new(config).unwrap().run_selected().unwrap();

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["eval_native", "eval_polyglot"]);
    for result in &results {
        assert_eq!(result.count, 2);
        assert!(result.score > 0.0, "{}", result.name);
        assert!(!result.fallback);
    }
}

#[test]
fn test_run_every_engine() {
    let driver = BenchmarkDriver::new(quick_config()).unwrap();
    let results = driver.run(EngineKind::all()).unwrap();
    assert_eq!(results.len(), 5);

    let report = BenchmarkReport::new(driver.config().equation.clone(), results);
    let table = report.format_table();
    for kind in EngineKind::all() {
        assert!(table.contains(kind.benchmark_name()));
    }
    assert!(!report.has_fallbacks());
}

#[test]
fn test_fallback_is_reported_or_rejected() {
    let config = BenchmarkConfig {
        equation: "unknown.value".to_string(),
        ..quick_config()
    };
    let result = BenchmarkDriver::new(config.clone())
        .unwrap()
        .run_engine(EngineKind::Script)
        .unwrap();
    assert!(result.fallback);

    let strict = BenchmarkConfig {
        fail_on_fallback: true,
        ..config.clone()
    };
    let err = BenchmarkDriver::new(strict)
        .unwrap()
        .run_engine(EngineKind::Dynamic)
        .unwrap_err();
    assert!(matches!(err, EngineError::Fallback { ref engine, .. } if engine == "eval_dynamic"));

    // Propagating strategies fail the run outright
    assert!(
        BenchmarkDriver::new(config)
            .unwrap()
            .run_engine(EngineKind::Shell)
            .is_err()
    );
}

#[test]
fn test_every_fork_sees_the_same_inputs() {
    let function = eval_native();
    let sums: Vec<f64> = (0..3)
        .map(|_| {
            let mut trial = Trial::new(0);
            trial.reseed();
            trial.run_ops(&function as &dyn StateFunction, 1_000)
        })
        .collect();
    assert_eq!(sums[0], sums[1]);
    assert_eq!(sums[1], sums[2]);
}

#[test]
fn test_strategies_agree_along_the_random_walk() {
    let native = eval_native();
    let others: Vec<_> = [
        EngineKind::Dynamic,
        EngineKind::Shell,
        EngineKind::Script,
        EngineKind::Polyglot,
    ]
    .into_iter()
    .map(|kind| kind.instantiate("state.value - prevState.value").unwrap())
    .collect();

    let mut trial = Trial::new(42);
    for _ in 0..200 {
        trial.advance();
        let expected = trial.invoke(&native);
        for function in &others {
            assert_eq!(trial.invoke(function.as_ref()), expected);
        }
    }
}
