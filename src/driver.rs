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

//! Throughput measurement of state functions
//!
//! Mirrors a classic micro-benchmark harness: each fork builds a fresh
//! function and fresh records, reseeds the input sequence, runs warm-up
//! iterations that are discarded, then measurement iterations whose
//! throughput (operations per microsecond) is recorded.

use std::hint::black_box;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::BenchmarkConfig;
use crate::engines::EngineKind;
use crate::error::{EngineError, Result};
use crate::state::{StateFunction, StateRecord};

/// Operations between two clock reads
const BATCH_SIZE: u64 = 1024;

/// Benchmark mode reported for every result
pub const THROUGHPUT_MODE: &str = "thrpt";

/// Units of the score
pub const THROUGHPUT_UNITS: &str = "ops/us";

/// Random walk fed to a state function
#[derive(Debug, Clone)]
pub struct Trial {
    seed: u64,
    rng: StdRng,
    prev_state: StateRecord,
    state: StateRecord,
}

impl Trial {
    /// Start a trial with both records at zero
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            prev_state: StateRecord::default(),
            state: StateRecord::default(),
        }
    }

    /// Restart the random sequence without touching the records
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Move to the next timestep: the previous record takes the current value
    /// and the current value grows by a random delta in `[0, 1)`
    #[inline]
    pub fn advance(&mut self) {
        self.prev_state.value = self.state.value;
        self.state.value += self.rng.r#gen::<f64>();
    }

    /// Call `function` on the current pair of records
    #[inline]
    pub fn invoke(&self, function: &dyn StateFunction) -> f64 {
        function.compute_value(&self.prev_state, &self.state)
    }

    /// Advance then invoke, `ops` times, returning the sum of the results
    pub fn run_ops(&mut self, function: &dyn StateFunction, ops: u64) -> f64 {
        let mut sum = 0.0;
        for _ in 0..ops {
            self.advance();
            sum += self.invoke(function);
        }
        sum
    }

    /// Previous timestep's record
    pub fn prev_state(&self) -> &StateRecord {
        &self.prev_state
    }

    /// Current timestep's record
    pub fn state(&self) -> &StateRecord {
        &self.state
    }
}

/// Summary of throughput samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean score
    pub mean: f64,
    /// Half-width of the 99.9% confidence interval, NaN below two samples
    pub error: f64,
    /// Number of samples
    pub count: usize,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
}

impl Statistics {
    /// Summarize samples
    pub fn from_samples(samples: &[f64]) -> Self {
        let count = samples.len();
        if count == 0 {
            return Self {
                mean: f64::NAN,
                error: f64::NAN,
                count,
                min: f64::NAN,
                max: f64::NAN,
            };
        }

        let mean = samples.iter().sum::<f64>() / count as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let error = if count < 2 {
            f64::NAN
        } else {
            let variance =
                samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            student_t_999(count - 1) * (variance / count as f64).sqrt()
        };

        Self {
            mean,
            error,
            count,
            min,
            max,
        }
    }
}

/// Two-sided 99.9% critical value of Student's t distribution
fn student_t_999(degrees_of_freedom: usize) -> f64 {
    const TABLE: [f64; 30] = [
        636.619, 31.599, 12.924, 8.610, 6.869, 5.959, 5.408, 5.041, 4.781, 4.587, 4.437, 4.318,
        4.221, 4.140, 4.073, 4.015, 3.965, 3.922, 3.883, 3.850, 3.819, 3.792, 3.768, 3.745,
        3.725, 3.707, 3.690, 3.674, 3.659, 3.646,
    ];
    match degrees_of_freedom {
        0 => f64::NAN,
        df if df <= TABLE.len() => TABLE[df - 1],
        _ => 3.291,
    }
}

/// One row of the benchmark report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Benchmark name, e.g. `eval_native`
    pub name: String,
    /// Benchmark mode
    pub mode: String,
    /// Number of measurement iterations across all forks
    pub count: usize,
    /// Mean throughput
    pub score: f64,
    /// 99.9% confidence half-width of the score
    pub error: f64,
    /// Units of the score
    pub units: String,
    /// Whether the strategy fell back to its zero-returning stub
    pub fallback: bool,
    /// Per-iteration throughput
    pub samples: Vec<f64>,
}

impl BenchmarkResult {
    fn new(name: &str, samples: Vec<f64>, fallback: bool) -> Self {
        let stats = Statistics::from_samples(&samples);
        Self {
            name: name.to_string(),
            mode: THROUGHPUT_MODE.to_string(),
            count: stats.count,
            score: stats.mean,
            error: stats.error,
            units: THROUGHPUT_UNITS.to_string(),
            fallback,
            samples,
        }
    }

    /// Statistics over the samples
    pub fn statistics(&self) -> Statistics {
        Statistics::from_samples(&self.samples)
    }
}

/// Runs forks of warm-up and measurement iterations
#[derive(Debug, Clone)]
pub struct BenchmarkDriver {
    config: BenchmarkConfig,
}

impl BenchmarkDriver {
    /// Create a driver after validating `config`
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration the driver runs with
    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Benchmark the strategies selected by the include pattern
    pub fn run_selected(&self) -> Result<Vec<BenchmarkResult>> {
        let kinds = self.config.selected_engines()?;
        if kinds.is_empty() {
            log::warn!("No benchmark matches the include pattern");
        }
        self.run(&kinds)
    }

    /// Benchmark each strategy in turn
    pub fn run(&self, kinds: &[EngineKind]) -> Result<Vec<BenchmarkResult>> {
        kinds.iter().map(|kind| self.run_engine(*kind)).collect()
    }

    /// Benchmark one strategy with the configured equation
    pub fn run_engine(&self, kind: EngineKind) -> Result<BenchmarkResult> {
        self.measure(kind.benchmark_name(), || {
            kind.instantiate(&self.config.equation)
        })
    }

    /// Benchmark functions produced by `factory`, called once per fork
    pub fn measure<F>(&self, name: &str, factory: F) -> Result<BenchmarkResult>
    where
        F: Fn() -> Result<Box<dyn StateFunction>>,
    {
        let config = &self.config;
        let iteration_time = config.iteration_time();
        let mut samples = Vec::with_capacity(config.forks * config.measurement_iterations);
        let mut fallback = false;

        for fork in 1..=config.forks {
            log::info!("# Benchmark: {name}, fork {fork} of {}", config.forks);

            let function = factory()?;
            if let Some(reason) = function.fallback_reason() {
                if config.fail_on_fallback {
                    return Err(EngineError::Fallback {
                        engine: name.to_string(),
                        reason: reason.to_string(),
                    });
                }
                log::warn!("{name} is measuring its fallback stub: {reason}");
                fallback = true;
            }

            // Fresh records and a restarted sequence for every fork
            let mut trial = Trial::new(config.seed);

            for iteration in 1..=config.warmup_iterations {
                let score = measure_iteration(&mut trial, function.as_ref(), iteration_time);
                log::debug!("# Warmup Iteration {iteration}: {score:.3} {THROUGHPUT_UNITS}");
            }

            for iteration in 1..=config.measurement_iterations {
                let score = measure_iteration(&mut trial, function.as_ref(), iteration_time);
                log::info!("Iteration {iteration}: {score:.3} {THROUGHPUT_UNITS}");
                samples.push(score);
            }
        }

        let result = BenchmarkResult::new(name, samples, fallback);
        log::info!(
            "Result \"{name}\": {:.3} ± {:.3} {THROUGHPUT_UNITS}",
            result.score,
            result.error
        );
        Ok(result)
    }
}

/// Run batches until `duration` has elapsed and return operations per microsecond
fn measure_iteration(trial: &mut Trial, function: &dyn StateFunction, duration: Duration) -> f64 {
    let start = Instant::now();
    let mut ops = 0u64;

    let elapsed = loop {
        black_box(trial.run_ops(function, BATCH_SIZE));
        ops += BATCH_SIZE;
        let elapsed = start.elapsed();
        if elapsed >= duration {
            break elapsed;
        }
    };

    ops as f64 / (elapsed.as_nanos() as f64 / 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::eval_native;
    use crate::state::FallbackFunction;

    fn quick_config() -> BenchmarkConfig {
        BenchmarkConfig {
            forks: 2,
            warmup_iterations: 1,
            measurement_iterations: 2,
            iteration_time_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_trial_is_deterministic() {
        let function = eval_native();
        let mut first = Trial::new(7);
        let mut second = Trial::new(7);
        assert_eq!(first.run_ops(&function, 100), second.run_ops(&function, 100));
        assert_eq!(first.state(), second.state());
    }

    #[test]
    fn test_reseed_restarts_sequence() {
        let mut trial = Trial::new(0);
        trial.advance();
        let first_delta = trial.state().value;
        trial.reseed();
        let before = trial.state().value;
        trial.advance();
        assert_eq!(trial.state().value - before, first_delta);
    }

    #[test]
    fn test_advance_keeps_previous_value() {
        let mut trial = Trial::new(3);
        for _ in 0..10 {
            let current = trial.state().value;
            trial.advance();
            assert_eq!(trial.prev_state().value, current);
            let delta = trial.state().value - trial.prev_state().value;
            assert!((0.0..1.0).contains(&delta));
        }
    }

    #[test]
    fn test_statistics() {
        let stats = Statistics::from_samples(&[1.0, 2.0, 3.0]);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.count, 3);
        assert_eq!((stats.min, stats.max), (1.0, 3.0));
        // t(0.9995, 2) * 1 / sqrt(3)
        assert!((stats.error - 31.599 / 3f64.sqrt()).abs() < 1e-9);

        assert!(Statistics::from_samples(&[5.0]).error.is_nan());
        assert_eq!(Statistics::from_samples(&[]).count, 0);
    }

    #[test]
    fn test_measure_counts_samples() {
        let driver = BenchmarkDriver::new(quick_config()).unwrap();
        let result = driver
            .measure("eval_native", || Ok(Box::new(eval_native())))
            .unwrap();
        assert_eq!(result.count, 4);
        assert_eq!(result.samples.len(), 4);
        assert_eq!(result.mode, "thrpt");
        assert_eq!(result.units, "ops/us");
        assert!(result.score > 0.0);
        assert!(!result.fallback);
    }

    #[test]
    fn test_fallback_rows() {
        let factory = || -> Result<Box<dyn StateFunction>> {
            Ok(Box::new(FallbackFunction::new("unavailable")))
        };

        let driver = BenchmarkDriver::new(quick_config()).unwrap();
        assert!(driver.measure("eval_script", factory).unwrap().fallback);

        let strict = BenchmarkDriver::new(BenchmarkConfig {
            fail_on_fallback: true,
            ..quick_config()
        })
        .unwrap();
        assert_eq!(
            strict.measure("eval_script", factory).unwrap_err(),
            EngineError::Fallback {
                engine: "eval_script".to_string(),
                reason: "unavailable".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BenchmarkConfig {
            measurement_iterations: 0,
            ..Default::default()
        };
        assert!(BenchmarkDriver::new(config).is_err());
    }
}
