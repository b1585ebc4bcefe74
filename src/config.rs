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

//! Benchmark configuration

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_EQUATION;
use crate::engines::EngineKind;
use crate::error::{EngineError, Result};

/// Benchmark run configuration
///
/// Loaded from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Independent repetitions of the whole measurement, each with a fresh function
    pub forks: usize,
    /// Iterations run and discarded before measuring
    pub warmup_iterations: usize,
    /// Iterations whose throughput is recorded
    pub measurement_iterations: usize,
    /// Wall-clock length of one iteration in milliseconds
    pub iteration_time_ms: u64,
    /// Seed of the random input sequence, reapplied at the start of every fork
    pub seed: u64,
    /// Equation over `prevState` and `state`
    pub equation: String,
    /// Treat a strategy that fell back to its stub as an error
    pub fail_on_fallback: bool,
    /// Regular expression selecting benchmarks by name
    pub include: Option<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            forks: 2,
            warmup_iterations: 5,
            measurement_iterations: 5,
            iteration_time_ms: 200,
            seed: 0,
            equation: DEFAULT_EQUATION.to_string(),
            fail_on_fallback: false,
            include: None,
        }
    }
}

impl BenchmarkConfig {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading benchmark configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that the configuration can drive a run
    pub fn validate(&self) -> Result<()> {
        if self.forks == 0 {
            return Err(EngineError::config("forks must be at least 1"));
        }
        if self.measurement_iterations == 0 {
            return Err(EngineError::config(
                "measurement_iterations must be at least 1",
            ));
        }
        if self.iteration_time_ms == 0 {
            return Err(EngineError::config("iteration_time_ms must be at least 1"));
        }
        if self.equation.trim().is_empty() {
            return Err(EngineError::config("equation must not be empty"));
        }
        self.include_regex()?;
        Ok(())
    }

    /// Length of one iteration
    pub fn iteration_time(&self) -> Duration {
        Duration::from_millis(self.iteration_time_ms)
    }

    /// Compiled include pattern, if any
    pub fn include_regex(&self) -> Result<Option<Regex>> {
        Ok(self.include.as_deref().map(Regex::new).transpose()?)
    }

    /// Strategies whose benchmark name matches the include pattern, in report order
    pub fn selected_engines(&self) -> Result<Vec<EngineKind>> {
        let include = self.include_regex()?;
        Ok(EngineKind::all()
            .iter()
            .copied()
            .filter(|kind| {
                include
                    .as_ref()
                    .is_none_or(|pattern| pattern.is_match(kind.benchmark_name()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.forks, 2);
        assert_eq!(config.warmup_iterations, 5);
        assert_eq!(config.measurement_iterations, 5);
        assert_eq!(config.iteration_time(), Duration::from_millis(200));
        assert_eq!(config.equation, "state.value - prevState.value");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BenchmarkConfig::from_json(r#"{"forks": 1, "include": "shell|script"}"#)
            .unwrap();
        assert_eq!(config.forks, 1);
        assert_eq!(config.seed, 0);
        assert_eq!(
            config.selected_engines().unwrap(),
            vec![EngineKind::Shell, EngineKind::Script]
        );
    }

    #[test]
    fn test_no_include_selects_everything() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.selected_engines().unwrap(), EngineKind::ALL.to_vec());
    }

    #[test]
    fn test_validation_errors() {
        let config = BenchmarkConfig {
            forks: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config { .. })));

        let config = BenchmarkConfig {
            include: Some("eval_(".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config { .. })));

        assert!(BenchmarkConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = BenchmarkConfig::from_file("/nonexistent/bench.json").unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
