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

//! Error types shared by all evaluation strategies

use crate::compiler::CompilationError;
use crate::parser::ParseError;
use thiserror::Error;

/// Result type for engine construction and benchmark operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while turning an equation into a state function or running a benchmark
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The equation text could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The parsed equation could not be compiled to bytecode
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    /// Cranelift rejected the generated code or the host ISA is unsupported
    #[error("JIT error: {message}")]
    Jit {
        /// Error message
        message: String,
    },

    /// The rhai script engine failed to compile or bind the function
    #[error("Script engine error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// The shell session failed to evaluate a snippet or hand off its result
    #[error("Shell error: {message}")]
    Shell {
        /// Error message
        message: String,
    },

    /// Evaluation inside a polyglot context failed
    #[error("Polyglot error: {message}")]
    Polyglot {
        /// Error message
        message: String,
    },

    /// A polyglot context was asked to evaluate a language it does not host
    #[error("Unsupported language '{language}'")]
    UnsupportedLanguage {
        /// Requested language id
        language: String,
    },

    /// A strategy produced a zero-returning fallback while fallbacks are disallowed
    #[error("Engine {engine} fell back to a stub: {reason}")]
    Fallback {
        /// Benchmark name of the engine
        engine: String,
        /// Failure that caused the fallback
        reason: String,
    },

    /// Invalid benchmark configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O failure while reading configuration
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },
}

impl EngineError {
    /// Create a JIT error
    pub fn jit(message: impl Into<String>) -> Self {
        Self::Jit {
            message: message.into(),
        }
    }

    /// Create a script engine error
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a shell error
    pub fn shell(message: impl Into<String>) -> Self {
        Self::Shell {
            message: message.into(),
        }
    }

    /// Create a polyglot error
    pub fn polyglot(message: impl Into<String>) -> Self {
        Self::Polyglot {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<regex::Error> for EngineError {
    fn from(err: regex::Error) -> Self {
        Self::config(format!("invalid include pattern: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::UnsupportedLanguage {
            language: "python".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported language 'python'");

        let err = EngineError::Fallback {
            engine: "eval_script".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Engine eval_script fell back to a stub: boom");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: EngineError = ParseError::UnexpectedEof.into();
        assert!(matches!(err, EngineError::Parse(ParseError::UnexpectedEof)));
    }
}
