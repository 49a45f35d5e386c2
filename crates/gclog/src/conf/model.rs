//! Model — ParserConfig and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::NoiseFilter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Bytes inspected by the format sniffer
    pub sniff_limit_bytes: usize,
    /// Longer physical lines are truncated with a warning
    pub max_line_bytes: usize,
    /// Bound on partial multi-line events held by correlating grammars
    pub max_pending_events: usize,
    /// Extra regexes for lines to drop before parsing
    pub noise_patterns: Vec<String>,
    /// Keep per-line warnings in the finished log
    pub keep_warnings: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sniff_limit_bytes: crate::parser::DEFAULT_SNIFF_LIMIT,
            max_line_bytes: crate::parser::MAX_LINE_SIZE,
            max_pending_events: 64,
            noise_patterns: Vec::new(),
            keep_warnings: true,
        }
    }
}

impl ParserConfig {
    /// Validate limits and compile every configured noise pattern once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sniff_limit_bytes == 0 {
            return Err(ConfigError::Invalid("sniff_limit_bytes must be > 0".to_string()));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid("max_line_bytes must be > 0".to_string()));
        }
        if self.max_pending_events == 0 {
            return Err(ConfigError::Invalid("max_pending_events must be > 0".to_string()));
        }
        for pattern in &self.noise_patterns {
            NoiseFilter::new(pattern, true)
                .map_err(|e| ConfigError::Invalid(format!("noise pattern {:?}: {}", pattern, e)))?;
        }
        Ok(())
    }
}
