//! Error types for engine setup.
//!
//! Only construction, configuration and [`Synth::initialize`] can fail.
//! Rendering never returns errors; overflow and bad input are counted or
//! clamped instead.
//!
//! [`Synth::initialize`]: crate::Synth::initialize

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building or initializing the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Sample rate outside the configured bounds
    #[error("unsupported sample rate {sample_rate} Hz (supported: {min}..={max})")]
    UnsupportedSampleRate {
        /// Requested rate.
        sample_rate: f32,
        /// Lowest accepted rate.
        min: f32,
        /// Highest accepted rate.
        max: f32,
    },

    /// Block size zero or above the configured limit
    #[error("invalid block size {block_size} (supported: 1..={max})")]
    InvalidBlockSize {
        /// Requested block size.
        block_size: usize,
        /// Largest accepted block size.
        max: usize,
    },

    /// Buffer or queue allocation failed
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// Failed to read a config file
    #[error("failed to read config '{path}': {source}")]
    ReadConfig {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config values are inconsistent
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Create a read config error.
    pub fn read_config(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::ReadConfig {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn unsupported_sample_rate_display() {
        let err = EngineError::UnsupportedSampleRate {
            sample_rate: 1000.0,
            min: 8000.0,
            max: 384000.0,
        };
        assert_eq!(
            err.to_string(),
            "unsupported sample rate 1000 Hz (supported: 8000..=384000)"
        );
    }

    #[test]
    fn invalid_block_size_display() {
        let err = EngineError::InvalidBlockSize {
            block_size: 0,
            max: 8192,
        };
        assert_eq!(err.to_string(), "invalid block size 0 (supported: 1..=8192)");
    }

    #[test]
    fn read_config_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "mock");
        let err = EngineError::read_config("/a/engine.toml", io);
        assert!(err.to_string().contains("/a/engine.toml"));
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_config_display() {
        let err = EngineError::invalid_config("polyphony must be at least 1");
        assert_eq!(err.to_string(), "invalid config: polyphony must be at least 1");
    }
}
