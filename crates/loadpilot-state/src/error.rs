//! Error types for loadpilot configuration.

use thiserror::Error;

/// Result type alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while validating an [`AutoscaleConfig`](crate::AutoscaleConfig)
/// or parsing a mode name.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_parallel must be at least 1, got {0}")]
    MinParallelZero(u32),

    #[error("min_parallel ({min}) exceeds max_parallel ({max})")]
    ParallelRange { min: u32, max: u32 },

    #[error("threshold {name} must be within 0..=100, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("cpu_low ({low}) exceeds cpu_high ({high})")]
    ThresholdOrder { low: f64, high: f64 },

    #[error("unknown mode: {0} (expected \"auto\" or \"manual\")")]
    UnknownMode(String),
}
