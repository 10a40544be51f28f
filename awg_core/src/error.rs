use std::path::PathBuf;

use thiserror::Error;

/// Raised by the synthesis engine when a parameter is outside the range it can work with.
///
/// The engine never clamps; range-limiting values is the job of the settings layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

impl SynthesisError {
    pub fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter { name, value, reason }
    }
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} = {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fails with `InvalidParameter` unless `value` is finite and strictly positive.
pub fn require_positive(name: &'static str, value: f64) -> SynthesisResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SynthesisError::invalid(name, value, "must be greater than zero"))
    }
}

/// Fails with `InvalidParameter` unless `value` is finite and not negative.
pub fn require_non_negative(name: &'static str, value: f64) -> SynthesisResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SynthesisError::invalid(name, value, "must not be negative"))
    }
}
