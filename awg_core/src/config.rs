//! Loading and range-checking of [`Settings`].
//!
//! The limits mirror what the operator form accepts. The synthesis engine itself only rejects
//! values it cannot compute with, so anything reaching it through this layer is already in range.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::params::{ChannelParameters, Settings};

/// Inclusive range accepted for a numeric setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

impl Limits {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn check(&self, field: &'static str, value: f64) -> ConfigResult<()> {
        // NaN fails both comparisons, so reject it explicitly
        if value.is_nan() || value < self.min || value > self.max {
            return Err(ConfigError::OutOfRange {
                field,
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

pub const SAMPLE_RATE_LIMITS: Limits = Limits::new(1.0, 1e5);
pub const PULSE_COUNT_LIMITS: Limits = Limits::new(1.0, 1e3);
pub const AMPLITUDE_LIMITS: Limits = Limits::new(0.0, 10.0);
pub const FREQUENCY_LIMITS: Limits = Limits::new(0.1, 1e4);
pub const OFFSET_LIMITS: Limits = Limits::new(-10.0, 10.0);
pub const DELAY_LIMITS: Limits = Limits::new(0.0, 10.0);
pub const RAMP_TIME_LIMITS: Limits = Limits::new(0.1, 10.0);
pub const DC_TIME_1_LIMITS: Limits = Limits::new(0.0, 1000.0);
pub const DC_TIME_2_LIMITS: Limits = Limits::new(0.0, 20.0);

impl Settings {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&json)?;
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field against the operator limits, reporting the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        let system = &self.system;
        SAMPLE_RATE_LIMITS.check("system.sample_rate", system.sample_rate)?;
        PULSE_COUNT_LIMITS.check("system.pulse_count", f64::from(system.pulse_count))?;
        DELAY_LIMITS.check("system.channel2_delay", system.channel2_delay)?;
        RAMP_TIME_LIMITS.check("system.ramp_time", system.ramp_time)?;
        DC_TIME_1_LIMITS.check("system.dc_time_1", system.dc_time_1)?;
        DC_TIME_2_LIMITS.check("system.dc_time_2", system.dc_time_2)?;

        validate_channel(&self.channel1, ["channel1.amplitude", "channel1.frequency", "channel1.offset"])?;
        validate_channel(&self.channel2, ["channel2.amplitude", "channel2.frequency", "channel2.offset"])?;
        Ok(())
    }
}

fn validate_channel(channel: &ChannelParameters, fields: [&'static str; 3]) -> ConfigResult<()> {
    let [amplitude, frequency, offset] = fields;
    AMPLITUDE_LIMITS.check(amplitude, channel.amplitude)?;
    FREQUENCY_LIMITS.check(frequency, channel.frequency)?;
    OFFSET_LIMITS.check(offset, channel.offset)?;
    Ok(())
}
