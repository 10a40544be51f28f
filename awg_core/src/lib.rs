//! Shared parameter types, errors and configuration for the two-channel waveform generator.

pub mod config;
pub mod error;
pub mod params;
pub mod store;

pub use config::Limits;
pub use error::{ConfigError, ConfigResult, SynthesisError, SynthesisResult};
pub use params::{ChannelParameters, OutputMode, Settings, SystemParameters, WaveformKind};
pub use store::SettingsStore;
