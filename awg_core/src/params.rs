use std::fmt;

use serde::{Deserialize, Serialize};

/// Waveform primitive selectable per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    #[default]
    Constant,
    Sine,
    Block,
    Triangle,
    Saw,
}

impl WaveformKind {
    pub const ALL: [WaveformKind; 5] = [
        WaveformKind::Constant,
        WaveformKind::Sine,
        WaveformKind::Block,
        WaveformKind::Triangle,
        WaveformKind::Saw,
    ];

    /// Whether the waveform has a period (everything except `Constant`)
    pub fn is_periodic(self) -> bool {
        self != WaveformKind::Constant
    }

    pub fn name(self) -> &'static str {
        match self {
            WaveformKind::Constant => "Constant",
            WaveformKind::Sine => "Sine",
            WaveformKind::Block => "Block",
            WaveformKind::Triangle => "Triangle",
            WaveformKind::Saw => "Saw",
        }
    }
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Repeat the buffer until explicitly stopped
    #[default]
    Continuous,
    /// Play the buffer once, then halt
    Finite,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Continuous => f.write_str("Continuous"),
            OutputMode::Finite => f.write_str("Finite"),
        }
    }
}

/// Per-channel waveform configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParameters {
    pub waveform: WaveformKind,
    /// Peak amplitude in volts
    pub amplitude: f64,
    /// Hz, ignored for `Constant`
    pub frequency: f64,
    /// DC offset in volts
    pub offset: f64,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self {
            waveform: WaveformKind::Constant,
            amplitude: 1.0,
            frequency: 1.0,
            offset: 0.0,
        }
    }
}

impl ChannelParameters {
    pub fn new(waveform: WaveformKind, amplitude: f64, frequency: f64, offset: f64) -> Self {
        Self {
            waveform,
            amplitude,
            frequency,
            offset,
        }
    }

    /// A flat output at `offset` volts
    pub fn constant(offset: f64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Human readable description of what the channel outputs.
    ///
    /// Constant channels only show their offset since amplitude and frequency do not apply.
    pub fn summary(&self) -> String {
        if self.waveform.is_periodic() {
            format!(
                "Waveform:\t\t{}\nAmplitude:\t\t{} V\nFrequency:\t\t{} Hz\nOffset:\t\t{} V",
                self.waveform, self.amplitude, self.frequency, self.offset
            )
        } else {
            format!("Waveform:\t\t{}\nOffset:\t\t{} V", self.waveform, self.offset)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParameters {
    /// Hz
    pub sample_rate: f64,
    pub output_mode: OutputMode,
    /// Number of periods sent in finite mode
    pub pulse_count: u32,
    /// Seconds channel 2 lags channel 1
    pub channel2_delay: f64,
    /// Seconds for each ramp of a ramped DC pulse
    pub ramp_time: f64,
    /// Hold time of channel 1's ramped DC pulse in seconds
    pub dc_time_1: f64,
    /// Hold time of channel 2's ramped DC pulse in seconds
    pub dc_time_2: f64,
}

impl Default for SystemParameters {
    fn default() -> Self {
        Self {
            sample_rate: 10_000.0,
            output_mode: OutputMode::Continuous,
            pulse_count: 1,
            channel2_delay: 0.0,
            ramp_time: 1.0,
            dc_time_1: 0.0,
            dc_time_2: 0.0,
        }
    }
}

/// Complete configuration snapshot consumed by the synthesis engine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub system: SystemParameters,
    pub channel1: ChannelParameters,
    pub channel2: ChannelParameters,
}

impl Settings {
    pub fn channels(&self) -> [&ChannelParameters; 2] {
        [&self.channel1, &self.channel2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_operator_form() {
        let settings = Settings::default();
        assert_eq!(settings.system.sample_rate, 10_000.0);
        assert_eq!(settings.system.output_mode, OutputMode::Continuous);
        assert_eq!(settings.system.pulse_count, 1);
        assert_eq!(settings.system.ramp_time, 1.0);
        assert_eq!(settings.channel1.waveform, WaveformKind::Constant);
        assert_eq!(settings.channel2.amplitude, 1.0);
        assert_eq!(settings.channel2.frequency, 1.0);
        assert_eq!(settings.channel2.offset, 0.0);
    }

    #[test]
    fn test_periodic_kinds() {
        let periodic: Vec<_> = WaveformKind::ALL
            .iter()
            .filter(|kind| kind.is_periodic())
            .collect();
        assert_eq!(periodic.len(), 4);
        assert!(!WaveformKind::Constant.is_periodic());
    }

    #[test]
    fn test_summary_for_constant_hides_amplitude() {
        let summary = ChannelParameters::constant(2.5).summary();
        assert_eq!(summary, "Waveform:\t\tConstant\nOffset:\t\t2.5 V");
    }

    #[test]
    fn test_summary_for_periodic() {
        let summary = ChannelParameters::new(WaveformKind::Sine, 1.5, 50.0, -0.5).summary();
        assert!(summary.contains("Sine"));
        assert!(summary.contains("Amplitude:\t\t1.5 V"));
        assert!(summary.contains("Frequency:\t\t50 Hz"));
        assert!(summary.contains("Offset:\t\t-0.5 V"));
    }
}
