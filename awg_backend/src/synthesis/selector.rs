use std::fmt;

use awg_core::error::require_positive;
use awg_core::{OutputMode, Settings, SynthesisResult, WaveformKind};
use log::debug;

use super::SampleMatrix;
use super::finite::FinitePulseBuilder;
use super::ramped_dc::RampedDCBuilder;
use super::resampler::PeriodicResampler;
use super::tables::WaveformTable;

/// Identifies which builder produces the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPath {
    Periodic,
    FinitePulse,
    RampedDc,
}

impl fmt::Display for SynthesisPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisPath::Periodic => f.write_str("periodic (continuous)"),
            SynthesisPath::FinitePulse => f.write_str("finite pulses"),
            SynthesisPath::RampedDc => f.write_str("ramped DC"),
        }
    }
}

/// Turns a settings snapshot into the two-channel buffer to send.
pub struct OutputModeSelector<'a> {
    table: &'a WaveformTable,
}

impl<'a> OutputModeSelector<'a> {
    /// Creates a selector whose continuous output resamples `table`.
    pub fn new(table: &'a WaveformTable) -> Self {
        Self { table }
    }

    /// Picks the synthesis path for `settings`.
    ///
    /// Finite output with both channels constant is a ramped DC pulse, and any other finite
    /// output is a pulse burst. Continuous output always resamples the reference table.
    pub fn path(settings: &Settings) -> SynthesisPath {
        let both_constant = settings.channel1.waveform == WaveformKind::Constant
            && settings.channel2.waveform == WaveformKind::Constant;
        match (settings.system.output_mode, both_constant) {
            (OutputMode::Finite, true) => SynthesisPath::RampedDc,
            (OutputMode::Finite, false) => SynthesisPath::FinitePulse,
            (OutputMode::Continuous, _) => SynthesisPath::Periodic,
        }
    }

    /// Builds the buffer for `settings` along the path chosen by [`OutputModeSelector::path`].
    ///
    /// Either a complete matrix with equal-length rows is returned or the first invalid
    /// parameter is reported.
    pub fn synthesize(&self, settings: &Settings) -> SynthesisResult<SampleMatrix> {
        let system = &settings.system;
        require_positive("sample_rate", system.sample_rate)?;

        let path = Self::path(settings);
        let matrix = match path {
            SynthesisPath::RampedDc => {
                // constant channels only expose an offset, which sets the DC level
                RampedDCBuilder::new(system.sample_rate, system.ramp_time)?.build_pair(
                    [system.dc_time_1, system.dc_time_2],
                    [settings.channel1.offset, settings.channel2.offset],
                    system.channel2_delay,
                )?
            }
            SynthesisPath::FinitePulse => FinitePulseBuilder::new(system.sample_rate, system.pulse_count)?
                .build(settings.channels(), system.channel2_delay)?,
            SynthesisPath::Periodic => PeriodicResampler::new(self.table).render_pair(
                settings.channels(),
                system.sample_rate,
                system.channel2_delay,
            )?,
        };

        debug!(
            "synthesized {} samples per channel via {path} at {} Hz",
            matrix.len(),
            system.sample_rate
        );
        Ok(matrix)
    }
}
