use awg_core::error::require_positive;
use awg_core::{ChannelParameters, SynthesisError, SynthesisResult};
use log::debug;

use super::tables::{Shape, normalize_phase};
use super::{SampleMatrix, checked_channel_len, circular_shift, delay_in_samples, span_len};

/// Value written after the last pulse so the output settles at 0 V when the burst ends.
pub const END_OF_BURST: f64 = 0.0;

/// Builds a burst of exactly `pulse_count` periods per channel.
///
/// Periods are sampled from the closed-form waveform rather than the reference table, so every
/// period starts on phase zero and the burst length is exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinitePulseBuilder {
    sample_rate: f64,
    pulse_count: u32,
}

impl FinitePulseBuilder {
    /// Creates a builder for bursts of `pulse_count` periods at `sample_rate`.
    ///
    /// Fails with `InvalidParameter` when the sample rate is not a positive finite number or when
    /// `pulse_count` is zero.
    pub fn new(sample_rate: f64, pulse_count: u32) -> SynthesisResult<Self> {
        require_positive("sample_rate", sample_rate)?;
        if pulse_count < 1 {
            return Err(SynthesisError::invalid(
                "pulse_count",
                f64::from(pulse_count),
                "at least one pulse is required",
            ));
        }
        Ok(Self {
            sample_rate,
            pulse_count,
        })
    }

    /// Returns the number of samples in one period, counted on the half-open axis
    /// `[0, 1 / frequency)`.
    ///
    /// Fails when `frequency` is not positive or is so low that one period would not fit in a
    /// channel.
    pub fn period_len(&self, frequency: f64) -> SynthesisResult<usize> {
        let frequency = require_positive("frequency", frequency)?;
        span_len("period", 1.0 / frequency, self.sample_rate)
    }

    /// Samples exactly one period of a periodic channel with amplitude and offset applied.
    pub fn single_period(&self, channel: &ChannelParameters) -> SynthesisResult<Vec<f64>> {
        let len = self.period_len(channel.frequency)?;
        Ok((0..len)
            .map(|k| {
                let phase = normalize_phase(channel.frequency * k as f64 / self.sample_rate);
                channel.amplitude * channel.waveform.sample_at(phase) + channel.offset
            })
            .collect())
    }

    /// Builds `pulse_count` tiled periods followed by the end-of-burst sample.
    ///
    /// `shift` rotates the tiled periods before the trailing sample is appended. The burst length
    /// is checked before anything is allocated.
    pub fn build_channel(&self, channel: &ChannelParameters, shift: usize) -> SynthesisResult<Vec<f64>> {
        let period_len = self.period_len(channel.frequency)?;
        checked_channel_len(
            "pulse_count",
            f64::from(self.pulse_count),
            period_len
                .checked_mul(self.pulse_count as usize)
                .and_then(|len| len.checked_add(1)),
        )?;

        let period = self.single_period(channel)?;
        let mut burst = period.repeat(self.pulse_count as usize);
        circular_shift(&mut burst, shift);
        burst.push(END_OF_BURST);
        Ok(burst)
    }

    /// Builds both channels of the burst, delaying channel 2 by `delay` seconds.
    ///
    /// A `Constant` channel next to a periodic one holds its offset for as long as the periodic
    /// channel plays. With both channels constant there is no period to count, so the burst is
    /// the end-of-burst sample alone; ramped DC output covers that case instead.
    pub fn build(&self, channels: [&ChannelParameters; 2], delay: f64) -> SynthesisResult<SampleMatrix> {
        let shift = delay_in_samples(self.sample_rate, delay)?;
        let [first, second] = channels;

        let first_row = if first.waveform.is_periodic() {
            Some(self.build_channel(first, 0)?)
        } else {
            None
        };
        let second_row = if second.waveform.is_periodic() {
            Some(self.build_channel(second, shift)?)
        } else {
            None
        };

        let burst_len = first_row
            .iter()
            .chain(second_row.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(1);
        let hold = |channel: &ChannelParameters| {
            let mut row = vec![channel.offset; burst_len - 1];
            row.push(END_OF_BURST);
            row
        };

        let first_row = first_row.unwrap_or_else(|| hold(first));
        let second_row = second_row.unwrap_or_else(|| hold(second));
        debug!(
            "finite burst: {} pulses, {} / {} samples per channel",
            self.pulse_count,
            first_row.len(),
            second_row.len()
        );
        Ok(SampleMatrix::from_rows(first_row, second_row))
    }
}
