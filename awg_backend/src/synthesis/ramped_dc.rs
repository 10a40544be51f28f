use awg_core::error::{require_non_negative, require_positive};
use awg_core::{SynthesisError, SynthesisResult};
use log::debug;

use super::{SampleMatrix, checked_channel_len, span_len, whole_samples};

/// Segments of a ramped DC pulse, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampSegment {
    Silence,
    RampUp,
    Hold,
    RampDown,
}

/// One channel of a ramped DC pulse with its time axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RampedDc {
    /// Seconds, with `time_axis[k] = k / sample_rate`.
    pub time_axis: Vec<f64>,
    pub samples: Vec<f64>,
}

/// Slow DC pulse: silence, linear ramp up to the level, hold, mirrored ramp down.
///
/// The ramp is a straight line; there is no smoothing at either end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampedDCBuilder {
    sample_rate: f64,
    ramp_time: f64,
    ramp_len: usize,
}

impl RampedDCBuilder {
    /// Creates a builder whose ramps each last `ramp_time` seconds at `sample_rate`.
    ///
    /// Fails with `InvalidParameter` when either value is not a positive finite number or when a
    /// single ramp would not fit in a channel.
    pub fn new(sample_rate: f64, ramp_time: f64) -> SynthesisResult<Self> {
        let sample_rate = require_positive("sample_rate", sample_rate)?;
        let ramp_time = require_positive("ramp_time", ramp_time)?;
        Ok(Self {
            sample_rate,
            ramp_time,
            ramp_len: span_len("ramp_time", ramp_time, sample_rate)?,
        })
    }

    /// Returns the number of samples in each ramp.
    pub fn ramp_len(&self) -> usize {
        self.ramp_len
    }

    /// Unscaled ramp from 0 toward 1, one sample every `1 / sample_rate` seconds
    fn ramp(&self) -> Vec<f64> {
        (0..self.ramp_len)
            .map(|k| (k as f64 / self.sample_rate) / self.ramp_time)
            .collect()
    }

    /// Returns the sample count of each segment for a hold of `dc_time` seconds after
    /// `leading_silence` seconds of silence.
    ///
    /// Fails when either duration is negative or not finite, or when any segment or the whole
    /// pulse would not fit in a channel.
    pub fn segment_lens(&self, dc_time: f64, leading_silence: f64) -> SynthesisResult<[(RampSegment, usize); 4]> {
        let dc_time = require_non_negative("dc_time", dc_time)?;
        let leading_silence = require_non_negative("leading_silence", leading_silence)?;
        let silence = whole_samples("leading_silence", leading_silence, self.sample_rate)?;
        let hold = whole_samples("dc_time", dc_time, self.sample_rate)?;

        let total = [silence, self.ramp_len, hold, self.ramp_len]
            .into_iter()
            .try_fold(0usize, usize::checked_add);
        checked_channel_len("dc_time", dc_time, total)?;

        Ok([
            (RampSegment::Silence, silence),
            (RampSegment::RampUp, self.ramp_len),
            (RampSegment::Hold, hold),
            (RampSegment::RampDown, self.ramp_len),
        ])
    }

    /// Builds one channel: silence, ramp up to `amplitude`, hold for `dc_time`, ramp down.
    pub fn build(&self, dc_time: f64, amplitude: f64, leading_silence: f64) -> SynthesisResult<RampedDc> {
        let segments = self.segment_lens(dc_time, leading_silence)?;
        let total: usize = segments.iter().map(|(_, len)| len).sum();
        let ramp = self.ramp();

        let mut samples = Vec::with_capacity(total);
        for (segment, len) in segments {
            match segment {
                RampSegment::Silence => samples.resize(samples.len() + len, 0.0),
                RampSegment::RampUp => samples.extend(ramp.iter().map(|v| amplitude * v)),
                RampSegment::Hold => samples.resize(samples.len() + len, amplitude),
                RampSegment::RampDown => samples.extend(ramp.iter().rev().map(|v| amplitude * v)),
            }
        }

        let time_axis = (0..samples.len())
            .map(|k| k as f64 / self.sample_rate)
            .collect();
        Ok(RampedDc { time_axis, samples })
    }

    /// Builds both channels, with channel 2 starting after `delay` seconds of silence.
    ///
    /// Each channel's level is passed in `levels`, and the shorter result is zero padded.
    pub fn build_pair(&self, dc_times: [f64; 2], levels: [f64; 2], delay: f64) -> SynthesisResult<SampleMatrix> {
        let first = self.build(dc_times[0], levels[0], 0.0)?;
        let second = self.build(dc_times[1], levels[1], delay)?;
        debug!(
            "ramped DC: {} / {} samples per channel",
            first.samples.len(),
            second.samples.len()
        );
        Ok(SampleMatrix::from_rows(first.samples, second.samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_without_hold() {
        let builder = RampedDCBuilder::new(100.0, 1.0).unwrap();
        let pulse = builder.build(0.0, 5.0, 0.0).unwrap();
        let samples = &pulse.samples;
        assert_eq!(samples.len(), 200);

        // rising edge: 0, 0.05, ... 4.95
        for k in 0..100 {
            assert!((samples[k] - 0.05 * k as f64).abs() < 1e-9);
        }
        // falling edge mirrors it
        for k in 0..100 {
            assert_eq!(samples[100 + k], samples[99 - k]);
        }
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[199], 0.0);
    }

    #[test]
    fn test_hold_segment() {
        let builder = RampedDCBuilder::new(100.0, 0.5).unwrap();
        let pulse = builder.build(2.0, 3.0, 0.0).unwrap();
        assert_eq!(pulse.samples.len(), 50 + 200 + 50);
        assert!(pulse.samples[50..250].iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_leading_silence() {
        let builder = RampedDCBuilder::new(1000.0, 0.1).unwrap();
        let pulse = builder.build(0.0, 1.0, 0.25).unwrap();
        assert_eq!(pulse.samples.len(), 250 + 100 + 100);
        assert!(pulse.samples[..250].iter().all(|&v| v == 0.0));
        assert!((pulse.samples[251] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_time_axis_matches_samples() {
        let builder = RampedDCBuilder::new(50.0, 1.0).unwrap();
        let pulse = builder.build(1.0, 1.0, 0.5).unwrap();
        assert_eq!(pulse.time_axis.len(), pulse.samples.len());
        assert_eq!(pulse.time_axis[0], 0.0);
        assert!((pulse.time_axis[10] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_pair_pads_shorter_channel() {
        let builder = RampedDCBuilder::new(100.0, 1.0).unwrap();
        let matrix = builder.build_pair([0.0, 1.0], [2.0, 4.0], 0.5).unwrap();
        // channel 2: 50 silent + 100 ramp + 100 hold + 100 ramp
        assert_eq!(matrix.len(), 350);
        assert!(matrix.channel(0)[200..].iter().all(|&v| v == 0.0));
        assert!(matrix.channel(1)[..50].iter().all(|&v| v == 0.0));
        assert!(matrix.channel(1)[150..250].iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_negative_level_ramps_down() {
        let builder = RampedDCBuilder::new(10.0, 1.0).unwrap();
        let pulse = builder.build(0.0, -2.0, 0.0).unwrap();
        assert!(pulse.samples.iter().all(|&v| v <= 0.0));
        assert!((pulse.samples[9] - (-1.8)).abs() < 1e-12);
    }

    #[test]
    fn test_huge_ramp_time_is_rejected() {
        let err = RampedDCBuilder::new(1e5, 1e300).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidParameter { name: "ramp_time", .. }));
    }

    #[test]
    fn test_pulse_longer_than_a_channel_is_rejected() {
        // both ramps and the hold fit on their own, the sum does not
        let builder = RampedDCBuilder::new(1e5, 1000.0).unwrap();
        assert!(builder.segment_lens(500.0, 0.0).is_ok());
        let err = builder.build(1500.0, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidParameter { name: "dc_time", .. }));
        assert!(builder.build(0.0, 1.0, 1e30).is_err());
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        assert!(RampedDCBuilder::new(0.0, 1.0).is_err());
        assert!(RampedDCBuilder::new(100.0, 0.0).is_err());
        let builder = RampedDCBuilder::new(100.0, 1.0).unwrap();
        assert!(builder.build(-1.0, 1.0, 0.0).is_err());
        assert!(builder.build(1.0, 1.0, -0.1).is_err());
    }
}
