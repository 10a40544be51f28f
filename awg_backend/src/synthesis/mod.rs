//! Turning settings into the two-row voltage buffer that is sent to the outputs.
//!
//! Every builder here is a pure function of its inputs: it either returns a complete
//! [`SampleMatrix`] or fails with `InvalidParameter` before allocating any output.

pub mod tables;
pub mod resampler;
pub mod finite;
pub mod ramped_dc;
pub mod selector;
pub mod preview;

use awg_core::{SynthesisError, SynthesisResult, error::require_non_negative};

/// Largest number of samples a single synthesized channel may hold.
///
/// At the highest accepted sample rate (100 kHz) this is roughly 45 minutes of output. Requests
/// that would need more fail with `InvalidParameter` instead of attempting the allocation.
pub const MAX_SAMPLES_PER_CHANNEL: usize = 1 << 28;

const TOO_MANY_SAMPLES: &str = "needs more samples than one channel can hold";

/// Two equal-length rows of output voltages, channel 1 first.
///
/// The rows can only be built through [`SampleMatrix::from_rows`], which zero-pads the shorter
/// row, so the equal-length invariant holds for every value of this type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleMatrix {
    rows: [Vec<f64>; 2],
}

impl SampleMatrix {
    /// Pairs two channel rows, right-padding the shorter one with zeros.
    pub fn from_rows(mut first: Vec<f64>, mut second: Vec<f64>) -> Self {
        let len = first.len().max(second.len());
        pad_to(&mut first, len);
        pad_to(&mut second, len);
        Self { rows: [first, second] }
    }

    /// Creates an all-zero matrix with `len` samples per channel.
    pub fn zeros(len: usize) -> Self {
        Self {
            rows: [vec![0.0; len], vec![0.0; len]],
        }
    }

    /// Returns the number of samples per channel.
    pub fn len(&self) -> usize {
        self.rows[0].len()
    }

    /// Returns `true` when the matrix holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the row for channel `index`, which must be 0 or 1.
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    /// Returns both rows, channel 1 first.
    pub fn rows(&self) -> [&[f64]; 2] {
        [&self.rows[0], &self.rows[1]]
    }

    /// Returns both channels of frame `index`.
    #[inline]
    pub fn frame(&self, index: usize) -> [f64; 2] {
        [self.rows[0][index], self.rows[1][index]]
    }
}

/// Right-pads `samples` with zeros up to `len`. Longer input is never truncated.
pub fn pad_to(samples: &mut Vec<f64>, len: usize) {
    if samples.len() < len {
        samples.resize(len, 0.0);
    }
}

/// Rotates `samples` to the right by `shift`, so that `out[(i + shift) % n] == in[i]`.
pub fn circular_shift(samples: &mut [f64], shift: usize) {
    if samples.is_empty() {
        return;
    }
    let shift = shift % samples.len();
    samples.rotate_right(shift);
}

/// Converts a channel 2 `delay` in seconds to the nearest whole number of samples.
///
/// The result is only ever used modulo a row length, so very large delays are harmless.
pub fn delay_in_samples(sample_rate: f64, delay: f64) -> SynthesisResult<usize> {
    let delay = require_non_negative("channel2_delay", delay)?;
    Ok((sample_rate * delay).round() as usize)
}

// `duration * rate` often lands a hair off an integer (0.1 * 10_000); treat those as exact.
const COUNT_TOLERANCE: f64 = 1e-9;

fn snapped(exact: f64) -> Option<f64> {
    let nearest = exact.round();
    ((exact - nearest).abs() <= COUNT_TOLERANCE * nearest.max(1.0)).then_some(nearest)
}

fn sample_count(name: &'static str, duration: f64, rate: f64, round: fn(f64) -> f64) -> SynthesisResult<usize> {
    let exact = duration * rate;
    let count = snapped(exact).unwrap_or_else(|| round(exact));
    if !(count.is_finite() && count >= 0.0) {
        return Err(SynthesisError::invalid(name, duration, "does not give a finite sample count"));
    }
    if count > MAX_SAMPLES_PER_CHANNEL as f64 {
        return Err(SynthesisError::invalid(name, duration, TOO_MANY_SAMPLES));
    }
    Ok(count as usize)
}

/// Counts the samples on the half-open axis `[0, duration)` stepped by `1 / rate`.
///
/// `name` labels `duration` in the error returned when the count is not finite or exceeds
/// [`MAX_SAMPLES_PER_CHANNEL`].
pub fn span_len(name: &'static str, duration: f64, rate: f64) -> SynthesisResult<usize> {
    sample_count(name, duration, rate, f64::ceil)
}

/// Counts the whole samples that fit in `duration` at `rate`.
///
/// Fails like [`span_len`] when the count is not finite or too large.
pub fn whole_samples(name: &'static str, duration: f64, rate: f64) -> SynthesisResult<usize> {
    sample_count(name, duration, rate, f64::floor)
}

/// Accepts a combined channel length computed with checked arithmetic.
///
/// `None` (an overflowed sum or product) and lengths above [`MAX_SAMPLES_PER_CHANNEL`] fail with
/// `InvalidParameter`, reporting `value` under `name`.
pub fn checked_channel_len(name: &'static str, value: f64, len: Option<usize>) -> SynthesisResult<usize> {
    match len {
        Some(len) if len <= MAX_SAMPLES_PER_CHANNEL => Ok(len),
        _ => Err(SynthesisError::invalid(name, value, TOO_MANY_SAMPLES)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_pads_shorter() {
        let matrix = SampleMatrix::from_rows(vec![1.0, 2.0], vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix.channel(0), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(matrix.channel(1), &[3.0, 4.0, 5.0, 6.0]);

        let matrix = SampleMatrix::from_rows(vec![1.0; 3], vec![]);
        assert_eq!(matrix.channel(1), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_circular_shift_wraps() {
        let mut samples = vec![1.0, 2.0, 3.0, 4.0];
        circular_shift(&mut samples, 1);
        assert_eq!(samples, vec![4.0, 1.0, 2.0, 3.0]);

        let mut samples = vec![1.0, 2.0, 3.0];
        circular_shift(&mut samples, 5);
        assert_eq!(samples, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let mut samples = vec![0.5, -0.5, 0.25];
        circular_shift(&mut samples, 0);
        assert_eq!(samples, vec![0.5, -0.5, 0.25]);

        let mut empty: Vec<f64> = Vec::new();
        circular_shift(&mut empty, 3);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_delay_rounds_to_nearest_sample() {
        assert_eq!(delay_in_samples(1000.0, 0.0025).unwrap(), 3);
        assert_eq!(delay_in_samples(1000.0, 0.0).unwrap(), 0);
        assert!(delay_in_samples(1000.0, -0.1).is_err());
    }

    #[test]
    fn test_sample_counts() {
        assert_eq!(span_len("t", 0.1, 10_000.0).unwrap(), 1000);
        assert_eq!(span_len("t", 1.0 / 3.0, 10_000.0).unwrap(), 3334);
        assert_eq!(whole_samples("t", 0.1, 10_000.0).unwrap(), 1000);
        assert_eq!(whole_samples("t", 0.00015, 10_000.0).unwrap(), 1);
        assert_eq!(whole_samples("t", 0.0, 10_000.0).unwrap(), 0);
    }

    #[test]
    fn test_oversized_counts_are_rejected() {
        let err = span_len("ramp_time", 1e300, 1e5).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidParameter { name: "ramp_time", .. }));
        assert!(whole_samples("dc_time", 1e30, 1e5).is_err());
        assert!(span_len("period", f64::INFINITY, 1.0).is_err());

        let limit = MAX_SAMPLES_PER_CHANNEL as f64;
        assert_eq!(whole_samples("t", limit, 1.0).unwrap(), MAX_SAMPLES_PER_CHANNEL);
        assert!(whole_samples("t", limit + 1.0, 1.0).is_err());
    }

    #[test]
    fn test_checked_channel_len() {
        assert_eq!(checked_channel_len("n", 1.0, Some(10)).unwrap(), 10);
        assert!(checked_channel_len("n", 1.0, None).is_err());
        assert!(checked_channel_len("n", 1.0, Some(MAX_SAMPLES_PER_CHANNEL + 1)).is_err());
        assert!(checked_channel_len("n", 1.0, usize::MAX.checked_add(1)).is_err());
    }
}
