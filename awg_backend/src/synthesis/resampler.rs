use awg_core::error::require_positive;
use awg_core::{ChannelParameters, SynthesisResult};

use super::tables::WaveformTable;
use super::{SampleMatrix, circular_shift, delay_in_samples};

/// Renders continuous output by walking a reference table at a fixed stride.
///
/// The stride is `frequency * N / sample_rate` table samples per output sample; the walk takes
/// the table sample at `floor(i * stride) mod N`, so large or fractional strides skip or repeat
/// table entries. Every rendered row has exactly `N` samples and loops seamlessly only when the
/// buffer spans a whole number of periods.
pub struct PeriodicResampler<'a> {
    table: &'a WaveformTable,
}

impl<'a> PeriodicResampler<'a> {
    /// Creates a resampler that reads from `table`.
    pub fn new(table: &'a WaveformTable) -> Self {
        Self { table }
    }

    /// Returns how many table samples are advanced per output sample.
    #[inline]
    pub fn stride(&self, frequency: f64, sample_rate: f64) -> f64 {
        frequency * self.table.resolution() as f64 / sample_rate
    }

    /// Renders one channel of exactly `N` samples.
    ///
    /// `Constant` channels are a flat `offset` and ignore frequency. Periodic channels fail with
    /// `InvalidParameter` when the frequency or the sample rate is not positive.
    pub fn render(&self, channel: &ChannelParameters, sample_rate: f64) -> SynthesisResult<Vec<f64>> {
        require_positive("sample_rate", sample_rate)?;
        let n = self.table.resolution();

        let Some(row) = self.table.row(channel.waveform) else {
            return Ok(vec![channel.offset; n]);
        };
        let frequency = require_positive("frequency", channel.frequency)?;
        let stride = self.stride(frequency, sample_rate);

        Ok((0..n)
            .map(|i| {
                let index = (i as f64 * stride).floor() as usize % n;
                channel.amplitude * row[index] + channel.offset
            })
            .collect())
    }

    /// Renders both channels, circularly shifting channel 2 by `delay` seconds.
    pub fn render_pair(
        &self,
        channels: [&ChannelParameters; 2],
        sample_rate: f64,
        delay: f64,
    ) -> SynthesisResult<SampleMatrix> {
        let first = self.render(channels[0], sample_rate)?;
        let mut second = self.render(channels[1], sample_rate)?;
        circular_shift(&mut second, delay_in_samples(sample_rate, delay)?);
        Ok(SampleMatrix::from_rows(first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awg_core::WaveformKind;

    fn sine(amplitude: f64, frequency: f64, offset: f64) -> ChannelParameters {
        ChannelParameters::new(WaveformKind::Sine, amplitude, frequency, offset)
    }

    #[test]
    fn test_output_length_matches_table() {
        let table = WaveformTable::build(1000);
        let resampler = PeriodicResampler::new(&table);
        for frequency in [0.1, 1.0, 37.5, 999.0] {
            let row = resampler.render(&sine(1.0, frequency, 0.0), 1000.0).unwrap();
            assert_eq!(row.len(), 1000);
        }
    }

    #[test]
    fn test_samples_follow_index_formula() {
        let table = WaveformTable::build(500);
        let resampler = PeriodicResampler::new(&table);
        let channel = ChannelParameters::new(WaveformKind::Saw, 2.0, 3.3, 0.5);
        let row = resampler.render(&channel, 1234.0).unwrap();

        let reference = table.row(WaveformKind::Saw).unwrap();
        let stride = 3.3 * 500.0 / 1234.0;
        for (i, &sample) in row.iter().enumerate() {
            let index = (i as f64 * stride).floor() as usize % 500;
            assert_eq!(sample, 2.0 * reference[index] + 0.5);
        }
    }

    #[test]
    fn test_one_period_per_buffer() {
        // frequency == sample_rate / N walks the table one entry per sample
        let table = WaveformTable::build(100);
        let resampler = PeriodicResampler::new(&table);
        let row = resampler.render(&sine(1.0, 10.0, 0.0), 1000.0).unwrap();
        assert_eq!(row, table.row(WaveformKind::Sine).unwrap());
    }

    #[test]
    fn test_constant_is_flat_offset() {
        let table = WaveformTable::build(64);
        let resampler = PeriodicResampler::new(&table);
        // frequency is irrelevant for constant output, even when it would be invalid
        let channel = ChannelParameters::new(WaveformKind::Constant, 3.0, 0.0, -1.25);
        let row = resampler.render(&channel, 100.0).unwrap();
        assert_eq!(row, vec![-1.25; 64]);
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        let table = WaveformTable::build(64);
        let resampler = PeriodicResampler::new(&table);
        assert!(resampler.render(&sine(1.0, 0.0, 0.0), 100.0).is_err());
        assert!(resampler.render(&sine(1.0, -5.0, 0.0), 100.0).is_err());
        assert!(resampler.render(&sine(1.0, 5.0, 0.0), 0.0).is_err());
        assert!(
            resampler
                .render(&ChannelParameters::constant(1.0), -1.0)
                .is_err()
        );
    }

    #[test]
    fn test_channel2_delay_is_circular() {
        let table = WaveformTable::build(100);
        let resampler = PeriodicResampler::new(&table);
        let channel = ChannelParameters::new(WaveformKind::Saw, 1.0, 10.0, 0.0);

        let undelayed = resampler.render(&channel, 1000.0).unwrap();
        let matrix = resampler.render_pair([&channel, &channel], 1000.0, 0.01).unwrap();

        // 0.01 s at 1 kHz is 10 samples
        assert_eq!(matrix.channel(0), undelayed.as_slice());
        for i in 0..100 {
            assert_eq!(matrix.channel(1)[(i + 10) % 100], undelayed[i]);
        }
    }

    #[test]
    fn test_zero_delay_leaves_channel2_unshifted() {
        let table = WaveformTable::build(200);
        let resampler = PeriodicResampler::new(&table);
        let channel = ChannelParameters::new(WaveformKind::Triangle, 1.0, 7.0, 0.0);
        let matrix = resampler.render_pair([&channel, &channel], 2000.0, 0.0).unwrap();
        assert_eq!(matrix.channel(0), matrix.channel(1));
    }
}
