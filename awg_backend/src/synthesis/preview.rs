use awg_core::{Settings, SynthesisResult};

use super::SampleMatrix;
use super::selector::{OutputModeSelector, SynthesisPath};
use super::tables::WaveformTable;

/// Margin added on both sides of the plotted period, as a fraction of it.
const WINDOW_MARGIN: f64 = 0.05;

/// What the operator sees before sending: the exact buffer plus plotting hints.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub path: SynthesisPath,
    pub sample_rate: f64,
    /// Seconds, one entry per sample.
    pub time_axis: Vec<f64>,
    pub matrix: SampleMatrix,
    /// Suggested x-range in seconds.
    pub window: (f64, f64),
}

impl Preview {
    /// Synthesizes the buffer for `settings` exactly as sending would, plus its plotting hints.
    pub fn build(table: &WaveformTable, settings: &Settings) -> SynthesisResult<Self> {
        let matrix = OutputModeSelector::new(table).synthesize(settings)?;
        let sample_rate = settings.system.sample_rate;
        let time_axis: Vec<f64> = (0..matrix.len())
            .map(|k| k as f64 / sample_rate)
            .collect();
        let duration = matrix.len() as f64 / sample_rate;
        let path = OutputModeSelector::path(settings);

        // show one period of the slowest periodic channel, or everything when there is none
        let slowest = settings
            .channels()
            .into_iter()
            .filter(|channel| channel.waveform.is_periodic())
            .map(|channel| channel.frequency)
            .reduce(f64::min);
        let window = match (path, slowest) {
            (SynthesisPath::RampedDc, _) | (_, None) => (0.0, duration),
            (_, Some(frequency)) => {
                let period = 1.0 / frequency;
                (-WINDOW_MARGIN * period, period * (1.0 + WINDOW_MARGIN))
            }
        };

        Ok(Self {
            path,
            sample_rate,
            time_axis,
            matrix,
            window,
        })
    }

    /// Returns the length of the buffer in seconds.
    pub fn duration(&self) -> f64 {
        self.matrix.len() as f64 / self.sample_rate
    }

    /// Returns the minimum and maximum voltage on `channel`, or `None` for an empty buffer.
    pub fn extent(&self, channel: usize) -> Option<(f64, f64)> {
        let row = self.matrix.channel(channel);
        let first = *row.first()?;
        Some(
            row.iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}
