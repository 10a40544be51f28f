use std::f64::consts::PI;
use std::sync::OnceLock;

use awg_core::WaveformKind;

/// Samples per reference period used by continuous output.
pub const DEFAULT_TABLE_SIZE: usize = 100_000;

static DEFAULT_TABLE: OnceLock<WaveformTable> = OnceLock::new();

/// Closed-form evaluation of a waveform primitive.
pub trait Shape {
    /// Value of one period at `phase`, which should be normalized to [0.0, 1.0).
    /// Peaks are at +-1; `Constant` is flat zero so callers add their offset.
    fn sample_at(self, phase: f64) -> f64;
}

impl Shape for WaveformKind {
    #[inline]
    fn sample_at(self, phase: f64) -> f64 {
        match self {
            WaveformKind::Constant => 0.0,
            WaveformKind::Sine => (2.0 * PI * phase).sin(),
            WaveformKind::Block => {
                if phase < 0.5 { 1.0 } else { -1.0 }
            }
            WaveformKind::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            WaveformKind::Saw => 2.0 * phase - 1.0,
        }
    }
}

/// Wraps `phase` into [0.0, 1.0).
#[inline]
pub fn normalize_phase(phase: f64) -> f64 {
    let wrapped = phase - phase.floor();
    // x - floor(x) can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 { 0.0 } else { wrapped }
}

/// One period of every periodic waveform, sampled on `t = i / resolution`.
///
/// Built once and only ever read afterwards; share it by reference or through
/// [`WaveformTable::shared`].
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTable {
    resolution: usize,
    sine: Vec<f64>,
    block: Vec<f64>,
    triangle: Vec<f64>,
    saw: Vec<f64>,
}

impl WaveformTable {
    /// Tabulates every periodic waveform at `resolution` samples per period.
    pub fn build(resolution: usize) -> Self {
        let tabulate = |kind: WaveformKind| -> Vec<f64> {
            (0..resolution)
                .map(|i| kind.sample_at(i as f64 / resolution as f64))
                .collect()
        };

        Self {
            resolution,
            sine: tabulate(WaveformKind::Sine),
            block: tabulate(WaveformKind::Block),
            triangle: tabulate(WaveformKind::Triangle),
            saw: tabulate(WaveformKind::Saw),
        }
    }

    /// Returns the process-wide table at [`DEFAULT_TABLE_SIZE`], built on first use.
    pub fn shared() -> &'static WaveformTable {
        DEFAULT_TABLE.get_or_init(|| Self::build(DEFAULT_TABLE_SIZE))
    }

    /// Returns the number of samples per period.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Returns the reference row for `kind`, or `None` for `Constant`, which is never tabulated.
    pub fn row(&self, kind: WaveformKind) -> Option<&[f64]> {
        match kind {
            WaveformKind::Constant => None,
            WaveformKind::Sine => Some(&self.sine),
            WaveformKind::Block => Some(&self.block),
            WaveformKind::Triangle => Some(&self.triangle),
            WaveformKind::Saw => Some(&self.saw),
        }
    }
}

impl Default for WaveformTable {
    fn default() -> Self {
        Self::build(DEFAULT_TABLE_SIZE)
    }
}
