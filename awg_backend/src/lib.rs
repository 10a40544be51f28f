//! Buffer synthesis and output for the two-channel waveform generator.

pub mod output;
pub mod synthesis;

pub use output::{AnalogOutput, OutputChannels, OutputError, OutputResult, OutputSink, Writer};
pub use synthesis::preview::Preview;
pub use synthesis::selector::{OutputModeSelector, SynthesisPath};
pub use synthesis::tables::WaveformTable;
pub use synthesis::SampleMatrix;
