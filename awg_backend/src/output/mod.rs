//! Everything between a finished [`SampleMatrix`] and the analog outputs.
//!
//! [`AnalogOutput`] is the seam to the hardware driver. [`Writer`] owns a driver and enforces the
//! task lifecycle on top of it, and [`PlaybackSlot`] is the realtime renderer shared by the
//! software outputs.

pub mod monitor;
pub mod playback;
pub mod simulated;
pub mod writer;

#[cfg(feature = "audio-device")]
pub mod device;

use std::fmt;

use awg_core::OutputMode;
use crossbeam::channel::Receiver;
use thiserror::Error;

use crate::synthesis::SampleMatrix;

pub use monitor::{StreamMonitor, StreamSnapshot};
pub use playback::PlaybackSlot;
pub use simulated::{DriverCall, SimulatedOutput};
pub use writer::{OutputChannels, Writer, WriterState};

#[cfg(feature = "audio-device")]
pub use device::{OutputDeviceInfo, SoundCardOutput, list_output_devices};

/// How the sample clock runs for the next write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingMode {
    /// Regenerate the buffer until stopped
    Continuous,
    /// Stop after `samples_per_channel` samples
    Finite { samples_per_channel: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub sample_rate: f64,
    pub mode: TimingMode,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            TimingMode::Continuous => write!(f, "continuous @ {} Hz", self.sample_rate),
            TimingMode::Finite { samples_per_channel } => {
                write!(f, "{samples_per_channel} samples @ {} Hz", self.sample_rate)
            }
        }
    }
}

/// Notifications raised by a driver while it streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// A finite output wrote its last sample
    Done { frames: u64 },
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot {action} while the writer is {state}")]
    InvalidState {
        action: &'static str,
        state: WriterState,
    },

    #[error("the output writer has been closed")]
    Closed,

    #[error("refusing to write an empty buffer")]
    EmptyBuffer,

    #[error("sample rate {0} Hz is not usable")]
    InvalidSampleRate(f64),

    #[error("output driver error: {0}")]
    Driver(String),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Low-level analog output task.
///
/// Implementations only execute commands; ordering rules (stop before reconfigure, park at zero
/// before close) are enforced by [`Writer`].
pub trait AnalogOutput {
    /// Set up the sample clock for the next write
    fn configure(&mut self, timing: Timing) -> OutputResult<()>;

    /// Load `buffer` into the task. With `channels == 1` only the first row is used.
    fn write(&mut self, buffer: &SampleMatrix, channels: usize) -> OutputResult<()>;

    fn start(&mut self) -> OutputResult<()>;

    fn stop(&mut self) -> OutputResult<()>;

    fn close(&mut self) -> OutputResult<()>;

    /// Receiver for done notifications of finite outputs
    fn events(&self) -> Receiver<OutputEvent>;
}

/// Anything that accepts a synthesized buffer for output
pub trait OutputSink {
    fn send(&mut self, buffer: &SampleMatrix, sample_rate: f64, mode: OutputMode) -> OutputResult<()>;
}
