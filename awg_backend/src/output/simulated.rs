use std::sync::Arc;

use crossbeam::channel::Receiver;
use log::trace;

use super::playback::PlaybackSlot;
use super::{AnalogOutput, OutputError, OutputEvent, OutputResult, Timing, TimingMode};
use crate::synthesis::SampleMatrix;

/// Command received by a [`SimulatedOutput`], in call order
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Configure(Timing),
    Write { frames: usize, channels: usize },
    Start,
    Stop,
    Close,
}

/// Software output task. Playback advances only when [`SimulatedOutput::pull`] is called, so a
/// caller can pump it in real time from a thread or step it deterministically in tests.
pub struct SimulatedOutput {
    slot: Arc<PlaybackSlot>,
    events: Receiver<OutputEvent>,
    timing: Option<Timing>,
    device_channels: usize,
    closed: bool,
    history: Vec<DriverCall>,
}

impl SimulatedOutput {
    /// `device_channels` is the width of the interleaved buffers passed to `pull`
    pub fn new(device_channels: usize) -> Self {
        let (slot, events) = PlaybackSlot::new();
        Self {
            slot: Arc::new(slot),
            events,
            timing: None,
            device_channels: device_channels.max(1),
            closed: false,
            history: Vec::new(),
        }
    }

    /// Render the next `output.len() / device_channels` frames
    pub fn pull(&self, output: &mut [f32]) -> bool {
        self.slot.process_realtime(output, self.device_channels)
    }

    /// Handle for pumping playback from another thread
    pub fn slot(&self) -> Arc<PlaybackSlot> {
        Arc::clone(&self.slot)
    }

    pub fn timing(&self) -> Option<Timing> {
        self.timing
    }

    pub fn history(&self) -> &[DriverCall] {
        &self.history
    }

    fn ensure_open(&self) -> OutputResult<()> {
        if self.closed {
            Err(OutputError::Driver("task already closed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AnalogOutput for SimulatedOutput {
    fn configure(&mut self, timing: Timing) -> OutputResult<()> {
        self.ensure_open()?;
        if !(timing.sample_rate.is_finite() && timing.sample_rate > 0.0) {
            return Err(OutputError::InvalidSampleRate(timing.sample_rate));
        }
        trace!("simulated output configured for {timing}");
        self.timing = Some(timing);
        self.history.push(DriverCall::Configure(timing));
        Ok(())
    }

    fn write(&mut self, buffer: &SampleMatrix, channels: usize) -> OutputResult<()> {
        self.ensure_open()?;
        let Some(timing) = self.timing else {
            return Err(OutputError::Driver("write before the sample clock was configured".to_string()));
        };
        if let TimingMode::Finite { samples_per_channel } = timing.mode {
            if samples_per_channel != buffer.len() {
                return Err(OutputError::Driver(format!(
                    "finite task expects {samples_per_channel} samples per channel, got {}",
                    buffer.len()
                )));
            }
        }
        let looping = timing.mode == TimingMode::Continuous;
        self.slot.load(buffer, channels, looping);
        self.history.push(DriverCall::Write {
            frames: buffer.len(),
            channels,
        });
        Ok(())
    }

    fn start(&mut self) -> OutputResult<()> {
        self.ensure_open()?;
        self.slot.rewind();
        self.slot.set_running(true);
        self.history.push(DriverCall::Start);
        Ok(())
    }

    fn stop(&mut self) -> OutputResult<()> {
        self.ensure_open()?;
        self.slot.set_running(false);
        self.history.push(DriverCall::Stop);
        Ok(())
    }

    fn close(&mut self) -> OutputResult<()> {
        self.ensure_open()?;
        self.slot.set_running(false);
        self.slot.clear();
        self.closed = true;
        self.history.push(DriverCall::Close);
        Ok(())
    }

    fn events(&self) -> Receiver<OutputEvent> {
        self.events.clone()
    }
}
