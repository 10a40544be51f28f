use std::fmt;
use std::time::Duration;

use awg_core::OutputMode;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{info, warn};

use super::{AnalogOutput, OutputError, OutputEvent, OutputResult, OutputSink, Timing, TimingMode};
use crate::synthesis::SampleMatrix;

/// Frames in the all-zero buffer that parks the outputs at 0 V
pub const PARK_FRAMES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No sample clock configured yet
    Idle,
    /// Configured and loaded, not running
    Configured,
    Streaming,
    Closed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Idle => "idle",
            WriterState::Configured => "configured",
            WriterState::Streaming => "streaming",
            WriterState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Physical output lines driven by a writer, e.g. `Dev1/ao0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChannels {
    pub primary: String,
    /// Without a secondary line only the first row of every buffer is written
    pub secondary: Option<String>,
}

impl OutputChannels {
    pub fn pair(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Some(secondary.into()),
        }
    }

    pub fn single(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn count(&self) -> usize {
        if self.secondary.is_some() { 2 } else { 1 }
    }
}

impl fmt::Display for OutputChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.secondary {
            Some(secondary) => write!(f, "{}, {secondary}", self.primary),
            None => f.write_str(&self.primary),
        }
    }
}

/// Owns an output task and keeps its lifecycle in order.
///
/// The task is always stopped before it is reconfigured, and it is parked at 0 V before it is
/// closed. Dropping an open writer closes it.
pub struct Writer<D: AnalogOutput> {
    driver: D,
    channels: OutputChannels,
    sample_rate: f64,
    state: WriterState,
    events: Receiver<OutputEvent>,
}

impl<D: AnalogOutput> Writer<D> {
    pub fn new(driver: D, channels: OutputChannels, sample_rate: f64) -> OutputResult<Self> {
        let sample_rate = checked_rate(sample_rate)?;
        let events = driver.events();
        info!("output writer on {channels} at {sample_rate} Hz");
        Ok(Self {
            driver,
            channels,
            sample_rate,
            state: WriterState::Idle,
            events,
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> &OutputChannels {
        &self.channels
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn ensure_open(&self) -> OutputResult<()> {
        if self.state == WriterState::Closed {
            Err(OutputError::Closed)
        } else {
            Ok(())
        }
    }

    /// Fails unless something has been written since the writer was created.
    fn ensure_started(&self, action: &'static str) -> OutputResult<()> {
        self.ensure_open()?;
        if self.state == WriterState::Idle {
            Err(OutputError::InvalidState {
                action,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }

    /// Takes effect at the next output; a running task is paused.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> OutputResult<()> {
        self.ensure_open()?;
        let sample_rate = checked_rate(sample_rate)?;
        self.halt()?;
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Move the writer to another set of output lines. The current lines are turned off first.
    pub fn change_channels(&mut self, channels: OutputChannels) -> OutputResult<()> {
        self.ensure_open()?;
        self.turn_off()?;
        info!("output lines changed from {} to {channels}", self.channels);
        self.channels = channels;
        Ok(())
    }

    /// Repeat `buffer` until paused
    pub fn output_continuously(&mut self, buffer: &SampleMatrix) -> OutputResult<()> {
        self.stream(buffer, TimingMode::Continuous)
    }

    /// Play `buffer` once, then hold the last sample
    pub fn single_output(&mut self, buffer: &SampleMatrix) -> OutputResult<()> {
        self.stream(
            buffer,
            TimingMode::Finite {
                samples_per_channel: buffer.len(),
            },
        )
    }

    fn stream(&mut self, buffer: &SampleMatrix, mode: TimingMode) -> OutputResult<()> {
        self.ensure_open()?;
        if buffer.is_empty() {
            return Err(OutputError::EmptyBuffer);
        }
        self.halt()?;
        // a done event from an earlier burst must not end this one
        while self.events.try_recv().is_ok() {}

        let timing = Timing {
            sample_rate: self.sample_rate,
            mode,
        };
        self.driver.configure(timing)?;
        self.state = WriterState::Configured;
        self.driver.write(buffer, self.channels.count())?;
        self.driver.start()?;
        self.state = WriterState::Streaming;
        info!("streaming {timing} on {}", self.channels);
        Ok(())
    }

    /// Stop the task; the outputs keep their last value.
    ///
    /// A writer that has never output anything has no task to pause and returns
    /// [`OutputError::InvalidState`].
    pub fn pause(&mut self) -> OutputResult<()> {
        self.ensure_started("pause")?;
        self.halt()
    }

    /// Stops a running task and is a no-op in any other open state.
    fn halt(&mut self) -> OutputResult<()> {
        self.ensure_open()?;
        if self.state == WriterState::Streaming {
            self.driver.stop()?;
            self.state = WriterState::Configured;
            info!("output paused");
        }
        Ok(())
    }

    /// Stop the task and drive every output to 0 V
    pub fn turn_off(&mut self) -> OutputResult<()> {
        self.ensure_open()?;
        self.halt()?;
        self.output_continuously(&SampleMatrix::zeros(PARK_FRAMES))
    }

    /// Turn off, then release the task. Closing twice is a no-op.
    pub fn close(&mut self) -> OutputResult<()> {
        if self.state == WriterState::Closed {
            return Ok(());
        }
        let parked = self.turn_off();
        if let Err(err) = &parked {
            warn!("could not park outputs at 0 V before closing: {err}");
        }
        let closed = self.driver.close();
        self.state = WriterState::Closed;
        info!("output writer closed");
        parked.and(closed)
    }

    /// Handle pending driver events. A finished finite output returns the writer to Configured.
    pub fn poll_events(&mut self) -> OutputResult<Vec<OutputEvent>> {
        self.ensure_started("poll events")?;
        let pending: Vec<OutputEvent> = self.events.try_iter().collect();
        for event in &pending {
            self.handle_event(*event)?;
        }
        Ok(pending)
    }

    /// Block until the driver reports an event or `timeout` passes.
    ///
    /// Waiting on a writer that has not output anything yet is an [`OutputError::InvalidState`],
    /// since no event could ever arrive.
    pub fn wait_done(&mut self, timeout: Duration) -> OutputResult<Option<OutputEvent>> {
        self.ensure_started("wait for completion")?;
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event)?;
                Ok(Some(event))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(OutputError::Driver("event channel disconnected".to_string()))
            }
        }
    }

    fn handle_event(&mut self, event: OutputEvent) -> OutputResult<()> {
        match event {
            OutputEvent::Done { frames } => {
                info!("finite output done after {frames} frames");
                self.halt()
            }
        }
    }
}

impl<D: AnalogOutput> OutputSink for Writer<D> {
    fn send(&mut self, buffer: &SampleMatrix, sample_rate: f64, mode: OutputMode) -> OutputResult<()> {
        self.halt()?;
        self.set_sample_rate(sample_rate)?;
        match mode {
            OutputMode::Finite => self.single_output(buffer),
            OutputMode::Continuous => self.output_continuously(buffer),
        }
    }
}

impl<D: AnalogOutput> Drop for Writer<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("output writer did not close cleanly: {err}");
        }
    }
}

fn checked_rate(sample_rate: f64) -> OutputResult<f64> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(OutputError::InvalidSampleRate(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{DriverCall, SimulatedOutput};

    fn writer(channels: OutputChannels) -> Writer<SimulatedOutput> {
        Writer::new(SimulatedOutput::new(2), channels, 100.0).unwrap()
    }

    fn burst() -> SampleMatrix {
        SampleMatrix::from_rows(vec![1.0, 2.0, 0.0], vec![-1.0, -2.0, 0.0])
    }

    fn continuous(sample_rate: f64) -> DriverCall {
        DriverCall::Configure(Timing {
            sample_rate,
            mode: TimingMode::Continuous,
        })
    }

    #[test]
    fn test_stops_before_reconfigure() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.output_continuously(&burst()).unwrap();
        writer.single_output(&burst()).unwrap();

        assert_eq!(
            writer.driver().history(),
            &[
                continuous(100.0),
                DriverCall::Write { frames: 3, channels: 2 },
                DriverCall::Start,
                DriverCall::Stop,
                DriverCall::Configure(Timing {
                    sample_rate: 100.0,
                    mode: TimingMode::Finite { samples_per_channel: 3 },
                }),
                DriverCall::Write { frames: 3, channels: 2 },
                DriverCall::Start,
            ]
        );
        assert_eq!(writer.state(), WriterState::Streaming);
    }

    #[test]
    fn test_close_parks_at_zero() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.output_continuously(&burst()).unwrap();
        writer.close().unwrap();

        let history = writer.driver().history();
        assert_eq!(
            &history[3..],
            &[
                DriverCall::Stop,
                continuous(100.0),
                DriverCall::Write { frames: PARK_FRAMES, channels: 2 },
                DriverCall::Start,
                DriverCall::Close,
            ]
        );
        assert_eq!(writer.state(), WriterState::Closed);
        assert!(writer.close().is_ok());
        assert!(matches!(writer.output_continuously(&burst()), Err(OutputError::Closed)));
    }

    #[test]
    fn test_single_channel_writes_first_row() {
        let mut writer = writer(OutputChannels::single("ao0"));
        writer.output_continuously(&burst()).unwrap();
        assert_eq!(
            writer.driver().history()[1],
            DriverCall::Write { frames: 3, channels: 1 }
        );

        let mut out = [9.0f32; 4];
        writer.driver().pull(&mut out);
        assert_eq!(out, [1.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_done_returns_to_configured() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.single_output(&burst()).unwrap();
        assert!(writer.poll_events().unwrap().is_empty());

        let mut out = [0.0f32; 8];
        writer.driver().pull(&mut out);
        let events = writer.poll_events().unwrap();
        assert_eq!(events, vec![OutputEvent::Done { frames: 3 }]);
        assert_eq!(writer.state(), WriterState::Configured);
        assert_eq!(writer.driver().history().last(), Some(&DriverCall::Stop));
    }

    #[test]
    fn test_wait_done_times_out_while_continuous() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.output_continuously(&burst()).unwrap();
        let mut out = [0.0f32; 16];
        writer.driver().pull(&mut out);
        assert_eq!(writer.wait_done(Duration::from_millis(5)).unwrap(), None);
        assert_eq!(writer.state(), WriterState::Streaming);
    }

    #[test]
    fn test_send_applies_rate_and_mode() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.send(&burst(), 250.0, OutputMode::Finite).unwrap();
        assert_eq!(writer.sample_rate(), 250.0);
        assert_eq!(
            writer.driver().timing(),
            Some(Timing {
                sample_rate: 250.0,
                mode: TimingMode::Finite { samples_per_channel: 3 },
            })
        );
        assert!(writer.send(&burst(), -1.0, OutputMode::Continuous).is_err());
    }

    #[test]
    fn test_rejects_empty_buffer() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        assert!(matches!(
            writer.single_output(&SampleMatrix::zeros(0)),
            Err(OutputError::EmptyBuffer)
        ));
        assert_eq!(writer.state(), WriterState::Idle);
    }

    #[test]
    fn test_change_channels_turns_off_old_lines() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        writer.output_continuously(&burst()).unwrap();
        writer.change_channels(OutputChannels::single("ao2")).unwrap();
        assert_eq!(writer.channels().count(), 1);
        assert!(writer
            .driver()
            .history()
            .contains(&DriverCall::Write { frames: PARK_FRAMES, channels: 2 }));
    }

    #[test]
    fn test_idle_writer_rejects_waiting_and_pausing() {
        let mut writer = writer(OutputChannels::pair("ao0", "ao1"));
        assert!(matches!(
            writer.wait_done(Duration::from_millis(1)),
            Err(OutputError::InvalidState {
                action: "wait for completion",
                state: WriterState::Idle,
            })
        ));
        assert!(matches!(
            writer.poll_events(),
            Err(OutputError::InvalidState { state: WriterState::Idle, .. })
        ));
        assert!(matches!(
            writer.pause(),
            Err(OutputError::InvalidState { action: "pause", .. })
        ));
        assert!(writer.driver().history().is_empty());
        assert_eq!(writer.state(), WriterState::Idle);

        writer.output_continuously(&burst()).unwrap();
        writer.pause().unwrap();
        writer.pause().unwrap();
        assert_eq!(writer.state(), WriterState::Configured);
        assert_eq!(writer.wait_done(Duration::from_millis(1)).unwrap(), None);
    }

    #[test]
    fn test_idle_writer_still_closes_and_sends() {
        let mut closing = writer(OutputChannels::pair("ao0", "ao1"));
        closing.set_sample_rate(200.0).unwrap();
        closing.close().unwrap();
        assert_eq!(closing.driver().history().last(), Some(&DriverCall::Close));
        assert!(matches!(closing.wait_done(Duration::from_millis(1)), Err(OutputError::Closed)));

        let mut sending = writer(OutputChannels::pair("ao0", "ao1"));
        sending.send(&burst(), 100.0, OutputMode::Continuous).unwrap();
        assert_eq!(sending.state(), WriterState::Streaming);
    }
}
