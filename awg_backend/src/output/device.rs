//! Sound card output through cpal.
//!
//! A sound card has no DC coupling, so this output is meant for checking shapes and timing by
//! ear or with a scope on the line out. The sample clock is the card's, which only runs at
//! whole-number rates inside the ranges the device reports.

use std::fmt;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use crossbeam::channel::Receiver;
use log::{debug, error, info};

use super::playback::PlaybackSlot;
use super::{AnalogOutput, OutputError, OutputEvent, OutputResult, Timing, TimingMode};
use crate::synthesis::SampleMatrix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
}

impl fmt::Display for OutputDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}ch @ {}-{}Hz{}]",
            self.name,
            self.max_channels,
            self.min_sample_rate,
            self.max_sample_rate,
            if self.is_default { " (default)" } else { "" }
        )
    }
}

/// Output devices of the default host
pub fn list_output_devices() -> OutputResult<Vec<OutputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::Driver(format!("failed to list output devices: {e}")))?;

    let mut infos = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else { continue };
        let Ok(ranges) = device.supported_output_configs() else { continue };
        let ranges: Vec<SupportedStreamConfigRange> = ranges.collect();
        if ranges.is_empty() {
            continue;
        }
        infos.push(OutputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            max_channels: ranges.iter().map(|r| r.channels()).max().unwrap_or(0),
            min_sample_rate: ranges.iter().map(|r| r.min_sample_rate().0).min().unwrap_or(0),
            max_sample_rate: ranges.iter().map(|r| r.max_sample_rate().0).max().unwrap_or(0),
            name,
        });
    }
    Ok(infos)
}

pub struct SoundCardOutput {
    device: cpal::Device,
    name: String,
    ranges: Vec<SupportedStreamConfigRange>,
    slot: Arc<PlaybackSlot>,
    events: Receiver<OutputEvent>,
    timing: Option<Timing>,
    config: Option<StreamConfig>,
    stream: Option<cpal::Stream>,
}

impl SoundCardOutput {
    pub fn open_default() -> OutputResult<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| OutputError::Driver("no default output device".to_string()))?;
        Self::from_device(device)
    }

    /// Open the output device whose name matches `name` exactly
    pub fn open(name: &str) -> OutputResult<Self> {
        let devices = cpal::default_host()
            .output_devices()
            .map_err(|e| OutputError::Driver(format!("failed to list output devices: {e}")))?;
        for device in devices {
            if device.name().is_ok_and(|candidate| candidate == name) {
                return Self::from_device(device);
            }
        }
        Err(OutputError::Driver(format!("output device not found: {name}")))
    }

    fn from_device(device: cpal::Device) -> OutputResult<Self> {
        let name = device
            .name()
            .map_err(|e| OutputError::Driver(format!("failed to get device name: {e}")))?;
        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| OutputError::Driver(format!("failed to get supported configs: {e}")))?
            .filter(|range| range.sample_format() == SampleFormat::F32)
            .collect();
        if ranges.is_empty() {
            return Err(OutputError::Driver(format!("{name} has no f32 output configuration")));
        }
        let (slot, events) = PlaybackSlot::new();
        info!("opened output device {name}");
        Ok(Self {
            device,
            name,
            ranges,
            slot: Arc::new(slot),
            events,
            timing: None,
            config: None,
            stream: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> Arc<PlaybackSlot> {
        Arc::clone(&self.slot)
    }

    /// Stream configuration for `rate`, preferring a stereo layout
    fn stream_config(&self, rate: u32) -> Option<StreamConfig> {
        let supporting = self
            .ranges
            .iter()
            .filter(|range| range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0);
        let channels = supporting
            .map(|range| range.channels())
            .min_by_key(|&channels| if channels == 2 { 0 } else { u32::from(channels.abs_diff(2)) + 1 })?;
        Some(StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        })
    }

    fn build_stream(&self, config: &StreamConfig) -> OutputResult<cpal::Stream> {
        let slot = Arc::clone(&self.slot);
        let device_channels = usize::from(config.channels);
        self.device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    slot.process_realtime(data, device_channels);
                },
                |err| error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| OutputError::Driver(format!("failed to build output stream: {e}")))
    }
}

impl AnalogOutput for SoundCardOutput {
    fn configure(&mut self, timing: Timing) -> OutputResult<()> {
        let rate = timing.sample_rate;
        if !(rate.is_finite() && rate >= 1.0 && rate.fract() == 0.0 && rate <= f64::from(u32::MAX)) {
            return Err(OutputError::InvalidSampleRate(rate));
        }
        let config = self
            .stream_config(rate as u32)
            .ok_or(OutputError::InvalidSampleRate(rate))?;

        if self.config.as_ref() != Some(&config) {
            // the stream runs at a fixed rate and layout, so a new one is built on start
            self.stream = None;
            debug!("{}: {} channels @ {} Hz", self.name, config.channels, config.sample_rate.0);
            self.config = Some(config);
        }
        self.timing = Some(timing);
        Ok(())
    }

    fn write(&mut self, buffer: &SampleMatrix, channels: usize) -> OutputResult<()> {
        let timing = self
            .timing
            .ok_or_else(|| OutputError::Driver("write before the sample clock was configured".to_string()))?;
        self.slot
            .load(buffer, channels, timing.mode == TimingMode::Continuous);
        Ok(())
    }

    fn start(&mut self) -> OutputResult<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| OutputError::Driver("start before the sample clock was configured".to_string()))?;
        if self.stream.is_none() {
            self.stream = Some(self.build_stream(&config)?);
        }
        self.slot.rewind();
        self.slot.set_running(true);
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| OutputError::Driver(format!("failed to start stream: {e}")))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> OutputResult<()> {
        self.slot.set_running(false);
        if let Some(stream) = &self.stream {
            stream
                .pause()
                .map_err(|e| OutputError::Driver(format!("failed to pause stream: {e}")))?;
        }
        Ok(())
    }

    fn close(&mut self) -> OutputResult<()> {
        self.slot.set_running(false);
        self.stream = None;
        self.slot.clear();
        info!("closed output device {}", self.name);
        Ok(())
    }

    fn events(&self) -> Receiver<OutputEvent> {
        self.events.clone()
    }
}
