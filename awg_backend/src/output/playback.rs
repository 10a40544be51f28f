//! Realtime playback of a loaded [`SampleMatrix`].
//!
//! The device callback never blocks and never allocates: the buffer sits behind a
//! `spin::Mutex` that the callback only `try_lock`s, and loading a new buffer builds it on the
//! caller's thread before swapping it in. If the lock is taken the callback writes silence and
//! counts an underrun.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use spin::Mutex;

use super::OutputEvent;
use super::monitor::StreamMonitor;
use crate::synthesis::SampleMatrix;

/// Buffer converted to interleaved-friendly frames, plus the play position
struct PlaybackBuffer {
    frames: Vec<[f32; 2]>,
    looping: bool,
    cursor: usize,
    finished: bool,
}

impl PlaybackBuffer {
    fn from_matrix(matrix: &SampleMatrix, channels: usize, looping: bool) -> Self {
        let frames = (0..matrix.len())
            .map(|i| {
                let [first, second] = matrix.frame(i);
                // a single-channel task never sees the second row
                let second = if channels >= 2 { second } else { 0.0 };
                [first as f32, second as f32]
            })
            .collect();
        Self {
            frames,
            looping,
            cursor: 0,
            finished: false,
        }
    }

    /// Next frame to play. Returns the frame and whether this call played the last frame of a
    /// finite buffer.
    #[inline]
    fn next_frame(&mut self) -> ([f32; 2], bool) {
        let len = self.frames.len();
        if self.finished {
            // finite output holds its last value
            return (self.frames[len - 1], false);
        }
        let frame = self.frames[self.cursor];
        self.cursor += 1;
        if self.cursor < len {
            return (frame, false);
        }
        if self.looping {
            self.cursor = 0;
            (frame, false)
        } else {
            self.cursor = len - 1;
            self.finished = true;
            (frame, true)
        }
    }
}

/// Shared between the device callback and the thread that controls the output.
pub struct PlaybackSlot {
    buffer: Mutex<Option<PlaybackBuffer>>,
    running: AtomicBool,
    /// Frames handed to the device while running
    frame_clock: AtomicU64,
    events: Sender<OutputEvent>,
    monitor: StreamMonitor,
}

impl PlaybackSlot {
    pub fn new() -> (Self, Receiver<OutputEvent>) {
        // bounded so that sending from the callback never allocates
        let (events, receiver) = channel::bounded(8);
        let slot = Self {
            buffer: Mutex::new(None),
            running: AtomicBool::new(false),
            frame_clock: AtomicU64::new(0),
            events,
            monitor: StreamMonitor::default(),
        };
        (slot, receiver)
    }

    /// Replace the buffer. `channels` is how many rows the task writes (1 or 2); `looping`
    /// regenerates the buffer instead of stopping after its last frame.
    pub fn load(&self, matrix: &SampleMatrix, channels: usize, looping: bool) {
        let buffer = PlaybackBuffer::from_matrix(matrix, channels, looping);
        let previous = self.buffer.lock().replace(buffer);
        // free the old buffer outside the lock
        drop(previous);
    }

    /// Drop the loaded buffer; the callback outputs silence afterwards
    pub fn clear(&self) {
        let previous = self.buffer.lock().take();
        drop(previous);
    }

    /// Rewind the loaded buffer to its first frame
    pub fn rewind(&self) {
        if let Some(buffer) = self.buffer.lock().as_mut() {
            buffer.cursor = 0;
            buffer.finished = false;
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn frames_played(&self) -> u64 {
        self.frame_clock.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> &StreamMonitor {
        &self.monitor
    }

    /// Fill the interleaved `output` with `device_channels` samples per frame.
    ///
    /// Device channels beyond the second get silence. Returns `false` whenever silence was
    /// written instead of buffer content.
    pub fn process_realtime(&self, output: &mut [f32], device_channels: usize) -> bool {
        if device_channels == 0 {
            output.fill(0.0);
            return false;
        }
        let frames = output.len() / device_channels;
        if frames == 0 {
            return false;
        }
        let _timing = self.monitor.scoped_callback();

        if !self.is_running() {
            output.fill(0.0);
            return false;
        }

        let Some(mut guard) = self.buffer.try_lock() else {
            output.fill(0.0);
            self.monitor.increment_underrun_count();
            return false;
        };
        let Some(buffer) = guard.as_mut().filter(|buffer| !buffer.frames.is_empty()) else {
            output.fill(0.0);
            return false;
        };

        for out_frame in output.chunks_exact_mut(device_channels) {
            let (frame, completed) = buffer.next_frame();
            for (channel, sample) in out_frame.iter_mut().enumerate() {
                *sample = frame.get(channel).copied().unwrap_or(0.0);
            }
            if completed {
                let _ = self.events.try_send(OutputEvent::Done {
                    frames: buffer.frames.len() as u64,
                });
            }
        }
        drop(guard);

        self.frame_clock.fetch_add(frames as u64, Ordering::Relaxed);
        self.monitor.add_frames_streamed(frames as u64);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> SampleMatrix {
        SampleMatrix::from_rows(vec![0.1, 0.2, 0.3], vec![-1.0, -2.0, -3.0])
    }

    #[test]
    fn test_silent_until_running() {
        let (slot, _events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, true);
        let mut out = [1.0f32; 4];
        assert!(!slot.process_realtime(&mut out, 2));
        assert_eq!(out, [0.0; 4]);
        assert_eq!(slot.frames_played(), 0);
    }

    #[test]
    fn test_continuous_wraps_around() {
        let (slot, events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, true);
        slot.set_running(true);

        let mut out = [0.0f32; 8];
        assert!(slot.process_realtime(&mut out, 2));
        assert_eq!(out, [0.1, -1.0, 0.2, -2.0, 0.3, -3.0, 0.1, -1.0]);
        assert_eq!(slot.frames_played(), 4);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_finite_holds_last_frame_and_reports_once() {
        let (slot, events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, false);
        slot.set_running(true);

        let mut out = [0.0f32; 10];
        slot.process_realtime(&mut out, 2);
        assert_eq!(&out[4..], &[0.3, -3.0, 0.3, -3.0, 0.3, -3.0]);
        assert_eq!(events.try_recv(), Ok(OutputEvent::Done { frames: 3 }));

        slot.process_realtime(&mut out, 2);
        assert!(out.chunks(2).all(|frame| frame == [0.3, -3.0]));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_rewind_restarts_finite_buffer() {
        let (slot, events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, false);
        slot.set_running(true);
        let mut out = [0.0f32; 6];
        slot.process_realtime(&mut out, 2);
        assert!(events.try_recv().is_ok());

        slot.rewind();
        let mut out = [0.0f32; 2];
        slot.process_realtime(&mut out, 2);
        assert_eq!(out, [0.1, -1.0]);
    }

    #[test]
    fn test_single_channel_task_silences_second_row() {
        let (slot, _events) = PlaybackSlot::new();
        slot.load(&matrix(), 1, true);
        slot.set_running(true);
        let mut out = [9.0f32; 4];
        slot.process_realtime(&mut out, 2);
        assert_eq!(out, [0.1, 0.0, 0.2, 0.0]);
    }

    #[test]
    fn test_device_channel_layouts() {
        let (slot, _events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, true);
        slot.set_running(true);

        let mut mono = [0.0f32; 2];
        slot.process_realtime(&mut mono, 1);
        assert_eq!(mono, [0.1, 0.2]);

        let mut quad = [9.0f32; 4];
        slot.process_realtime(&mut quad, 4);
        assert_eq!(quad, [0.3, -3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_contention_outputs_silence() {
        let (slot, _events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, true);
        slot.set_running(true);

        let held = slot.buffer.lock();
        let mut out = [1.0f32; 4];
        assert!(!slot.process_realtime(&mut out, 2));
        drop(held);

        assert_eq!(out, [0.0; 4]);
        assert_eq!(slot.monitor().snapshot(1.0, false).underrun_count, 1);
    }

    #[test]
    fn test_cleared_slot_is_silent() {
        let (slot, _events) = PlaybackSlot::new();
        slot.load(&matrix(), 2, true);
        slot.set_running(true);
        slot.clear();
        let mut out = [1.0f32; 2];
        assert!(!slot.process_realtime(&mut out, 2));
        assert_eq!(out, [0.0; 2]);
    }
}
