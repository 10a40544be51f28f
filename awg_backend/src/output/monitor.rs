use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use quanta::{Clock, Instant as QuantaInstant};

/// Snapshot of streaming metrics, taken off the realtime thread.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    /// Frames handed to the device since creation or the last reset
    pub frames_streamed: u64,
    pub callback_count: u64,
    /// Callbacks that wrote silence because the buffer was being swapped
    pub underrun_count: u64,
    /// Fastest callback observed (ns)
    pub min_callback_nanos: Option<u64>,
    /// Slowest callback observed (ns)
    pub max_callback_nanos: Option<u64>,
    /// EMA of callback duration in nanoseconds
    pub ema_callback_nanos: f64,
    /// Time one average callback's worth of frames takes to play (ns)
    pub expected_callback_nanos: f64,
    pub avg_load_percent: f64,
    pub timestamp: Instant,
}

/// Realtime-safe metrics for the playback callback.
///
/// The `record_*`/`add_*` methods and [`StreamMonitor::scoped_callback`] only touch atomics and
/// may run inside the device callback. [`StreamMonitor::snapshot`] is for other threads.
#[derive(Debug)]
pub struct StreamMonitor {
    clock: Clock,

    frames_streamed: AtomicU64,
    callback_count: AtomicU64,
    underrun_count: AtomicU64,

    min_callback_nanos: AtomicU64,
    max_callback_nanos: AtomicU64,
    /// f64 bits of the EMA
    ema_callback_bits: AtomicU64,

    ema_alpha: f64,
}

impl StreamMonitor {
    /// `ema_alpha` in (0, 1] sets how quickly the average follows new callbacks; out of range
    /// values fall back to 0.1.
    pub fn new(ema_alpha: f64) -> Self {
        let ema_alpha = if ema_alpha > 0.0 && ema_alpha <= 1.0 { ema_alpha } else { 0.1 };
        Self {
            clock: Clock::new(),
            frames_streamed: AtomicU64::new(0),
            callback_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            min_callback_nanos: AtomicU64::new(u64::MAX),
            max_callback_nanos: AtomicU64::new(0),
            ema_callback_bits: AtomicU64::new(0),
            ema_alpha,
        }
    }

    #[inline(always)]
    pub fn add_frames_streamed(&self, n: u64) {
        self.frames_streamed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_underrun_count(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_callback_duration_nanos(&self, nanos: u64) {
        self.min_callback_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_callback_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let _ = self
            .ema_callback_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |old_bits| {
                let old = f64::from_bits(old_bits);
                Some((alpha * nanos as f64 + (1.0 - alpha) * old).to_bits())
            });
    }

    /// Count a callback and time it until the guard drops.
    #[inline(always)]
    pub fn scoped_callback(&self) -> CallbackGuard<'_> {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        CallbackGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    /// Read the counters. `reset_peaks` restarts min/max/EMA collection afterwards.
    pub fn snapshot(&self, sample_rate: f64, reset_peaks: bool) -> StreamSnapshot {
        let frames_streamed = self.frames_streamed.load(Ordering::Relaxed);
        let callback_count = self.callback_count.load(Ordering::Relaxed);
        let underrun_count = self.underrun_count.load(Ordering::Relaxed);
        let min_raw = self.min_callback_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_callback_nanos.load(Ordering::Relaxed);
        let ema = f64::from_bits(self.ema_callback_bits.load(Ordering::Relaxed));

        let expected_callback_nanos = if callback_count > 0 && sample_rate > 0.0 {
            let frames_per_callback = frames_streamed as f64 / callback_count as f64;
            frames_per_callback / sample_rate * 1_000_000_000.0
        } else {
            0.0
        };
        let avg_load_percent = if expected_callback_nanos > 0.0 {
            ema / expected_callback_nanos * 100.0
        } else {
            0.0
        };

        if reset_peaks {
            self.min_callback_nanos.store(u64::MAX, Ordering::Relaxed);
            self.max_callback_nanos.store(0, Ordering::Relaxed);
            self.ema_callback_bits.store(0, Ordering::Relaxed);
        }

        StreamSnapshot {
            frames_streamed,
            callback_count,
            underrun_count,
            min_callback_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_callback_nanos: (max_raw != 0).then_some(max_raw),
            ema_callback_nanos: ema,
            expected_callback_nanos,
            avg_load_percent,
            timestamp: Instant::now(),
        }
    }

    pub fn reset_all(&self) {
        self.frames_streamed.store(0, Ordering::Relaxed);
        self.callback_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
        self.min_callback_nanos.store(u64::MAX, Ordering::Relaxed);
        self.max_callback_nanos.store(0, Ordering::Relaxed);
        self.ema_callback_bits.store(0, Ordering::Relaxed);
    }
}

impl Default for StreamMonitor {
    fn default() -> Self {
        Self::new(0.1)
    }
}

/// Records the callback's duration on drop
pub struct CallbackGuard<'a> {
    monitor: &'a StreamMonitor,
    start: QuantaInstant,
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self
            .monitor
            .clock
            .now()
            .saturating_duration_since(self.start)
            .as_nanos();
        self.monitor
            .record_callback_duration_nanos(u64::try_from(elapsed).unwrap_or(u64::MAX));
    }
}
