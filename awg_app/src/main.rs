//! `awg` - drive the two-channel waveform generator from the command line.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(not(feature = "audio-device"))]
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use awg_backend::output::{AnalogOutput, OutputChannels, PlaybackSlot, Writer};
use awg_backend::{OutputModeSelector, OutputSink, Preview, SampleMatrix, WaveformTable};
use awg_core::{OutputMode, Settings, SettingsStore};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{LevelFilter, info, warn};

/// Continuous output runs this long when `--seconds` is not given
const DEFAULT_PLAY_SECONDS: f64 = 5.0;

/// Extra time allowed for a finite output to report completion
const DONE_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "awg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON settings file; missing fields take their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Overrides {
    /// Output mode
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// Periods per channel in finite mode
    #[arg(long, global = true)]
    pulses: Option<u32>,

    /// Samples per second per channel
    #[arg(long, global = true)]
    sample_rate: Option<f64>,

    /// Seconds channel 2 lags channel 1
    #[arg(long, global = true)]
    delay: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Continuous,
    Finite,
}

impl From<ModeArg> for OutputMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Continuous => OutputMode::Continuous,
            ModeArg::Finite => OutputMode::Finite,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the settings and a summary of the buffer they produce
    Describe,

    /// Write the buffer as `time,ch1,ch2` CSV
    Render {
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Send the buffer to an output and wait for it to finish
    Play {
        /// Output device name (sound card builds only)
        #[arg(short, long)]
        device: Option<String>,

        /// How long to run a continuous output
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Drive channel 1 only
        #[arg(long)]
        mono: bool,
    },

    /// Print the default settings as JSON
    Defaults,

    /// List the sound card outputs of the default host
    #[cfg(feature = "audio-device")]
    Devices,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = load_settings(cli.config.as_ref(), &cli.overrides)?;
    let settings = store.snapshot();

    match cli.command {
        Command::Describe => describe(&settings),
        Command::Render { out } => render(&settings, out),
        Command::Play { device, seconds, mono } => play(&settings, device, seconds, mono),
        Command::Defaults => {
            println!("{}", Settings::default().to_json_pretty()?);
            Ok(())
        }
        #[cfg(feature = "audio-device")]
        Command::Devices => devices(),
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn load_settings(config: Option<&PathBuf>, overrides: &Overrides) -> Result<SettingsStore> {
    let store = match config {
        Some(path) => {
            let settings = Settings::load(path).with_context(|| format!("loading {}", path.display()))?;
            SettingsStore::new(settings)?
        }
        None => SettingsStore::default(),
    };

    store
        .update(|settings| {
            let system = &mut settings.system;
            if let Some(mode) = overrides.mode {
                system.output_mode = mode.into();
            }
            if let Some(pulses) = overrides.pulses {
                system.pulse_count = pulses;
            }
            if let Some(sample_rate) = overrides.sample_rate {
                system.sample_rate = sample_rate;
            }
            if let Some(delay) = overrides.delay {
                system.channel2_delay = delay;
            }
        })
        .context("invalid command line override")?;
    Ok(store)
}

fn describe(settings: &Settings) -> Result<()> {
    let preview = Preview::build(WaveformTable::shared(), settings)?;

    println!("Channel 1\n{}\n", settings.channel1.summary());
    println!("Channel 2\n{}\n", settings.channel2.summary());
    println!("Path:\t\t{}", preview.path);
    println!("Sample rate:\t{} Hz", preview.sample_rate);
    println!("Samples:\t{} per channel", preview.matrix.len());
    println!("Duration:\t{:.6} s", preview.duration());
    println!("Window:\t\t{:.6} s .. {:.6} s", preview.window.0, preview.window.1);
    for channel in 0..2 {
        if let Some((lo, hi)) = preview.extent(channel) {
            println!("Channel {} range:\t{lo:.4} V .. {hi:.4} V", channel + 1);
        }
    }
    Ok(())
}

fn render(settings: &Settings, out: Option<PathBuf>) -> Result<()> {
    let matrix = OutputModeSelector::new(WaveformTable::shared()).synthesize(settings)?;
    let sink: Box<dyn Write> = match &out {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = BufWriter::new(sink);

    writeln!(sink, "time,ch1,ch2")?;
    let sample_rate = settings.system.sample_rate;
    for k in 0..matrix.len() {
        let [first, second] = matrix.frame(k);
        writeln!(sink, "{},{first},{second}", k as f64 / sample_rate)?;
    }
    sink.flush()?;

    if let Some(path) = out {
        info!("wrote {} samples per channel to {}", matrix.len(), path.display());
    }
    Ok(())
}

#[cfg(feature = "audio-device")]
fn devices() -> Result<()> {
    let devices = awg_backend::output::list_output_devices()?;
    if devices.is_empty() {
        println!("no output devices found");
    }
    for device in devices {
        println!("{device}");
    }
    Ok(())
}

/// How long a continuous output runs
fn run_duration(seconds: Option<f64>) -> Result<Duration> {
    let seconds = seconds.unwrap_or(DEFAULT_PLAY_SECONDS);
    Duration::try_from_secs_f64(seconds).with_context(|| format!("--seconds {seconds} is not a usable duration"))
}

fn play(settings: &Settings, device: Option<String>, seconds: Option<f64>, mono: bool) -> Result<()> {
    let run_time = run_duration(seconds)?;
    let matrix = OutputModeSelector::new(WaveformTable::shared()).synthesize(settings)?;
    let channels = if mono {
        OutputChannels::single("ch1")
    } else {
        OutputChannels::pair("ch1", "ch2")
    };
    play_on(settings, &matrix, channels, device, run_time)
}

#[cfg(feature = "audio-device")]
fn play_on(
    settings: &Settings,
    matrix: &SampleMatrix,
    channels: OutputChannels,
    device: Option<String>,
    run_time: Duration,
) -> Result<()> {
    use awg_backend::output::SoundCardOutput;

    let driver = match device {
        Some(name) => SoundCardOutput::open(&name)?,
        None => SoundCardOutput::open_default()?,
    };
    info!("playing on {}", driver.name());
    let slot = driver.slot();
    let writer = Writer::new(driver, channels, settings.system.sample_rate)?;
    stream_through(writer, slot, matrix, settings, run_time)
}

#[cfg(not(feature = "audio-device"))]
fn play_on(
    settings: &Settings,
    matrix: &SampleMatrix,
    channels: OutputChannels,
    device: Option<String>,
    run_time: Duration,
) -> Result<()> {
    use awg_backend::output::SimulatedOutput;

    if let Some(name) = device {
        warn!("built without the audio-device feature, ignoring --device {name}");
    }
    let driver = SimulatedOutput::new(2);
    let slot = driver.slot();
    let pump = Pump::spawn(Arc::clone(&slot), settings.system.sample_rate);
    let writer = Writer::new(driver, channels, settings.system.sample_rate)?;
    let result = stream_through(writer, slot, matrix, settings, run_time);
    pump.stop();
    result
}

fn stream_through<D: AnalogOutput>(
    mut writer: Writer<D>,
    slot: Arc<PlaybackSlot>,
    matrix: &SampleMatrix,
    settings: &Settings,
    run_time: Duration,
) -> Result<()> {
    let sample_rate = settings.system.sample_rate;
    let mode = settings.system.output_mode;
    writer.send(matrix, sample_rate, mode)?;

    match mode {
        OutputMode::Finite => {
            let timeout = Duration::try_from_secs_f64(matrix.len() as f64 / sample_rate)
                .context("finite output is too long to wait for")?
                .saturating_add(DONE_GRACE);
            if writer.wait_done(timeout)?.is_none() {
                warn!("output did not report completion within {timeout:?}");
            }
        }
        OutputMode::Continuous => {
            thread::sleep(run_time);
        }
    }

    let snapshot = slot.monitor().snapshot(sample_rate, false);
    info!(
        "{} frames in {} callbacks, {} underruns, average load {:.1}%",
        snapshot.frames_streamed, snapshot.callback_count, snapshot.underrun_count, snapshot.avg_load_percent
    );
    writer.close()?;
    Ok(())
}

/// Plays a simulated output in real time from a background thread
#[cfg(not(feature = "audio-device"))]
struct Pump {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

#[cfg(not(feature = "audio-device"))]
impl Pump {
    /// Callback period of the simulated device
    const PERIOD: Duration = Duration::from_millis(10);

    fn spawn(slot: Arc<PlaybackSlot>, sample_rate: f64) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let frames = ((sample_rate * Self::PERIOD.as_secs_f64()).round() as usize).max(1);
        let handle = thread::spawn(move || {
            let mut buffer = vec![0.0f32; frames * 2];
            while flag.load(Ordering::Acquire) {
                slot.process_realtime(&mut buffer, 2);
                thread::sleep(Self::PERIOD);
            }
        });
        Self { running, handle }
    }

    fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("simulated output thread panicked");
        }
    }
}
