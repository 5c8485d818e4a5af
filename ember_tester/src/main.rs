mod annotate;
mod frames;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use ember_vision::alerter::{AlertOutcome, Alerter, TracingAlertSink};
use ember_vision::calibration::{CalibrationProbe, hsv_at, reference_bands};
use ember_vision::config::{HsvRange, LookAlike};
use ember_vision::parallel_pipeline::{StreamId, StreamPool};
use ember_vision::synthetic::{FlickeringFlame, look_alike_disk};
use ember_vision::{DetectorConfig, FrameProcessor, FrameReport, Profile};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ember_tester", about = "Run the ember_vision flame detector over frame sequences")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one frame sequence through the detector and write annotated frames.
    Detect(DetectArgs),
    /// Run several sequences concurrently, one detector per sequence.
    Batch(BatchArgs),
    /// Probe an HSV range against a still image.
    Calibrate(CalibrateArgs),
    /// Render the synthetic flame and a red-cloth control through the detector.
    Demo(DemoArgs),
    /// Print a detector configuration as JSON, for editing and `--config`.
    PrintConfig(DetectorArgs),
}

#[derive(Args, Debug, Clone)]
struct DetectorArgs {
    /// Threshold preset: strict or permissive.
    #[arg(long, default_value = "strict")]
    profile: Profile,
    /// JSON detector configuration; takes precedence over --profile.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl DetectorArgs {
    fn load(&self) -> Result<DetectorConfig> {
        let Some(path) = &self.config else {
            return Ok(DetectorConfig::from_profile(self.profile));
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: DetectorConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct FrameSize {
    /// Processing width; frames are rescaled to it.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Processing height; frames are rescaled to it.
    #[arg(long, default_value_t = 480)]
    height: u32,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Directory of frames, processed in file-name order.
    #[arg(long)]
    input: PathBuf,
    /// Directory for annotated frames.
    #[arg(long)]
    output: PathBuf,
    /// Write one JSON frame report per line to this file.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Frame rate used to time alerts.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Minimum time between two raised alerts, in seconds.
    #[arg(long, default_value_t = 2.0)]
    cooldown_secs: f64,
    #[command(flatten)]
    size: FrameSize,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Frame directories, one stream each.
    #[arg(long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,
    /// Maximum frames processed at once; defaults to the CPU count.
    #[arg(long)]
    concurrency: Option<usize>,
    #[command(flatten)]
    size: FrameSize,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Still image to probe.
    #[arg(long)]
    input: PathBuf,
    /// Range as "h0,s0,v0,h1,s1,v1" on the 8-bit scale (hue 0..=179).
    #[arg(long, default_value = "0,100,100,25,255,255")]
    range: HsvRange,
    #[arg(long, default_value_t = 2)]
    morphology_radius: u8,
    /// Print the HSV value of one pixel, as "x,y".
    #[arg(long, value_parser = parse_point)]
    sample: Option<(u32, u32)>,
    /// Save the cleaned mask here.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DemoArgs {
    /// Directory for annotated demo frames.
    #[arg(long)]
    output: PathBuf,
    #[arg(long, default_value_t = 24)]
    frames: usize,
    #[arg(long, default_value_t = 256)]
    width: u32,
    #[arg(long, default_value_t = 192)]
    height: u32,
    #[command(flatten)]
    detector: DetectorArgs,
}

fn parse_point(text: &str) -> std::result::Result<(u32, u32), String> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {text:?}"))?;
    let coordinate = |part: &str| part.trim().parse::<u32>().map_err(|err| format!("{part:?}: {err}"));
    Ok((coordinate(x)?, coordinate(y)?))
}

/// Running tally over one sequence.
#[derive(Debug, Default, Clone, Copy)]
struct Summary {
    frames: u64,
    alert_frames: u64,
    first_alert: Option<u64>,
    peak_confidence: f64,
}

impl Summary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.peak_confidence = self.peak_confidence.max(report.confidence);
        if report.alert_active {
            self.alert_frames += 1;
            self.first_alert.get_or_insert(report.frame_index);
        }
    }

    fn log(&self, sequence: &str) {
        info!(
            sequence,
            frames = self.frames,
            alert_frames = self.alert_frames,
            first_alert = ?self.first_alert,
            peak_confidence = self.peak_confidence,
            "sequence finished"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Detect(args) => detect(args),
        Command::Batch(args) => batch(args).await,
        Command::Calibrate(args) => calibrate(args),
        Command::Demo(args) => demo(args),
        Command::PrintConfig(args) => {
            println!("{}", serde_json::to_string_pretty(&args.load()?)?);
            Ok(())
        }
    }
}

fn detect(args: DetectArgs) -> Result<()> {
    // --- 1. Setup ---
    if !args.fps.is_finite() || args.fps <= 0.0 {
        bail!("--fps must be positive, got {}", args.fps);
    }
    let config = args.detector.load()?;
    let inputs = frames::list_images(&args.input)?;
    if inputs.is_empty() {
        bail!("no images found in {}", args.input.display());
    }
    std::fs::create_dir_all(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    let mut report_log = match &args.report {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };

    let cooldown = Duration::try_from_secs_f64(args.cooldown_secs).context("invalid --cooldown-secs")?;
    let mut alerter = Alerter::new(FrameProcessor::new(config)?, TracingAlertSink).with_cooldown(cooldown);
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps);
    let start = Instant::now();
    let mut summary = Summary::default();
    info!(frames = inputs.len(), input = %args.input.display(), "starting detection");

    // --- 2. Main Processing Loop ---
    for (index, path) in inputs.iter().enumerate() {
        let frame = frames::load_frame(path, args.size.width, args.size.height)?;
        let now = start + frame_interval.mul_f64(index as f64);
        let (report, outcome) = alerter
            .process_frame(&frame, now)
            .with_context(|| format!("processing {}", path.display()))?;
        summary.record(&report);
        if outcome == AlertOutcome::Suppressed {
            info!(frame = report.frame_index, "alert held back by cooldown");
        }

        // --- 3. Visualization & Reports ---
        let out = frames::output_path(&args.output, path);
        annotate::annotate(&frame, &report)
            .save(&out)
            .with_context(|| format!("writing {}", out.display()))?;
        if let Some(log) = report_log.as_mut() {
            serde_json::to_writer(&mut *log, &report)?;
            writeln!(log)?;
        }
    }

    if let Some(mut log) = report_log {
        log.flush()?;
    }
    summary.log(&args.input.display().to_string());
    Ok(())
}

async fn batch(args: BatchArgs) -> Result<()> {
    let config = args.detector.load()?;
    let mut pool = match args.concurrency {
        Some(limit) => StreamPool::with_concurrency(config, limit)?,
        None => StreamPool::new(config)?,
    };

    let mut sequences: Vec<(StreamId, PathBuf, Vec<PathBuf>)> = Vec::new();
    for dir in &args.input {
        let inputs = frames::list_images(dir)?;
        if inputs.is_empty() {
            warn!(input = %dir.display(), "no images found, skipping");
            continue;
        }
        sequences.push((pool.add_stream()?, dir.clone(), inputs));
    }
    let longest = sequences.iter().map(|(_, _, inputs)| inputs.len()).max().unwrap_or(0);
    info!(streams = sequences.len(), rounds = longest, "starting batch");

    let mut summaries: HashMap<StreamId, Summary> = HashMap::new();
    for round in 0..longest {
        let mut frames_in_round = Vec::with_capacity(sequences.len());
        for (id, _, inputs) in &sequences {
            if let Some(path) = inputs.get(round) {
                frames_in_round.push((*id, frames::load_frame(path, args.size.width, args.size.height)?));
            }
        }
        for (id, result) in pool.process_round(frames_in_round).await {
            match result {
                Ok(report) => summaries.entry(id).or_default().record(&report),
                Err(err) => warn!(stream = id, round, %err, "frame rejected"),
            }
        }
    }

    for (id, dir, _) in &sequences {
        summaries.get(id).copied().unwrap_or_default().log(&dir.display().to_string());
    }
    pool.shutdown().await;
    Ok(())
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("decoding {}", args.input.display()))?
        .to_rgb8();
    let total = (image.width() as u64 * image.height() as u64).max(1);
    let share = |pixels: usize| 100.0 * pixels as f64 / total as f64;

    let probe = CalibrationProbe {
        range: args.range,
        morphology_radius: args.morphology_radius,
    };
    let reading = probe.probe(&image);
    info!(
        range = ?args.range,
        pixels = reading.pixels,
        percent = share(reading.pixels),
        "probed range"
    );
    for (band, range) in reference_bands() {
        let pixels = CalibrationProbe::new(range).probe(&image).pixels;
        info!(band, pixels, percent = share(pixels), "reference band");
    }

    if let Some((x, y)) = args.sample {
        match hsv_at(&image, x, y) {
            Some(hsv) => info!(
                x,
                y,
                hue = hsv.hue,
                hue_degrees = hsv.hue_degrees(),
                saturation = hsv.saturation,
                value = hsv.value,
                "sampled pixel"
            ),
            None => warn!(x, y, "sample lies outside the image"),
        }
    }

    if let Some(out) = &args.output {
        reading
            .mask
            .save(out)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(())
}

fn demo(args: DemoArgs) -> Result<()> {
    let config = args.detector.load()?;
    std::fs::create_dir_all(&args.output).with_context(|| format!("creating {}", args.output.display()))?;

    let flame = FlickeringFlame::new(args.width, args.height);
    let cloth = look_alike_disk(args.width, args.height, LookAlike::Cloth, 35.0);
    let mut flame_detector = FrameProcessor::new(config.clone())?;
    let mut cloth_detector = FrameProcessor::new(config)?;
    let (mut flame_summary, mut cloth_summary) = (Summary::default(), Summary::default());

    for index in 0..args.frames {
        let frame = flame.frame(index);
        let report = flame_detector.process_frame(&frame)?;
        flame_summary.record(&report);
        save_annotated(&args.output, &format!("flame_{index:04}.png"), &frame, &report)?;

        let report = cloth_detector.process_frame(&cloth)?;
        cloth_summary.record(&report);
        save_annotated(&args.output, &format!("cloth_{index:04}.png"), &cloth, &report)?;
    }

    flame_summary.log("synthetic flame");
    cloth_summary.log("red cloth control");
    if flame_summary.first_alert.is_none() {
        warn!("synthetic flame never alerted");
    }
    if cloth_summary.alert_frames > 0 {
        warn!(frames = cloth_summary.alert_frames, "red cloth control alerted");
    }
    Ok(())
}

fn save_annotated(dir: &Path, name: &str, frame: &image::RgbImage, report: &FrameReport) -> Result<()> {
    let out = dir.join(name);
    annotate::annotate(frame, report)
        .save(&out)
        .with_context(|| format!("writing {}", out.display()))
}
