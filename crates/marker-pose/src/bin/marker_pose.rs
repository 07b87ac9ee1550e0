//! marker-pose CLI: run the tracker over an image sequence.

use clap::Parser;
use log::LevelFilter;
use marker_pose::core::{OwnedImage, PixelFormat};
use marker_pose::{FilteredPose, MarkerTracker, SequenceConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "marker-pose")]
#[command(about = "Detect ArUco markers in an image sequence and print filtered poses (JSON)")]
#[command(version)]
struct Cli {
    /// Sequence config (JSON): tracker settings, intrinsics and frame rate.
    config: PathBuf,

    /// Frames, in capture order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines (tracing builds only).
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

#[derive(Serialize)]
struct FrameReport {
    frame: usize,
    image: String,
    timestamp: f64,
    poses: Vec<FilteredPose>,
}

#[derive(Serialize)]
struct Report {
    config: SequenceConfig,
    frames: Vec<FrameReport>,
}

fn load_frame(path: &Path) -> CliResult<OwnedImage> {
    let img = image::open(path)
        .map_err(|e| -> CliError { format!("failed to open {}: {e}", path.display()).into() })?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok(OwnedImage::packed(
        w as usize,
        h as usize,
        PixelFormat::Rgb8,
        img.into_raw(),
    ))
}

/// `--json-logs` or `RUST_LOG` select the tracing subscriber when built with
/// `tracing`; otherwise the plain stderr logger is installed.
fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        if cli.json_logs || std::env::var_os("RUST_LOG").is_some() {
            marker_pose::core::init_tracing(cli.json_logs);
            return Ok(());
        }
    }
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    marker_pose::core::init_with_level(level)?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = SequenceConfig::load_json(&cli.config)?;
    config.validate()?;
    let mut tracker = MarkerTracker::new(config.tracker.clone())?;
    log::info!(
        "tracking {} frames at {} fps, ids {:?}",
        cli.images.len(),
        config.fps,
        config.tracker.allowed_ids
    );

    let mut frames = Vec::with_capacity(cli.images.len());
    for (index, path) in cli.images.iter().enumerate() {
        let image = load_frame(path)?;
        let timestamp = index as f64 / config.fps;
        let poses = tracker.process(&image.view(), &config.intrinsics, timestamp);
        log::debug!("{}: {} markers", path.display(), poses.len());
        frames.push(FrameReport {
            frame: index,
            image: path.display().to_string(),
            timestamp,
            poses,
        });
    }

    let detected = frames.iter().filter(|f| !f.poses.is_empty()).count();
    log::info!("markers found in {detected}/{} frames", frames.len());

    let json = serde_json::to_string_pretty(&Report { config, frames })?;
    match cli.out {
        Some(out) => {
            std::fs::write(&out, json)?;
            log::info!("report written to {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
