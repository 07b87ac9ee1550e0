//! Stderr logger for the tracking binaries.
//!
//! Output format is `[elapsed LEVEL thread] target: message`. Frames move
//! between producer, worker and publisher threads, so every line names the
//! thread that wrote it. Records from crates other than `marker_pose*` (image
//! decoders and the like) are only shown at `warn` and above.

use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Ceiling for records whose target is not one of ours.
const FOREIGN_LEVEL: LevelFilter = LevelFilter::Warn;

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn passes(&self, level: Level, target: &str) -> bool {
        let limit = if target.starts_with("marker_pose") {
            self.level
        } else {
            self.level.min(FOREIGN_LEVEL)
        };
        level <= limit
    }
}

fn write_line(out: &mut impl Write, elapsed: f64, thread: &str, record: &Record) -> io::Result<()> {
    writeln!(
        out,
        "[{:8.3}s {:>5} {}] {}: {}",
        elapsed,
        record.level(),
        thread,
        record.target(),
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes(metadata.level(), metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let elapsed = self.started.elapsed().as_secs_f64();
        let _ = write_line(
            &mut io::stderr().lock(),
            elapsed,
            thread.name().unwrap_or("-"),
            record,
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls return `Ok(())` and
/// keep the original level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Span close events carry timings, which is how per-frame detection cost
/// shows up in the output.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_names(true)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_names(true)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_targets_are_capped_at_warn() {
        let logger = StderrLogger {
            level: LevelFilter::Debug,
            started: Instant::now(),
        };
        assert!(logger.passes(Level::Debug, "marker_pose_aruco::detector"));
        assert!(!logger.passes(Level::Trace, "marker_pose::service"));
        assert!(!logger.passes(Level::Info, "image::codecs::png"));
        assert!(logger.passes(Level::Warn, "image::codecs::png"));

        let quiet = StderrLogger {
            level: LevelFilter::Error,
            started: Instant::now(),
        };
        assert!(!quiet.passes(Level::Warn, "image"));
        assert!(!quiet.passes(Level::Warn, "marker_pose"));
    }

    #[test]
    fn line_names_thread_and_target() {
        let mut buf = Vec::new();
        write_line(
            &mut buf,
            1.5,
            "marker-pose-worker",
            &Record::builder()
                .args(format_args!("frame {}", 3))
                .level(Level::Info)
                .target("marker_pose::service")
                .build(),
        )
        .expect("write to vec");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "[   1.500s  INFO marker-pose-worker] marker_pose::service: frame 3\n"
        );
    }

    #[test]
    fn repeated_init_is_ok_and_errors_box() {
        let first: Result<(), Box<dyn std::error::Error>> =
            init_with_level(LevelFilter::Warn).map_err(Into::into);
        assert!(first.is_ok());
        assert!(init_with_level(LevelFilter::Debug).is_ok());
    }
}
