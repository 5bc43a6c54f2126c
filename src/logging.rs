//! Rotating file sink with optional duplication to standard output.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Retained rotated files; older ones are deleted.
const MAX_LOG_FILES: usize = 5;

/// Install the global subscriber: rotating file sink, optional console
/// duplication. The returned guard must be held for the life of the
/// process; dropping it stops the background log writer.
pub fn init(log_file: &Path, level: Level, console: bool) -> Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let prefix = log_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("ijs");

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("failed to open log file under {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    let registry = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(file_layer);

    if console {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
            .init();
    } else {
        registry.init();
    }

    info!("logging initialized successfully");
    info!(level = %level, "log level applied");
    info!(
        dir = %dir.display(),
        prefix,
        rotation = "daily",
        max_files = MAX_LOG_FILES,
        "logger configuration"
    );
    Ok(guard)
}

/// Map a verbosity flag to a level. Unknown values fall back to `info`
/// with a warning; `fatal` and `panic` collapse onto `error`, the most
/// severe level the subscriber knows.
pub fn parse_level(value: &str) -> Level {
    match value {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" | "fatal" | "panic" => Level::ERROR,
        other => {
            eprintln!("Invalid verbose level: {other}. Defaulting to 'info'.");
            Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn fatal_and_panic_collapse_to_error() {
        assert_eq!(parse_level("fatal"), Level::ERROR);
        assert_eq!(parse_level("panic"), Level::ERROR);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("chatty"), Level::INFO);
    }
}
