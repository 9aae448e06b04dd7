//! Logging configuration using tracing
//!
//! The daemon has no terminal to write to, so everything goes to a daily
//! rolling file named `herder.<date>.log`. Only the last week is kept.

use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "HERDER_LOG";

const DEFAULT_FILTER: &str = "herder=info,herder_daemon=info,warn";
const FILE_PREFIX: &str = "herder";
const FILE_SUFFIX: &str = "log";
const KEEP_FILES: usize = 7;

/// Initialize the logging subsystem and return the log directory.
///
/// Logs are written to `~/.local/share/herder/logs/` unless `dir` is given.
/// Log level is controlled by the `HERDER_LOG` environment variable.
///
/// # Examples
/// ```bash
/// HERDER_LOG=debug herder
/// HERDER_LOG=herder_daemon=trace herder
/// ```
pub fn init(dir: Option<PathBuf>) -> Result<PathBuf> {
    let log_dir = match dir {
        Some(dir) => dir,
        None => default_log_directory(),
    };
    let appender = file_appender(&log_dir)?;

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .try_init()
        .map_err(|e| Error::config(format!("Logging already initialized: {e}")))?;

    Ok(log_dir)
}

fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("herder")
        .join("logs")
}

/// Daily `herder.<date>.log` files in `dir`, created if missing
fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix(FILE_SUFFIX)
        .max_log_files(KEEP_FILES)
        .build(dir)
        .map_err(|e| Error::config(format!("Cannot log to {}: {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_appender_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");

        let mut appender = file_appender(&logs).unwrap();
        appender.write_all(b"line\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("herder."), "{names:?}");
        assert!(names[0].ends_with(".log"), "{names:?}");
    }

    #[test]
    fn test_default_directory_is_namespaced() {
        assert!(default_log_directory().ends_with("herder/logs"));
    }
}
