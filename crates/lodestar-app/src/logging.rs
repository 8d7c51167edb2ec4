//! Log sink setup.
//!
//! A `tracing-subscriber` registry with a console layer and an optional
//! plain-text file layer. `RUST_LOG` overrides the configured level.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use lodestar_core::LogLevel;
use parking_lot::{Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Where and how much to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Mirror console output into this file.
    pub logfile: Option<PathBuf>,
    /// Show error dialogs. Accepted for compatibility; no dialog sink exists.
    pub popups: bool,
}

/// Filter directive for a log level.
pub fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Disable => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::All => "trace",
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(level)))
}

/// File shared by every event written through the file layer.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<File>>);

struct SharedFileGuard<'a>(MutexGuard<'a, File>);

impl Write for SharedFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard(self.0.lock())
    }
}

/// Install the global subscriber.
///
/// Fails if the log file cannot be created or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let file_layer = match &config.logfile {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(SharedFile(Arc::new(Mutex::new(file)))),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(config.level))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    if config.popups && cfg!(target_os = "windows") {
        tracing::debug!("Popup notifications requested but not available, using console");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_thresholds() {
        assert_eq!(filter_directive(LogLevel::Disable), "off");
        assert_eq!(filter_directive(LogLevel::Error), "error");
        assert_eq!(filter_directive(LogLevel::Warn), "warn");
        assert_eq!(filter_directive(LogLevel::Info), "info");
        assert_eq!(filter_directive(LogLevel::All), "trace");
    }

    #[test]
    fn file_writer_appends() {
        let path = std::env::temp_dir().join(format!("lodestar-log-{}.txt", std::process::id()));
        let shared = SharedFile(Arc::new(Mutex::new(File::create(&path).unwrap())));

        shared.make_writer().write_all(b"first\n").unwrap();
        shared.make_writer().write_all(b"second\n").unwrap();
        drop(shared);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        std::fs::remove_file(path).unwrap();
    }
}
