//! Optional tracing bootstrap for embedders that do not install their own
//! subscriber. Initialization goes through `try_init`, so a host
//! application's subscriber always wins.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing. Hold it for the process
/// lifetime when file logging is on.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// `EnvFilter` directive string, e.g. `"info"` or `"examcore=debug"`.
    pub filter: String,
    /// Daily-rolling `engine.log` files land here when set.
    pub file_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file_dir: None,
        }
    }
}

impl LogOptions {
    /// `ENGINE_LOG` sets the filter, `ENGINE_LOG_DIR` turns on file output.
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("ENGINE_LOG").unwrap_or_else(|_| "info".to_string()),
            file_dir: std::env::var("ENGINE_LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

pub fn init_tracing(options: &LogOptions) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&options.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    if let Some(dir) = &options.file_dir {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, dir, "engine.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);

                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer)
                    .try_init();
                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => {
                eprintln!("failed to create log directory {}: {err}", dir.display());
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();
    None
}
