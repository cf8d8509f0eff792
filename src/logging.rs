use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "vocab-srs.log";

/// Keeps the non-blocking file writer alive; drop it last.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Installs the global subscriber: stdout always, plus a daily rolling file
/// under `config.dir` when file logs are on. An unusable directory degrades
/// to stdout only.
pub fn init_tracing(config: &LoggingConfig) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guard = None;
    let file_layer = if config.file_logs {
        match std::fs::create_dir_all(&config.dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, &config.dir, LOG_FILE_PREFIX);
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(FileLogGuard { _guard: file_guard });
                Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
            }
            Err(err) => {
                eprintln!("failed to create log directory {}: {err}", config.dir.display());
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    if guard.is_some() {
        tracing::info!(log_dir = %config.dir.display(), "File logging enabled");
    }
    guard
}
