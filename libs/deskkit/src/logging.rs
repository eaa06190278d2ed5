//! Logging setup: console plus a daily rolling file in the application's log directory.

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppInfo, DEFAULT_LOG_FILE, LoggingConfig};

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to create log directory")]
    Io(#[from] std::io::Error),

    #[error("failed to open log file")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("logging is already initialized")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the background file writer alive; flushes on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `config.level`. The file sink writes `log.<date>.log` files into
/// `info.log_dir`, keeping at most `config.max_files`.
///
/// # Errors
/// Returns [`LoggingError`] if the filter is invalid, the log directory cannot be created,
/// or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, info: &AppInfo) -> Result<LoggingGuard, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let console = config
        .console
        .then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));

    let (file, guard) = if config.file {
        std::fs::create_dir_all(&info.log_dir)?;
        let (prefix, suffix) = DEFAULT_LOG_FILE
            .rsplit_once('.')
            .unwrap_or((DEFAULT_LOG_FILE, "log"));
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix(suffix)
            .max_log_files(config.max_files)
            .build(&info.log_dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::info!(
        app = %info.title_version(),
        log_dir = %info.log_dir.display(),
        "Logging initialized"
    );
    Ok(LoggingGuard { _file: guard })
}
