//! provides the manager's tracing setup

use std::path::Path;

use anyhow::Context as _;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Number of rotated log files kept next to the active one
const MAX_LOG_FILES: usize = 7;

/// Initiates the global tracing subscriber.
///
/// Logs always go to stderr. With `log_file`, they are also written to a daily
/// rolling file next to it; keep the returned guard alive to flush it.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let stderr = utils::logging::stderr_layer().with_filter(utils::logging::env_filter());

    let Some(log_file) = log_file else {
        registry().with(stderr).init();
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = log_file
        .file_name()
        .and_then(|f| f.to_str())
        .with_context(|| format!("invalid log file name: {}", log_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(MAX_LOG_FILES)
        .build(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file = layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(utils::logging::env_filter());

    registry().with(stderr).with(file).init();
    Ok(Some(guard))
}
