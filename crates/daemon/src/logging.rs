use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the rolling log under `--log-dir`.
pub const LOG_FILE_PREFIX: &str = "padsync.log";

/// Install the global subscriber.
///
/// Human-readable output goes to stderr. `RUST_LOG` overrides `level`. With
/// `log_dir` set, a daily rolling file receives the same events; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init(level: Level, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, TryInitError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
