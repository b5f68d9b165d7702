//! Process-wide tracing setup.

use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_PREFIX: &str = "farmstead.log";

/// Keeps the file writer flushing for the life of the process.
static LOG_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Install the global subscriber, filtered by `RUST_LOG` (default `info`).
///
/// With `log_dir`, events go to a daily-rolled file there; otherwise to
/// stderr. Only the first call has an effect.
pub fn init_logging_for(log_dir: Option<&Path>) -> FarmsteadResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                FarmsteadError::Config(format!(
                    "failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init();
            installed.is_ok().then_some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init();
            None
        }
    };

    // A subscriber installed elsewhere first wins; ours is then dropped.
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
