//! Logging and tracing configuration
//!
//! The CLI always logs to stderr. A run can additionally keep a full-detail
//! log file next to its snapshots so a failed overnight test can be replayed.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Keeps the background log writer alive; drop it only at process exit
pub struct LogGuard {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ctrltest=info,warn"))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(stderr_layer())
        .init();
}

/// Initialize tracing for a named run (stderr + `<data dir>/logs/<run>.log`)
///
/// Falls back to stderr-only logging when the log directory is unavailable.
pub fn init_run(run_name: &str) -> Option<LogGuard> {
    let log_dir = paths::log_dir().and_then(|dir| paths::ensure_dir(&dir).ok());

    let Some(log_dir) = log_dir else {
        init_cli();
        return None;
    };

    let file_name = format!("{}.log", run_name);
    let appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stderr_layer())
        .init();

    Some(LogGuard {
        path: log_dir.join(file_name),
        _guard: guard,
    })
}
