//! Logging to a size-rotated file plus stdout.
//!
//! Every line carries timestamp, level, the enclosing function span,
//! target, source file and line.
//! `RUST_LOG` overrides the filter; otherwise `DEBUG_LOGGING=1` turns on
//! debug output for this crate.

use std::path::Path;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Plain-text layer used for the log file
pub fn file_layer<S, W>(writer: W) -> fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
}

fn filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if std::env::var("DEBUG_LOGGING").is_ok() {
        EnvFilter::new("info,case_watch=debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Initialize logging; keep the returned guard alive until exit so buffered lines get flushed.
///
/// Falls back to stdout only when the log file can't be opened.
pub fn init(log_file: &Path) -> Option<WorkerGuard> {
    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {:?}: {}, using stdout only", dir, e);
            init_stdout_only();
            return None;
        }
    }

    let appender = match BasicRollingFileAppender::new(
        log_file,
        RollingConditionBasic::new().max_size(MAX_LOG_SIZE),
        1,
    ) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Failed to create log file at {:?}: {}", log_file, e);
            init_stdout_only();
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(file_layer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .with(filter())
        .init();

    tracing::info!(log_file = ?log_file, "Logging initialized");
    Some(guard)
}

fn init_stdout_only() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .with(filter())
        .init();

    tracing::info!("Logging initialized (stdout only)");
}
