//! One fetch → extract → diff → notify pass, and the fixed-cadence loop around it

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::diff::{check_difference, ChangeEntry, StateError};
use crate::extract::{extract_snapshot, ExtractError};
use crate::fetch::{FetchError, PageSource};
use crate::notify::{compose_body, NotifyError};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("page acquisition failed")]
    Fetch(#[from] FetchError),

    #[error("table extraction failed")]
    Extract(#[from] ExtractError),

    #[error("snapshot state failed")]
    State(#[from] StateError),

    #[error("notification failed")]
    Notify(#[from] NotifyError),
}

impl CycleError {
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch",
            CycleError::Extract(e) if e.is_missing_table() => "extract: no table found",
            CycleError::Extract(_) => "extract: index/parse error",
            CycleError::State(_) => "state",
            CycleError::Notify(_) => "notify",
        }
    }

    /// This error and every underlying cause, outermost first
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            parts.push(cause.to_string());
            source = cause.source();
        }
        parts.join(": ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    NoChanges,
    Notified { entries: usize },
    DryRun { entries: usize },
}

/// Run one cycle. `send` is only called when there are changes and this is not a dry run.
pub fn run_cycle<F>(settings: &Settings, source: &dyn PageSource, send: F) -> Result<CycleOutcome, CycleError>
where
    F: FnOnce(&Settings, &[ChangeEntry]) -> Result<(), NotifyError>,
{
    let html = source.page_source(&settings.url)?;
    let snapshot = extract_snapshot(&html)?;
    let entries = check_difference(&settings.data_file, &snapshot)?;

    if entries.is_empty() {
        return Ok(CycleOutcome::NoChanges);
    }

    if settings.dry_run {
        info!(subject = %settings.subject, body = %compose_body(&entries), "Dry run, email not sent");
        return Ok(CycleOutcome::DryRun {
            entries: entries.len(),
        });
    }

    send(settings, &entries)?;
    Ok(CycleOutcome::Notified {
        entries: entries.len(),
    })
}

/// Run one cycle and log how it ended
pub fn run_logged<F>(settings: &Settings, source: &dyn PageSource, send: F) -> Result<CycleOutcome, CycleError>
where
    F: FnOnce(&Settings, &[ChangeEntry]) -> Result<(), NotifyError>,
{
    let result = run_cycle(settings, source, send);
    match &result {
        Ok(outcome) => info!(?outcome, "Cycle finished"),
        Err(e) => error!(stage = e.stage(), error = %e.chain(), "Cycle failed"),
    }
    result
}

/// Single-threaded runtime plus a ticker that fires now and then every
/// `interval`; ticks missed while a cycle overruns are dropped
pub fn ticker(interval: Duration) -> io::Result<(Runtime, Interval)> {
    let runtime = Builder::new_current_thread().enable_time().build()?;
    let ticker = runtime.block_on(async {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    Ok((runtime, ticker))
}

/// Run a cycle now, then on every interval tick.
///
/// Failed cycles are logged and the next tick still runs. The cycle itself
/// runs outside the runtime so page sources can drive their own.
pub fn run_scheduled<F>(settings: &Settings, source: &dyn PageSource, send: F) -> io::Result<()>
where
    F: Fn(&Settings, &[ChangeEntry]) -> Result<(), NotifyError>,
{
    let (runtime, mut ticker) = ticker(settings.interval)?;

    loop {
        let tick = runtime.block_on(ticker.tick());
        let _ = run_logged(settings, source, &send);

        let spent = tick.elapsed();
        if spent >= settings.interval {
            warn!(spent_secs = spent.as_secs(), "Cycle overran the interval, skipping missed runs");
        } else if let Ok(wait) = chrono::Duration::from_std(settings.interval - spent) {
            info!(next_run = %(Local::now() + wait).format("%Y-%m-%d %H:%M:%S"), "Waiting for next cycle");
        }
    }
}
