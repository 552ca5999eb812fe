use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

mod cycle;
mod diff;
mod extract;
mod fetch;
mod logging;
mod notify;
mod settings;
mod types;

use fetch::{BrowserPageSource, HttpPageSource, PageSource};
use settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetcherKind {
    /// Headless Chrome; expands the collapsed table before reading the page
    Browser,
    /// Plain HTTP GET of the static markup
    Http,
}

#[derive(Parser)]
#[command(name = "case-watch")]
#[command(about = "Covid-19 dashboard scraper that emails case-count changes")]
struct Cli {
    /// Path to config file containing Gmail login credentials
    #[arg(long, default_value = "./config.json")]
    file: PathBuf,

    /// Snapshot of the last seen case counts
    #[arg(long, default_value = "./data.json")]
    data: PathBuf,

    /// Log file (rotated at 10 MB)
    #[arg(long, default_value = "./file.log")]
    log_file: PathBuf,

    /// How to obtain the dashboard markup
    #[arg(long, value_enum, default_value_t = FetcherKind::Browser)]
    fetcher: FetcherKind,

    /// Minutes between cycles
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    interval_minutes: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log the email instead of sending it
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            data_file: self.data.clone(),
            credentials_file: self.file.clone(),
            interval: Duration::from_secs(self.interval_minutes * 60),
            dry_run: self.dry_run,
            ..Settings::default()
        }
    }
}

fn page_source(kind: FetcherKind, settings: &Settings) -> Result<Box<dyn PageSource>> {
    Ok(match kind {
        FetcherKind::Browser => Box::new(BrowserPageSource::new(&settings.toggle_class)),
        FetcherKind::Http => Box::new(HttpPageSource::new().context("Failed to set up HTTP fetcher")?),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&cli.log_file);

    let settings = cli.settings();
    let source = page_source(cli.fetcher, &settings)?;
    info!(url = %settings.url, data = %settings.data_file.display(), fetcher = ?cli.fetcher, "Starting");

    if cli.once {
        cycle::run_logged(&settings, source.as_ref(), notify::notify).context("Cycle failed")?;
        return Ok(());
    }

    cycle::run_scheduled(&settings, source.as_ref(), notify::notify).context("Failed to start scheduler")
}
