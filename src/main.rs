use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;

use epg_scrape::artifacts::ArtifactLayout;
use epg_scrape::browser::{BrowserSession, HttpBrowser};
use epg_scrape::config::ScrapeConfig;
use epg_scrape::db::SyncDb;
use epg_scrape::extract::RecordExtractor;
use epg_scrape::pipeline::{acquire_run_lock, extract_options, RunOrchestrator};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape TV program guide pages into CSV exports and SQLite")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, extract, diff and persist every (group, date) pair of the window
    Run {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Reference date (YYYY-MM-DD) instead of the local date
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Extract records from a saved page and print them as CSV
    Extract {
        /// Saved guide page
        html_file: PathBuf,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Channel group whose line count applies
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Create the program store schema
    InitDb {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Run { config, today } => run(config, today),
        Command::Extract {
            html_file,
            config,
            group,
        } => extract(html_file, config, group),
        Command::InitDb { config } => init_db(config),
    }
}

fn run(config_path: PathBuf, today: Option<NaiveDate>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScrapeConfig::load(&config_path)?;
    let _lock = acquire_run_lock(&config.output_dir)?;

    let store = SyncDb::open(&config.database_path())?;
    let orchestrator = RunOrchestrator::new(&config, &store)?;
    let mut browser = BrowserSession::new(HttpBrowser::new(config.request_timeout())?);

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let summary = orchestrator.run(&mut *browser, today);
    drop(browser);
    drop(orchestrator);
    store.close();

    if summary.has_failures() {
        for (key, reason) in &summary.failures {
            error!("{}: {}", key, reason);
        }
        return Err(format!(
            "{} of {} pairs failed",
            summary.failures.len(),
            summary.pairs()
        )
        .into());
    }
    Ok(())
}

fn extract(
    html_file: PathBuf,
    config_path: Option<PathBuf>,
    group_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => ScrapeConfig::load(&path)?,
        None => ScrapeConfig::default(),
    };
    let groups = config.channel_groups();
    let group = match group_key {
        Some(key) => groups
            .iter()
            .find(|g| g.key == key)
            .ok_or_else(|| format!("Unknown channel group '{}'", key))?,
        None => groups.first().ok_or("No channel groups configured")?,
    };

    let markup = std::fs::read_to_string(&html_file)
        .map_err(|e| format!("Failed to read '{}': {}", html_file.display(), e))?;
    let extraction = RecordExtractor::new(extract_options(&config, group)).extract(&markup);
    info!(
        "Extracted {} records from {} ({} lines missing)",
        extraction.snapshot.len(),
        html_file.display(),
        extraction.missing_lines.len()
    );

    let layout = ArtifactLayout::new(&config.output_dir).with_region(config.region.clone());
    let bytes = layout.render_export(&extraction.snapshot)?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}

fn init_db(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScrapeConfig::load(&config_path)?;
    let path = config.database_path();
    let store = SyncDb::open(&path)?;
    info!(
        "Program store ready at {} ({} rows)",
        path.display(),
        store.count_programs()?
    );
    store.close();
    Ok(())
}
