//! Run orchestration
//!
//! Walks every date of the window (outer loop) and every channel group in
//! configuration order (inner loop), running fetch, extract, diff and persist
//! for each pair. A failing pair is written to the error log and the run moves
//! on; nothing a single pair does can stop the run.

use chrono::{Local, NaiveDate, NaiveDateTime};
use fs2::FileExt;
use log::{error, info, warn};
use std::fs::{self, File};
use std::path::Path;

use crate::artifacts::{read_export, ArtifactLayout};
use crate::browser::Browser;
use crate::config::{DiffBaseConfig, ScrapeConfig};
use crate::db::SyncDb;
use crate::diff::SnapshotDiffer;
use crate::error::{ArtifactError, PairError};
use crate::extract::{ExtractOptions, RecordExtractor};
use crate::fetch::{FetchPolicy, PageFetcher};
use crate::model::{ChannelGroup, PairKey, Snapshot};
use crate::run_log::RunLog;
use crate::schedule::{date_window, run_stamp};

/// Take the exclusive run lock under `output_dir`; held until the file is dropped
pub fn acquire_run_lock(output_dir: &Path) -> Result<File, String> {
    fs::create_dir_all(output_dir).map_err(|e| {
        format!(
            "Failed to create output directory '{}': {}",
            output_dir.display(),
            e
        )
    })?;
    let lock_path = output_dir.join("epg_scrape.lock");
    let lock_file = File::create(&lock_path)
        .map_err(|e| format!("Failed to create lock file '{}': {}", lock_path.display(), e))?;
    lock_file.try_lock_exclusive().map_err(|_| {
        format!(
            "Another run is already writing to '{}'. Lock file: {}",
            output_dir.display(),
            lock_path.display()
        )
    })?;
    Ok(lock_file)
}

/// Extraction settings for one channel group
pub fn extract_options(config: &ScrapeConfig, group: &ChannelGroup) -> ExtractOptions {
    ExtractOptions {
        site_origin: config.site_origin.clone(),
        line_count: group.line_count,
        timestamp_policy: config.timestamp_policy,
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// What happened to one successfully processed pair
#[derive(Debug)]
pub struct PairReport {
    pub key: PairKey,
    pub records: usize,
    pub sparse: bool,
    pub changes: usize,
    /// False on the first run for this key
    pub had_baseline: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<PairReport>,
    pub failures: Vec<(PairKey, String)>,
}

impl RunSummary {
    pub fn pairs(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    pub fn records(&self) -> usize {
        self.reports.iter().map(|r| r.records).sum()
    }

    pub fn anomalies(&self) -> usize {
        self.reports.iter().filter(|r| r.sparse).count()
    }

    pub fn changed_pairs(&self) -> usize {
        self.reports.iter().filter(|r| r.changes > 0).count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct RunOrchestrator<'a> {
    config: &'a ScrapeConfig,
    store: &'a SyncDb,
    layout: ArtifactLayout,
    baseline: Option<ArtifactLayout>,
    error_log: RunLog,
    diff_log: RunLog,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(config: &'a ScrapeConfig, store: &'a SyncDb) -> Result<Self, ArtifactError> {
        let stamp = config.timestamped_html.then(|| run_stamp(now()));
        let layout = ArtifactLayout::new(&config.output_dir)
            .with_region(config.region.clone())
            .with_run_stamp(stamp);
        let baseline = match &config.diff_base {
            DiffBaseConfig::Overwrite => None,
            DiffBaseConfig::PreviousRun { dir } => Some(ArtifactLayout::new(dir)),
        };

        Ok(Self {
            config,
            store,
            layout,
            baseline,
            error_log: RunLog::open(config.error_log_path())?,
            diff_log: RunLog::open(config.diff_log_path())?,
        })
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Process the whole date window around `today`
    pub fn run(&self, browser: &mut dyn Browser, today: NaiveDate) -> RunSummary {
        let dates = date_window(today, self.config.days_back, self.config.days_ahead);
        let groups = self.config.channel_groups();
        let mut summary = RunSummary::default();

        info!(
            "Run over {} dates x {} groups ({} to {})",
            dates.len(),
            groups.len(),
            dates[0],
            dates[dates.len() - 1]
        );

        for date in dates {
            for group in &groups {
                let key = PairKey::new(group.key.clone(), date);
                match self.process_pair(browser, group, date) {
                    Ok(report) => summary.reports.push(report),
                    Err(err) => {
                        error!("[{}] failed: {}", key, err);
                        self.record_failure(&key, &group.url_for(date), &err);
                        summary.failures.push((key, err.to_string()));
                    }
                }
            }
        }

        info!(
            "Run finished: {} pairs, {} failed, {} records, {} anomalies, {} with changes",
            summary.pairs(),
            summary.failures.len(),
            summary.records(),
            summary.anomalies(),
            summary.changed_pairs()
        );
        summary
    }

    /// Fetch, extract, diff and persist one pair
    pub fn process_pair(
        &self,
        browser: &mut dyn Browser,
        group: &ChannelGroup,
        date: NaiveDate,
    ) -> Result<PairReport, PairError> {
        let key = PairKey::new(group.key.clone(), date);
        let fetcher = PageFetcher::new(FetchPolicy::from_config(self.config), &self.layout);
        let page = fetcher.fetch(browser, group, date)?;

        let extractor = RecordExtractor::new(extract_options(self.config, group));
        let extraction = extractor.extract(&page.markup);
        let sparse = extraction.is_sparse(self.config.min_records);
        let snapshot = extraction.snapshot;

        if sparse {
            warn!(
                "[{}] only {} records (expected at least {})",
                key,
                snapshot.len(),
                self.config.min_records
            );
            self.append_or_warn(
                &self.error_log,
                &key,
                &format!("URL: {} - anomaly: {} records", page.url, snapshot.len()),
            );
        }

        let prior = self.load_baseline(&key, &page.url);
        let outcome = SnapshotDiffer::new(&self.layout, &self.diff_log).compare(
            &key,
            &snapshot,
            prior.as_ref(),
            now(),
        )?;

        let export = self.layout.write_export(&key, &snapshot)?;
        info!("[{}] {} records written to {}", key, snapshot.len(), export.display());

        self.store
            .upsert_snapshot(&snapshot, now(), !self.config.preserve_review_flags)?;

        Ok(PairReport {
            key,
            records: snapshot.len(),
            sparse,
            changes: outcome.change_count(),
            had_baseline: prior.is_some(),
        })
    }

    /// Prior snapshot for `key`; an unreadable one is logged and treated as absent
    fn load_baseline(&self, key: &PairKey, url: &str) -> Option<Snapshot> {
        let layout = self.baseline.as_ref().unwrap_or(&self.layout);
        match read_export(&layout.export_path(key)) {
            Ok(prior) => prior,
            Err(e) => {
                warn!("[{}] ignoring unreadable baseline: {}", key, e);
                self.append_or_warn(
                    &self.error_log,
                    key,
                    &format!("URL: {} - unreadable baseline: {}", url, e),
                );
                None
            }
        }
    }

    fn record_failure(&self, key: &PairKey, url: &str, err: &PairError) {
        self.append_or_warn(
            &self.error_log,
            key,
            &format!("URL: {} - Failed: {}", url, err),
        );
    }

    fn append_or_warn(&self, log: &RunLog, key: &PairKey, description: &str) {
        if let Err(e) = log.append(now(), key, description) {
            error!("[{}] could not write to {}: {}", key, log.path().display(), e);
        }
    }
}
