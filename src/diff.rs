use chrono::NaiveDateTime;
use log::info;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::artifacts::ArtifactLayout;
use crate::error::ArtifactError;
use crate::model::{DiffMarker, DiffRecord, PairKey, ProgramRecord, Snapshot};
use crate::run_log::RunLog;

/// Symmetric difference of two snapshots, compared on every field
///
/// Records only in `new` come first (in `new` order) marked `New`, then
/// records only in `prior` (in `prior` order) marked `Removed`.
pub fn diff_snapshots(new: &Snapshot, prior: &Snapshot) -> Vec<DiffRecord> {
    let prior_set: HashSet<&ProgramRecord> = prior.iter().collect();
    let new_set: HashSet<&ProgramRecord> = new.iter().collect();

    let added = new
        .iter()
        .filter(|r| !prior_set.contains(r))
        .map(|r| DiffRecord {
            record: r.clone(),
            marker: DiffMarker::New,
        });
    let removed = prior
        .iter()
        .filter(|r| !new_set.contains(r))
        .map(|r| DiffRecord {
            record: r.clone(),
            marker: DiffMarker::Removed,
        });
    added.chain(removed).collect()
}

#[derive(Debug)]
pub enum DiffOutcome {
    /// Nothing to compare against; first run for this key
    NoBaseline,
    Unchanged,
    Changed {
        diffs: Vec<DiffRecord>,
        artifact: PathBuf,
    },
}

impl DiffOutcome {
    pub fn change_count(&self) -> usize {
        match self {
            DiffOutcome::Changed { diffs, .. } => diffs.len(),
            _ => 0,
        }
    }
}

/// Compares snapshots and records any difference as an artifact plus a log line
pub struct SnapshotDiffer<'a> {
    layout: &'a ArtifactLayout,
    log: &'a RunLog,
}

impl<'a> SnapshotDiffer<'a> {
    pub fn new(layout: &'a ArtifactLayout, log: &'a RunLog) -> Self {
        Self { layout, log }
    }

    pub fn compare(
        &self,
        key: &PairKey,
        new: &Snapshot,
        prior: Option<&Snapshot>,
        at: NaiveDateTime,
    ) -> Result<DiffOutcome, ArtifactError> {
        let Some(prior) = prior else {
            return Ok(DiffOutcome::NoBaseline);
        };

        let diffs = diff_snapshots(new, prior);
        if diffs.is_empty() {
            return Ok(DiffOutcome::Unchanged);
        }

        let artifact = self.layout.write_diff(key, &diffs, at)?;
        self.log
            .append(at, key, &format!("{} changes", diffs.len()))?;
        info!("{}: {} changes written to {}", key, diffs.len(), artifact.display());
        Ok(DiffOutcome::Changed { diffs, artifact })
    }
}
