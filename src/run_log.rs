use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::constants::LOG_TIMESTAMP_FORMAT;
use crate::error::ArtifactError;
use crate::model::PairKey;

/// Append-only text log, one line per event:
/// `<timestamp> - <group>_<yyyymmdd> - <description>`
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Create the log file (and its directory) if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ArtifactError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        at: NaiveDateTime,
        key: &PairKey,
        description: &str,
    ) -> Result<(), ArtifactError> {
        let line = format!(
            "{} - {} - {}\n",
            at.format(LOG_TIMESTAMP_FORMAT),
            key,
            description.replace('\n', " ")
        );
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| ArtifactError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ArtifactError::io(&self.path, e))
    }
}
