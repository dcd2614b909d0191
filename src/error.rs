//! Error types for the scrape pipeline
//!
//! Each stage has its own error enum; `PairError` is what the orchestrator
//! records when one (channel group, date) pair fails.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the browser-automation collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// Transport or navigation failure (connection refused, DNS, 5xx)
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The page did not become ready in time
    #[error("render timed out: {0}")]
    RenderTimeout(String),

    /// Anything else; never assumed to be transient
    #[error("unexpected browser error: {0}")]
    Unclassified(String),
}

impl BrowserError {
    /// Transient failures are retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::Navigation(_) | BrowserError::RenderTimeout(_)
        )
    }
}

/// Page retrieval failure for one (channel group, date) pair
#[derive(Error, Debug)]
pub enum FetchError {
    /// Every attempt failed with a transient error
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: BrowserError,
    },

    /// An unclassified error stopped retrying immediately
    #[error("aborted {url}: {source}")]
    Fatal {
        url: String,
        #[source]
        source: BrowserError,
    },

    /// Markup was retrieved but could not be written as an artifact
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// A raw timestamp token that is not `YYYYMMDDHHMM`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("malformed timestamp token '{0}'")]
    Malformed(String),
}

/// Filesystem artifact failure
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ArtifactError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ArtifactError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Relational store failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database schema version {found} does not match expected {expected}")]
    SchemaVersion { found: String, expected: String },
}

/// Failure of one (channel group, date) pair, as recorded in the error log
#[derive(Error, Debug)]
pub enum PairError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("artifact failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}
