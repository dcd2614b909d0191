use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One broadcast slot extracted from the guide
///
/// `(channel_id, start_time, program_title)` is unique within a snapshot and
/// is the natural key of the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub channel_id: String,
    pub channel_name: String,
    pub start_time: String,
    pub end_time: String,
    pub program_title: String,
    pub program_detail: String,
    pub link: String,
}

impl ProgramRecord {
    /// Field values in export column order
    pub fn fields(&self) -> [&str; 7] {
        [
            &self.channel_id,
            &self.channel_name,
            &self.start_time,
            &self.end_time,
            &self.program_title,
            &self.program_detail,
            &self.link,
        ]
    }
}

/// All records extracted from one retrieval, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Vec<ProgramRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<ProgramRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProgramRecord> {
        self.records.iter()
    }
}

/// A source category of the guide with its own URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    /// Short key used in paths and log lines (e.g. "td", "bs")
    pub key: String,
    /// URL with a `{date}` placeholder substituted as YYYYMMDD
    pub url_template: String,
    /// Number of `program_line_N` containers to look for
    pub line_count: usize,
}

impl ChannelGroup {
    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template
            .replace("{date}", &date.format("%Y%m%d").to_string())
    }
}

/// Identifies one (channel group, date) pair of a run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub group: String,
    pub date: NaiveDate,
}

impl PairKey {
    pub fn new(group: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            group: group.into(),
            date,
        }
    }

    /// Date as used in file names and URLs
    pub fn date_compact(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.group, self.date_compact())
    }
}

/// Which side of a snapshot comparison a record was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffMarker {
    /// Only in the new snapshot
    New,
    /// Only in the prior snapshot
    Removed,
}

impl DiffMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffMarker::New => "new",
            DiffMarker::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    pub record: ProgramRecord,
    pub marker: DiffMarker,
}

/// A program row as stored in the relational store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedProgram {
    pub record: ProgramRecord,
    pub is_confirmed: bool,
    pub is_changed: bool,
    pub last_updated: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_substitutes_compact_date() {
        let group = ChannelGroup {
            key: "bs".to_string(),
            url_template: "https://bangumi.org/epg/bs?broad_cast_date={date}".to_string(),
            line_count: 12,
        };
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(
            group.url_for(date),
            "https://bangumi.org/epg/bs?broad_cast_date=20250109"
        );
    }

    #[test]
    fn test_pair_key_display() {
        let key = PairKey::new("td", NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(key.to_string(), "td_20251231");
    }
}
