//! On-disk artifacts of a run
//!
//! Layout: `<root>/<group>/<kind>/<yyyy>/<mm>/<dd>/<group>_<yyyymmdd>...`
//! where kind is `html`, `csv` or `diff`. CSV artifacts are UTF-8 with a BOM
//! and are replaced atomically so a reader never sees half a snapshot. Diff
//! artifacts are write-once: each change event gets its own file.

use chrono::NaiveDateTime;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::constants::{CSV_COLUMNS, DIFF_COLUMN, REGION_COLUMN, UTF8_BOM};
use crate::error::ArtifactError;
use crate::model::{DiffRecord, PairKey, ProgramRecord, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Markup,
    Export,
    Diff,
}

impl ArtifactKind {
    fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "html",
            ArtifactKind::Export => "csv",
            ArtifactKind::Diff => "diff",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    region: Option<String>,
    run_stamp: Option<String>,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            region: None,
            run_stamp: None,
        }
    }

    /// Use the region column variant of the export
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Suffix markup file names with the run time (`_YYYYMMDD-HHMM`)
    pub fn with_run_stamp(mut self, stamp: Option<String>) -> Self {
        self.run_stamp = stamp;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, key: &PairKey, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(&key.group)
            .join(kind.dir_name())
            .join(key.date.format("%Y").to_string())
            .join(key.date.format("%m").to_string())
            .join(key.date.format("%d").to_string())
    }

    pub fn markup_path(&self, key: &PairKey) -> PathBuf {
        let stamp = self.run_stamp.as_deref().unwrap_or("");
        self.dir(key, ArtifactKind::Markup)
            .join(format!("{}{}.html", key, stamp))
    }

    pub fn export_path(&self, key: &PairKey) -> PathBuf {
        self.dir(key, ArtifactKind::Export)
            .join(format!("{}_programs.csv", key))
    }

    /// Preferred diff file name for a change detected at `at`
    ///
    /// `write_diff` appends `_1`, `_2`, ... when that name is already taken.
    pub fn diff_path(&self, key: &PairKey, at: NaiveDateTime) -> PathBuf {
        self.dir(key, ArtifactKind::Diff)
            .join(diff_file_name(key, at, 0))
    }

    /// Store retrieved markup verbatim
    pub fn write_markup(&self, key: &PairKey, markup: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.markup_path(key);
        replace_file(&path, markup.as_bytes())?;
        Ok(path)
    }

    fn header(&self, extra: Option<&'static str>) -> Vec<&'static str> {
        let mut header = CSV_COLUMNS.to_vec();
        if self.region.is_some() {
            header.push(REGION_COLUMN);
        }
        header.extend(extra);
        header
    }

    fn row<'a>(&'a self, record: &'a ProgramRecord) -> Vec<&'a str> {
        let mut row = record.fields().to_vec();
        if let Some(region) = &self.region {
            row.push(region);
        }
        row
    }

    /// Export bytes for `snapshot`: BOM, header, one CRLF-terminated row per record
    pub fn render_export(&self, snapshot: &Snapshot) -> Result<Vec<u8>, csv::Error> {
        let rows = snapshot.iter().map(|r| self.row(r)).collect::<Vec<_>>();
        render_csv(&self.header(None), &rows)
    }

    /// Overwrite the tabular export for `key` with `snapshot`
    pub fn write_export(&self, key: &PairKey, snapshot: &Snapshot) -> Result<PathBuf, ArtifactError> {
        let path = self.export_path(key);
        let bytes = self.render_export(snapshot).map_err(|e| ArtifactError::csv(&path, e))?;
        replace_file(&path, &bytes)?;
        Ok(path)
    }

    /// Write a new diff artifact for `key`; each row ends with its marker
    ///
    /// Earlier diff artifacts are never touched.
    pub fn write_diff(
        &self,
        key: &PairKey,
        diffs: &[DiffRecord],
        at: NaiveDateTime,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.dir(key, ArtifactKind::Diff);
        let path = self.diff_path(key, at);
        let rows = diffs
            .iter()
            .map(|d| {
                let mut row = self.row(&d.record);
                row.push(d.marker.as_str());
                row
            })
            .collect::<Vec<_>>();
        let bytes = render_csv(&self.header(Some(DIFF_COLUMN)), &rows)
            .map_err(|e| ArtifactError::csv(&path, e))?;
        create_new_file(&dir, |n| diff_file_name(key, at, n), &bytes)
    }
}

fn diff_file_name(key: &PairKey, at: NaiveDateTime, n: u32) -> String {
    let stamp = at.format("%Y%m%d-%H%M%S");
    if n == 0 {
        format!("{}_diff_{}.csv", key, stamp)
    } else {
        format!("{}_diff_{}_{}.csv", key, stamp, n)
    }
}

/// Read a previously written export; `Ok(None)` when there is none
pub fn read_export(path: &Path) -> Result<Option<Snapshot>, ArtifactError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArtifactError::io(path, e)),
    };
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    let records = reader
        .deserialize::<ProgramRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ArtifactError::csv(path, e))?;
    Ok(Some(Snapshot::new(records)))
}

fn render_csv(header: &[&str], rows: &[Vec<&str>]) -> Result<Vec<u8>, csv::Error> {
    let mut buf = UTF8_BOM.as_bytes().to_vec();
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(&mut buf);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    drop(writer);
    Ok(buf)
}

/// Write `bytes` to a sibling temp file and rename it over `path`
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ArtifactError::io(path, e.error))?;
    Ok(())
}

/// Write `bytes` under the first free name `name(0)`, `name(1)`, ... in `dir`
fn create_new_file(
    dir: &Path,
    name: impl Fn(u32) -> String,
    bytes: &[u8],
) -> Result<PathBuf, ArtifactError> {
    fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| ArtifactError::io(tmp.path(), e))?;

    let mut n = 0;
    loop {
        let path = dir.join(name(n));
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                tmp = e.file;
                n += 1;
            }
            Err(e) => return Err(ArtifactError::io(&path, e.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiffMarker;
    use chrono::NaiveDate;

    fn record(title: &str, detail: &str) -> ProgramRecord {
        ProgramRecord {
            channel_id: "program_line_1".to_string(),
            channel_name: "NHK".to_string(),
            start_time: "2025-01-01_0600".to_string(),
            end_time: "2025-01-01_0630".to_string(),
            program_title: title.to_string(),
            program_detail: detail.to_string(),
            link: "https://bangumi.org/tv_events/1".to_string(),
        }
    }

    fn key() -> PairKey {
        PairKey::new("td", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    #[test]
    fn test_paths_follow_group_kind_date_layout() {
        let layout = ArtifactLayout::new("/data");
        assert_eq!(
            layout.export_path(&key()),
            PathBuf::from("/data/td/csv/2025/01/01/td_20250101_programs.csv")
        );
        assert_eq!(
            layout.markup_path(&key()),
            PathBuf::from("/data/td/html/2025/01/01/td_20250101.html")
        );
        let stamped = layout.with_run_stamp(Some("_20250101-0530".to_string()));
        assert_eq!(
            stamped.markup_path(&key()),
            PathBuf::from("/data/td/html/2025/01/01/td_20250101_20250101-0530.html")
        );
        let at = key().date.and_hms_opt(5, 30, 12).unwrap();
        assert_eq!(
            stamped.diff_path(&key(), at),
            PathBuf::from("/data/td/diff/2025/01/01/td_20250101_diff_20250101-053012.csv")
        );
    }

    #[test]
    fn test_export_has_bom_header_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let snapshot = Snapshot::new(vec![record("News", "a, \"quoted\" detail")]);

        let path = layout.write_export(&key(), &snapshot).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "\u{feff}channel_id,channel_name,start_time,end_time,program_title,program_detail,link\r\n"
        ));

        let loaded = read_export(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_export_overwrites_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        layout
            .write_export(&key(), &Snapshot::new(vec![record("A", ""), record("B", "")]))
            .unwrap();
        let path = layout
            .write_export(&key(), &Snapshot::new(vec![record("C", "")]))
            .unwrap();

        let loaded = read_export(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records[0].program_title, "C");
    }

    #[test]
    fn test_region_variant_adds_column_and_still_reads() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path()).with_region(Some("東京".to_string()));
        let path = layout
            .write_export(&key(), &Snapshot::new(vec![record("News", "")]))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().ends_with(",link,region"));
        assert!(lines.next().unwrap().ends_with(",東京"));
        assert_eq!(read_export(&path).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_diff_rows_carry_marker() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let diffs = vec![
            DiffRecord {
                record: record("B", ""),
                marker: DiffMarker::New,
            },
            DiffRecord {
                record: record("Z", ""),
                marker: DiffMarker::Removed,
            },
        ];
        let at = key().date.and_hms_opt(6, 0, 0).unwrap();
        let path = layout.write_diff(&key(), &diffs, at).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(",link,diff"));
        assert!(lines[1].ends_with(",new"));
        assert!(lines[2].ends_with(",removed"));
    }

    #[test]
    fn test_diff_artifacts_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let at = key().date.and_hms_opt(6, 0, 0).unwrap();
        let diff = |title: &str| {
            vec![DiffRecord {
                record: record(title, ""),
                marker: DiffMarker::New,
            }]
        };

        let first = layout.write_diff(&key(), &diff("B"), at).unwrap();
        let second = layout.write_diff(&key(), &diff("C"), at).unwrap();

        assert_eq!(first, layout.diff_path(&key(), at));
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_diff_20250101-060000_1.csv"));
        assert!(fs::read_to_string(&first).unwrap().contains(",B,"));
        assert!(fs::read_to_string(&second).unwrap().contains(",C,"));
        let files = fs::read_dir(layout.dir(&key(), ArtifactKind::Diff))
            .unwrap()
            .count();
        assert_eq!(files, 2);
    }

    #[test]
    fn test_missing_export_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_export(&dir.path().join("absent.csv")).unwrap().is_none());
    }
}
