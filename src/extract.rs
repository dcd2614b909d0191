//! Program record extraction from guide markup
//!
//! The guide page carries channel labels as `li.js_channel.topmost` elements
//! and one `ul#program_line_N` per channel column. Each `li` inside a line is
//! a program with `s`/`e` time attributes; title, detail and link sit under an
//! `a.title_link` wrapper.

use log::{debug, warn};
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};

use crate::config::TimestampPolicy;
use crate::constants::{DEFAULT_LINE_COUNT, DEFAULT_SITE_ORIGIN};
use crate::error::TimestampError;
use crate::model::{ProgramRecord, Snapshot};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Normalize a `YYYYMMDDHHMM` token to `YYYY-MM-DD_HHMM`
///
/// An empty token stays empty under either policy. Under `Truncate` any other
/// token is sliced positionally, so short input yields short output
/// (`"2025010106"` becomes `"2025-01-01_06"`); under `Reject` anything but
/// exactly twelve ASCII digits is an error.
pub fn normalize_timestamp(token: &str, policy: TimestampPolicy) -> Result<String, TimestampError> {
    if token.is_empty() {
        return Ok(String::new());
    }
    let well_formed = token.len() == 12 && token.bytes().all(|b| b.is_ascii_digit());
    if !well_formed && policy == TimestampPolicy::Reject {
        return Err(TimestampError::Malformed(token.to_string()));
    }

    let chars: Vec<char> = token.chars().collect();
    let part = |from: usize, to: usize| -> String {
        let to = to.min(chars.len());
        let from = from.min(to);
        chars[from..to].iter().collect()
    };
    Ok(format!(
        "{}-{}-{}_{}",
        part(0, 4),
        part(4, 6),
        part(6, 8),
        part(8, 12)
    ))
}

/// Prefix root-relative links with the site origin
pub fn normalize_link(href: &str, origin: &str) -> String {
    if href.starts_with('/') && !href.starts_with("//") {
        format!("{}{}", origin.trim_end_matches('/'), href)
    } else {
        href.to_string()
    }
}

/// Channel names in document order; the Nth name belongs to `program_line_N`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelLabels {
    names: Vec<String>,
}

impl ChannelLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Name for 1-based line `line`; empty when the page has fewer labels
    pub fn name_for(&self, line: usize) -> String {
        line.checked_sub(1)
            .and_then(|i| self.names.get(i))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub site_origin: String,
    pub line_count: usize,
    pub timestamp_policy: TimestampPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
            line_count: DEFAULT_LINE_COUNT,
            timestamp_policy: TimestampPolicy::Truncate,
        }
    }
}

/// Result of extracting one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub snapshot: Snapshot,
    pub labels: ChannelLabels,
    /// `program_line_N` ids that were not on the page
    pub missing_lines: Vec<String>,
    /// Entries dropped because their natural key repeated an earlier one
    pub duplicates: usize,
}

impl Extraction {
    /// Fewer records than `min_records` is a data-quality anomaly
    pub fn is_sparse(&self, min_records: usize) -> bool {
        self.snapshot.len() < min_records
    }
}

pub struct RecordExtractor {
    options: ExtractOptions,
    label: Selector,
    line: Selector,
    entry: Selector,
    wrapper: Selector,
    title: Selector,
    detail: Selector,
}

impl RecordExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            label: selector("li.js_channel.topmost"),
            line: selector("ul[id]"),
            entry: selector("li"),
            wrapper: selector("a.title_link"),
            title: selector("p.program_title"),
            detail: selector("p.program_detail"),
        }
    }

    pub fn extract(&self, markup: &str) -> Extraction {
        let document = Html::parse_document(markup);
        let labels = self.channel_labels(&document);

        // First element wins when an id repeats
        let mut lines: HashMap<&str, ElementRef> = HashMap::new();
        for ul in document.select(&self.line) {
            if let Some(id) = ul.value().id() {
                lines.entry(id).or_insert(ul);
            }
        }

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut missing_lines = Vec::new();
        let mut duplicates = 0;

        for n in 1..=self.options.line_count {
            let channel_id = format!("program_line_{}", n);
            let Some(ul) = lines.get(channel_id.as_str()) else {
                debug!("{} not present", channel_id);
                missing_lines.push(channel_id);
                continue;
            };
            let channel_name = labels.name_for(n);

            for entry in ul.select(&self.entry) {
                let record = self.extract_entry(entry, &channel_id, &channel_name);
                let key = (
                    record.channel_id.clone(),
                    record.start_time.clone(),
                    record.program_title.clone(),
                );
                if seen.insert(key) {
                    records.push(record);
                } else {
                    duplicates += 1;
                }
            }
        }

        if duplicates > 0 {
            warn!("Dropped {} entries with a repeated natural key", duplicates);
        }

        Extraction {
            snapshot: Snapshot::new(records),
            labels,
            missing_lines,
            duplicates,
        }
    }

    fn channel_labels(&self, document: &Html) -> ChannelLabels {
        ChannelLabels::new(
            document
                .select(&self.label)
                .map(|li| element_text(&li))
                .collect(),
        )
    }

    fn extract_entry(&self, entry: ElementRef, channel_id: &str, channel_name: &str) -> ProgramRecord {
        let wrapper = entry.select(&self.wrapper).next();
        // Title and detail normally sit under the link wrapper
        let scope = wrapper.unwrap_or(entry);

        let title = scope
            .select(&self.title)
            .next()
            .map(|p| element_text(&p))
            .unwrap_or_default();
        let detail = scope
            .select(&self.detail)
            .next()
            .map(|p| element_text(&p))
            .unwrap_or_default();
        let link = wrapper
            .and_then(|a| a.value().attr("href"))
            .map(|href| normalize_link(href, &self.options.site_origin))
            .unwrap_or_default();

        ProgramRecord {
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
            start_time: self.time_attr(entry, "s"),
            end_time: self.time_attr(entry, "e"),
            program_title: title,
            program_detail: detail,
            link,
        }
    }

    fn time_attr(&self, entry: ElementRef, attr: &str) -> String {
        let raw = entry.value().attr(attr).unwrap_or("");
        match normalize_timestamp(raw, self.options.timestamp_policy) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("{} (attribute '{}'), leaving it empty", e, attr);
                String::new()
            }
        }
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(ExtractOptions::default())
    }

    fn page(labels: &[&str], lines: &str) -> String {
        let labels: String = labels
            .iter()
            .map(|l| format!("<li class=\"js_channel topmost\"> {} </li>", l))
            .collect();
        format!(
            "<html><body><ul class=\"channels\">{}</ul><div id=\"program_area\">{}</div></body></html>",
            labels, lines
        )
    }

    #[test]
    fn test_normalize_valid_token() {
        assert_eq!(
            normalize_timestamp("202501010600", TimestampPolicy::Truncate).unwrap(),
            "2025-01-01_0600"
        );
        assert_eq!(
            normalize_timestamp("202512312359", TimestampPolicy::Reject).unwrap(),
            "2025-12-31_2359"
        );
    }

    #[test]
    fn test_normalize_short_token_truncates() {
        assert_eq!(
            normalize_timestamp("2025010106", TimestampPolicy::Truncate).unwrap(),
            "2025-01-01_06"
        );
        assert_eq!(
            normalize_timestamp("20250", TimestampPolicy::Truncate).unwrap(),
            "2025-0-_"
        );
        assert_eq!(
            normalize_timestamp("2025010106000000", TimestampPolicy::Truncate).unwrap(),
            "2025-01-01_0600"
        );
    }

    #[test]
    fn test_normalize_short_token_rejects() {
        assert_eq!(
            normalize_timestamp("2025010106", TimestampPolicy::Reject),
            Err(TimestampError::Malformed("2025010106".to_string()))
        );
        assert!(normalize_timestamp("20250101060x", TimestampPolicy::Reject).is_err());
        assert_eq!(normalize_timestamp("", TimestampPolicy::Reject).unwrap(), "");
    }

    #[test]
    fn test_normalize_link() {
        let origin = "https://bangumi.org";
        assert_eq!(
            normalize_link("/tv_events/AAA", origin),
            "https://bangumi.org/tv_events/AAA"
        );
        assert_eq!(
            normalize_link("/x", "https://bangumi.org/"),
            "https://bangumi.org/x"
        );
        assert_eq!(
            normalize_link("https://other.example/x", origin),
            "https://other.example/x"
        );
        assert_eq!(normalize_link("//cdn.example/x", origin), "//cdn.example/x");
        assert_eq!(normalize_link("", origin), "");
    }

    #[test]
    fn test_single_entry_without_link_wrapper() {
        let markup = page(
            &["NHK", "ETV"],
            r#"<ul id="program_line_1"><li s="202501010600" e="202501010630"><p class="program_title">News</p></li></ul>"#,
        );
        let extraction = extractor().extract(&markup);

        assert_eq!(
            extraction.snapshot.records,
            vec![ProgramRecord {
                channel_id: "program_line_1".to_string(),
                channel_name: "NHK".to_string(),
                start_time: "2025-01-01_0600".to_string(),
                end_time: "2025-01-01_0630".to_string(),
                program_title: "News".to_string(),
                program_detail: String::new(),
                link: String::new(),
            }]
        );
        assert_eq!(extraction.missing_lines.len(), 11);
        assert!(extraction.is_sparse(10));
    }

    #[test]
    fn test_full_entry_under_wrapper() {
        let markup = page(
            &["NHK"],
            r#"<ul id="program_line_1">
                 <li s="202501010600" e="202501010630">
                   <a class="title_link" href="/tv_events/ABC?overwrite_area=42">
                     <p class="program_title"> Morning News </p>
                     <p class="program_detail">Weather and traffic</p>
                   </a>
                 </li>
               </ul>"#,
        );
        let record = &extractor().extract(&markup).snapshot.records[0];
        assert_eq!(record.program_title, "Morning News");
        assert_eq!(record.program_detail, "Weather and traffic");
        assert_eq!(
            record.link,
            "https://bangumi.org/tv_events/ABC?overwrite_area=42"
        );
    }

    #[test]
    fn test_lines_beyond_labels_get_empty_name() {
        let markup = page(
            &["NHK"],
            r#"<ul id="program_line_1"><li s="202501010600" e="202501010630"></li></ul>
               <ul id="program_line_3"><li s="202501010700" e="202501010800"></li></ul>"#,
        );
        let records = extractor().extract(&markup).snapshot.records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].channel_name, "NHK");
        assert_eq!(records[1].channel_id, "program_line_3");
        // Label 3 does not exist, and label 2 must not shift onto line 3
        assert_eq!(records[1].channel_name, "");
    }

    #[test]
    fn test_extra_labels_are_ignored() {
        let markup = page(
            &["NHK", "ETV", "NTV"],
            r#"<ul id="program_line_2"><li s="202501010600" e="202501010630"></li></ul>"#,
        );
        let records = extractor().extract(&markup).snapshot.records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel_name, "ETV");
    }

    #[test]
    fn test_missing_fields_become_empty() {
        let markup = page(&[], r#"<ul id="program_line_1"><li><a class="title_link"></a></li></ul>"#);
        let records = extractor().extract(&markup).snapshot.records;
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.channel_name, "");
        assert_eq!(r.start_time, "");
        assert_eq!(r.end_time, "");
        assert_eq!(r.program_title, "");
        assert_eq!(r.link, "");
    }

    #[test]
    fn test_lines_beyond_line_count_are_not_read() {
        let markup = page(
            &[],
            r#"<ul id="program_line_13"><li s="202501010600" e="202501010630"></li></ul>"#,
        );
        assert!(extractor().extract(&markup).snapshot.is_empty());

        let wide = RecordExtractor::new(ExtractOptions {
            line_count: 13,
            ..ExtractOptions::default()
        });
        assert_eq!(wide.extract(&markup).snapshot.len(), 1);
    }

    #[test]
    fn test_repeated_natural_key_is_dropped() {
        let markup = page(
            &["NHK"],
            r#"<ul id="program_line_1">
                 <li s="202501010600" e="202501010630"><p class="program_title">News</p></li>
                 <li s="202501010600" e="202501010645"><p class="program_title">News</p></li>
               </ul>"#,
        );
        let extraction = extractor().extract(&markup);
        assert_eq!(extraction.snapshot.len(), 1);
        assert_eq!(extraction.duplicates, 1);
        assert_eq!(extraction.snapshot.records[0].end_time, "2025-01-01_0630");
    }

    #[test]
    fn test_reject_policy_empties_malformed_times() {
        let strict = RecordExtractor::new(ExtractOptions {
            timestamp_policy: TimestampPolicy::Reject,
            ..ExtractOptions::default()
        });
        let markup = page(
            &["NHK"],
            r#"<ul id="program_line_1"><li s="20250101" e="202501010630"></li></ul>"#,
        );
        let record = &strict.extract(&markup).snapshot.records[0];
        assert_eq!(record.start_time, "");
        assert_eq!(record.end_time, "2025-01-01_0630");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let markup = page(
            &["NHK", "ETV"],
            r#"<ul id="program_line_2"><li s="202501010600" e="202501010630"><a class="title_link" href="/a"><p class="program_title">A</p></a></li>
               <li s="202501010630" e="202501010700"><a class="title_link" href="/b"><p class="program_title">B</p></a></li></ul>
               <ul id="program_line_1"><li s="202501010500" e="202501010600"></li></ul>"#,
        );
        let first = extractor().extract(&markup);
        let second = extractor().extract(&markup);
        assert_eq!(first, second);
        // Line order, not document order, drives record order
        assert_eq!(first.snapshot.records[0].channel_id, "program_line_1");
    }
}
