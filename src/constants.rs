/// Expected database schema version
/// Stores created by a different version are refused rather than migrated
pub const EXPECTED_DB_VERSION: &str = "1";

/// Site origin prefixed onto root-relative program links
pub const DEFAULT_SITE_ORIGIN: &str = "https://bangumi.org";

/// Retrieval attempts per (channel group, date) pair
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; attempt N waits N times this
pub const DEFAULT_BACKOFF_SECS: u64 = 5;

/// Flat settle delay used when no readiness selector is configured
pub const DEFAULT_SETTLE_SECS: u64 = 10;

/// How long to wait for the primary content container to appear
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

/// Primary content container; its presence means the guide has rendered
pub const PROGRAM_CONTAINER_SELECTOR: &str = "ul[id^=\"program_line_\"]";

/// Number of `program_line_N` containers the guide page can carry
pub const DEFAULT_LINE_COUNT: usize = 12;

/// Fewer records than this for one pair is reported as a data-quality anomaly
pub const MIN_PLAUSIBLE_RECORDS: usize = 10;

pub const DEFAULT_DAYS_BACK: u32 = 1;
pub const DEFAULT_DAYS_AHEAD: u32 = 7;
/// Upper bound for `days_back` and `days_ahead`
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Column order of the tabular export
pub const CSV_COLUMNS: [&str; 7] = [
    "channel_id",
    "channel_name",
    "start_time",
    "end_time",
    "program_title",
    "program_detail",
    "link",
];

/// Extra column of the region variant of the export
pub const REGION_COLUMN: &str = "region";

/// Extra column of diff artifacts
pub const DIFF_COLUMN: &str = "diff";

/// UTF-8 byte-order mark written at the start of every CSV artifact
pub const UTF8_BOM: &str = "\u{feff}";

/// Format of `last_updated` and log line timestamps
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
