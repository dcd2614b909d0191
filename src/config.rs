use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKOFF_SECS, DEFAULT_DAYS_AHEAD, DEFAULT_DAYS_BACK, DEFAULT_LINE_COUNT,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SETTLE_SECS, DEFAULT_SITE_ORIGIN, DEFAULT_WAIT_TIMEOUT_SECS,
    MAX_WINDOW_DAYS, MIN_PLAUSIBLE_RECORDS, PROGRAM_CONTAINER_SELECTOR,
};
use crate::model::ChannelGroup;

/// How to decide that a navigated page has finished rendering
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SettleConfig {
    /// Sleep a fixed number of seconds after navigation
    Delay {
        #[serde(default = "default_settle_secs")]
        secs: u64,
    },
    /// Wait until `selector` matches, up to `timeout_secs`
    WaitFor {
        #[serde(default = "default_wait_selector")]
        selector: String,
        #[serde(default = "default_wait_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for SettleConfig {
    fn default() -> Self {
        SettleConfig::WaitFor {
            selector: default_wait_selector(),
            timeout_secs: default_wait_timeout_secs(),
        }
    }
}

/// What a new snapshot is compared against
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DiffBaseConfig {
    /// The export about to be overwritten by this run
    #[default]
    Overwrite,
    /// A fixed reference tree laid out like `output_dir`
    PreviousRun { dir: PathBuf },
}

/// Handling of raw time tokens that are not 12 digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPolicy {
    /// Slice whatever is there; short tokens give truncated output
    #[default]
    Truncate,
    /// Leave the field empty and log a warning
    Reject,
}

/// One channel group entry (maps to a [[groups]] table in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelGroupConfig {
    /// Short key used in directory and file names
    pub key: String,
    /// Guide URL with a `{date}` placeholder (YYYYMMDD)
    pub url_template: String,
    /// Number of program lines on this group's page (default: 12)
    pub line_count: Option<usize>,
}

impl ChannelGroupConfig {
    pub fn to_group(&self) -> ChannelGroup {
        ChannelGroup {
            key: self.key.clone(),
            url_template: self.url_template.clone(),
            line_count: self.line_count.unwrap_or(DEFAULT_LINE_COUNT),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_site_origin() -> String {
    DEFAULT_SITE_ORIGIN.to_string()
}

fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

fn default_days_ahead() -> u32 {
    DEFAULT_DAYS_AHEAD
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_secs() -> u64 {
    DEFAULT_BACKOFF_SECS
}

fn default_min_records() -> usize {
    MIN_PLAUSIBLE_RECORDS
}

fn default_settle_secs() -> u64 {
    DEFAULT_SETTLE_SECS
}

fn default_wait_selector() -> String {
    PROGRAM_CONTAINER_SELECTOR.to_string()
}

fn default_wait_timeout_secs() -> u64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

fn default_groups() -> Vec<ChannelGroupConfig> {
    vec![
        ChannelGroupConfig {
            key: "td".to_string(),
            url_template: "https://bangumi.org/epg/td?broad_cast_date={date}&ggm_group_id=42"
                .to_string(),
            line_count: None,
        },
        ChannelGroupConfig {
            key: "bs".to_string(),
            url_template: "https://bangumi.org/epg/bs?broad_cast_date={date}".to_string(),
            line_count: None,
        },
    ]
}

/// Scrape configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// Root of the artifact tree (default: files)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// SQLite store (default: <output_dir>/epg.sqlite)
    pub database_path: Option<PathBuf>,
    /// Append-only failure log (default: <output_dir>/error_log.txt)
    pub error_log: Option<PathBuf>,
    /// Append-only diff detection log (default: <output_dir>/diff_log.txt)
    pub diff_log: Option<PathBuf>,
    /// Origin prefixed to root-relative links
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    /// Days before today to include (default: 1)
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    /// Days after today to include (default: 7)
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    /// Retrieval attempts per pair (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff base in seconds (default: 5)
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default)]
    pub settle: SettleConfig,
    /// Record count below which a pair is reported as an anomaly (default: 10)
    #[serde(default = "default_min_records")]
    pub min_records: usize,
    /// When set, exports use the region column variant with this value
    pub region: Option<String>,
    /// Append the run timestamp to markup artifact names (default: false)
    #[serde(default)]
    pub timestamped_html: bool,
    #[serde(default)]
    pub timestamp_policy: TimestampPolicy,
    #[serde(default)]
    pub diff_base: DiffBaseConfig,
    /// Keep is_confirmed/is_changed on re-ingestion instead of resetting them (default: false)
    #[serde(default)]
    pub preserve_review_flags: bool,
    #[serde(default = "default_groups")]
    pub groups: Vec<ChannelGroupConfig>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            database_path: None,
            error_log: None,
            diff_log: None,
            site_origin: default_site_origin(),
            days_back: default_days_back(),
            days_ahead: default_days_ahead(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            settle: SettleConfig::default(),
            min_records: default_min_records(),
            region: None,
            timestamped_html: false,
            timestamp_policy: TimestampPolicy::default(),
            diff_base: DiffBaseConfig::default(),
            preserve_review_flags: false,
            groups: default_groups(),
        }
    }
}

impl ScrapeConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let config: ScrapeConfig =
            toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        Self::from_toml_str(&content)
            .map_err(|e| format!("{} (in '{}')", e, path.display()))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.days_back > MAX_WINDOW_DAYS || self.days_ahead > MAX_WINDOW_DAYS {
            return Err(format!(
                "days_back and days_ahead must be at most {}",
                MAX_WINDOW_DAYS
            ));
        }

        let origin = url::Url::parse(&self.site_origin)
            .map_err(|e| format!("site_origin '{}' is not a valid URL: {}", self.site_origin, e))?;
        if origin.cannot_be_a_base() {
            return Err(format!("site_origin '{}' must be absolute", self.site_origin));
        }

        if self.groups.is_empty() {
            return Err("at least one channel group is required".to_string());
        }

        for (i, group) in self.groups.iter().enumerate() {
            if group.key.is_empty() {
                return Err(format!("groups[{}] has an empty key", i));
            }
            if !group.url_template.contains("{date}") {
                return Err(format!(
                    "group '{}' url_template must contain {{date}}",
                    group.key
                ));
            }
            if group.line_count == Some(0) {
                return Err(format!("group '{}' line_count must be at least 1", group.key));
            }
            if self.groups[..i].iter().any(|g| g.key == group.key) {
                return Err(format!("duplicate channel group key '{}'", group.key));
            }
        }

        if let SettleConfig::WaitFor { selector, .. } = &self.settle {
            scraper::Selector::parse(selector)
                .map_err(|e| format!("settle selector '{}' is invalid: {:?}", selector, e))?;
        }

        Ok(())
    }

    pub fn channel_groups(&self) -> Vec<ChannelGroup> {
        self.groups.iter().map(ChannelGroupConfig::to_group).collect()
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join("epg.sqlite"))
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.error_log
            .clone()
            .unwrap_or_else(|| self.output_dir.join("error_log.txt"))
    }

    pub fn diff_log_path(&self) -> PathBuf {
        self.diff_log
            .clone()
            .unwrap_or_else(|| self.output_dir.join("diff_log.txt"))
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    /// Per-request timeout of the HTTP browser: the settle wait when there is one
    pub fn request_timeout(&self) -> Duration {
        match &self.settle {
            SettleConfig::WaitFor { timeout_secs, .. } => Duration::from_secs(*timeout_secs),
            SettleConfig::Delay { .. } => Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
        }
    }
}
