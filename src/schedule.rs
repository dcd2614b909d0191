use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Dates from `days_back` before `today` through `days_ahead` after, inclusive
pub fn date_window(today: NaiveDate, days_back: u32, days_ahead: u32) -> Vec<NaiveDate> {
    let start = today - Duration::days(i64::from(days_back));
    let total = u64::from(days_back) + u64::from(days_ahead) + 1;
    start.iter_days().take(total as usize).collect()
}

/// Run timestamp suffix for artifact names: `_YYYYMMDD-HHMM`
pub fn run_stamp(started_at: NaiveDateTime) -> String {
    started_at.format("_%Y%m%d-%H%M").to_string()
}
