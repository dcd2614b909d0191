use sea_query::{Expr, Func, OnConflict, Order, Query, SqliteQueryBuilder};

use crate::model::ProgramRecord;
use crate::schema::Programs;

/// INSERT INTO programs (channel_id, ..., is_confirmed, is_changed, last_updated)
/// VALUES (?, ..., 0, 0, ?)
/// ON CONFLICT (channel_id, start_time, program_title) DO UPDATE SET
///     channel_name, end_time, program_detail, link, last_updated
///     [, is_confirmed, is_changed] = excluded.*
///
/// The review flags are only reset when `reset_review_flags` is true.
pub fn upsert(record: &ProgramRecord, last_updated: &str, reset_review_flags: bool) -> String {
    let mut update = vec![
        Programs::ChannelName,
        Programs::EndTime,
        Programs::ProgramDetail,
        Programs::Link,
        Programs::LastUpdated,
    ];
    if reset_review_flags {
        update.extend([Programs::IsConfirmed, Programs::IsChanged]);
    }

    Query::insert()
        .into_table(Programs::Table)
        .columns([
            Programs::ChannelId,
            Programs::ChannelName,
            Programs::StartTime,
            Programs::EndTime,
            Programs::ProgramTitle,
            Programs::ProgramDetail,
            Programs::Link,
            Programs::IsConfirmed,
            Programs::IsChanged,
            Programs::LastUpdated,
        ])
        .values_panic([
            record.channel_id.as_str().into(),
            record.channel_name.as_str().into(),
            record.start_time.as_str().into(),
            record.end_time.as_str().into(),
            record.program_title.as_str().into(),
            record.program_detail.as_str().into(),
            record.link.as_str().into(),
            0.into(),
            0.into(),
            last_updated.into(),
        ])
        .on_conflict(
            OnConflict::columns([
                Programs::ChannelId,
                Programs::StartTime,
                Programs::ProgramTitle,
            ])
            .update_columns(update)
            .to_owned(),
        )
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(*) FROM programs
pub fn count() -> String {
    Query::select()
        .expr(Func::count(Expr::col(Programs::Id)))
        .from(Programs::Table)
        .to_string(SqliteQueryBuilder)
}

/// SELECT channel_id, ..., last_updated FROM programs WHERE start_time LIKE 'YYYY-MM-DD%' ORDER BY id
pub fn select_by_start_date(date_prefix: &str) -> String {
    Query::select()
        .columns([
            Programs::ChannelId,
            Programs::ChannelName,
            Programs::StartTime,
            Programs::EndTime,
            Programs::ProgramTitle,
            Programs::ProgramDetail,
            Programs::Link,
            Programs::IsConfirmed,
            Programs::IsChanged,
            Programs::LastUpdated,
        ])
        .from(Programs::Table)
        .and_where(Expr::col(Programs::StartTime).like(format!("{}%", date_prefix)))
        .order_by(Programs::Id, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// UPDATE programs SET is_confirmed = ?, is_changed = ?
/// WHERE channel_id = ? AND start_time = ? AND program_title = ?
pub fn set_review_flags(
    channel_id: &str,
    start_time: &str,
    program_title: &str,
    is_confirmed: bool,
    is_changed: bool,
) -> String {
    Query::update()
        .table(Programs::Table)
        .value(Programs::IsConfirmed, is_confirmed as i32)
        .value(Programs::IsChanged, is_changed as i32)
        .and_where(Expr::col(Programs::ChannelId).eq(channel_id))
        .and_where(Expr::col(Programs::StartTime).eq(start_time))
        .and_where(Expr::col(Programs::ProgramTitle).eq(program_title))
        .to_string(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProgramRecord {
        ProgramRecord {
            channel_id: "program_line_1".to_string(),
            channel_name: "NHK".to_string(),
            start_time: "2025-01-01_0600".to_string(),
            end_time: "2025-01-01_0630".to_string(),
            program_title: "It's News".to_string(),
            program_detail: String::new(),
            link: String::new(),
        }
    }

    #[test]
    fn test_upsert_targets_natural_key() {
        let sql = upsert(&record(), "2025-01-01 05:00:00", true);
        assert!(sql.contains("ON CONFLICT"));
        assert!(sql.contains("(\"channel_id\", \"start_time\", \"program_title\")"));
        assert!(sql.contains("\"is_confirmed\" = \"excluded\".\"is_confirmed\""));
    }

    #[test]
    fn test_upsert_can_preserve_review_flags() {
        let sql = upsert(&record(), "2025-01-01 05:00:00", false);
        assert!(!sql.contains("\"is_confirmed\" = \"excluded\""));
        assert!(sql.contains("\"last_updated\" = \"excluded\".\"last_updated\""));
    }
}
