use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, Programs};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS programs (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     channel_id TEXT NOT NULL,
///     channel_name TEXT NOT NULL,
///     start_time TEXT NOT NULL,
///     end_time TEXT NOT NULL,
///     program_title TEXT NOT NULL,
///     program_detail TEXT NOT NULL,
///     link TEXT NOT NULL,
///     is_confirmed INTEGER NOT NULL DEFAULT 0,
///     is_changed INTEGER NOT NULL DEFAULT 0,
///     last_updated TEXT NOT NULL
/// )
pub fn create_programs_table() -> String {
    Table::create()
        .table(Programs::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Programs::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Programs::ChannelId).string().not_null())
        .col(ColumnDef::new(Programs::ChannelName).string().not_null())
        .col(ColumnDef::new(Programs::StartTime).string().not_null())
        .col(ColumnDef::new(Programs::EndTime).string().not_null())
        .col(ColumnDef::new(Programs::ProgramTitle).string().not_null())
        .col(ColumnDef::new(Programs::ProgramDetail).string().not_null())
        .col(ColumnDef::new(Programs::Link).string().not_null())
        .col(
            ColumnDef::new(Programs::IsConfirmed)
                .integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(Programs::IsChanged)
                .integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(Programs::LastUpdated).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE UNIQUE INDEX IF NOT EXISTS idx_programs_natural_key
/// ON programs(channel_id, start_time, program_title)
pub fn create_programs_natural_key_index() -> String {
    Index::create()
        .if_not_exists()
        .unique()
        .name("idx_programs_natural_key")
        .table(Programs::Table)
        .col(Programs::ChannelId)
        .col(Programs::StartTime)
        .col(Programs::ProgramTitle)
        .to_string(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programs_table_defaults() {
        let sql = create_programs_table().to_lowercase();
        assert!(sql.starts_with("create table if not exists \"programs\""));
        assert!(sql.contains("\"is_confirmed\" integer not null default 0"));
        assert!(sql.contains("\"is_changed\" integer not null default 0"));
    }

    #[test]
    fn test_natural_key_index_is_unique() {
        let sql = create_programs_natural_key_index().to_lowercase();
        assert!(sql.starts_with("create unique index if not exists \"idx_programs_natural_key\""));
        for col in ["channel_id", "start_time", "program_title"] {
            assert!(sql.contains(&format!("\"{}\"", col)), "{}", sql);
        }
    }
}
