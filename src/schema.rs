use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Programs table - one row per broadcast slot, keyed by
/// (channel_id, start_time, program_title)
#[derive(Iden)]
pub enum Programs {
    Table,
    Id,
    ChannelId,
    ChannelName,
    StartTime,
    EndTime,
    ProgramTitle,
    ProgramDetail,
    Link,
    IsConfirmed,
    IsChanged,
    LastUpdated,
}
