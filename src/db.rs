//! SQLite program store
//!
//! Queries are built with sea-query and executed through an sqlx pool. The
//! pipeline is synchronous, so `SyncDb` owns a current-thread runtime and
//! blocks on each operation.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::path::Path;
use tokio::runtime::Runtime;

use crate::constants::{EXPECTED_DB_VERSION, LOG_TIMESTAMP_FORMAT};
use crate::error::StoreError;
use crate::model::{PersistedProgram, ProgramRecord, Snapshot};
use crate::queries::{ddl, metadata, programs};

/// Open (creating if needed) a file-based database with WAL enabled
pub async fn open_database_connection(db_path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create tables and indexes if absent and check the schema version
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(&ddl::create_metadata_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_programs_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_programs_natural_key_index())
        .execute(pool)
        .await?;

    let version: Option<String> = sqlx::query_scalar(&metadata::select_by_key("version"))
        .fetch_optional(pool)
        .await?;
    match version {
        None => {
            sqlx::query(&metadata::upsert("version", EXPECTED_DB_VERSION))
                .execute(pool)
                .await?;
            info!("Initialized program store schema v{}", EXPECTED_DB_VERSION);
        }
        Some(found) if found != EXPECTED_DB_VERSION => {
            return Err(StoreError::SchemaVersion {
                found,
                expected: EXPECTED_DB_VERSION.to_string(),
            });
        }
        Some(_) => {}
    }
    Ok(())
}

/// Upsert every record of a snapshot in one transaction
///
/// Returns the number of rows written. On any error the transaction is
/// rolled back and no row of the snapshot is visible.
pub async fn upsert_snapshot(
    pool: &SqlitePool,
    snapshot: &Snapshot,
    updated_at: NaiveDateTime,
    reset_review_flags: bool,
) -> Result<u64, StoreError> {
    let stamp = updated_at.format(LOG_TIMESTAMP_FORMAT).to_string();
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for record in snapshot.iter() {
        let sql = programs::upsert(record, &stamp, reset_review_flags);
        match sqlx::query(&sql).execute(&mut *tx).await {
            Ok(result) => written += result.rows_affected(),
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            }
        }
    }

    tx.commit().await?;
    debug!("Upserted {} program rows", written);
    Ok(written)
}

pub async fn count_programs(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(&programs::count())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Rows whose start time falls on `date`
pub async fn programs_starting_on(
    pool: &SqlitePool,
    date: NaiveDate,
) -> Result<Vec<PersistedProgram>, StoreError> {
    let prefix = date.format("%Y-%m-%d").to_string();
    let rows = sqlx::query(&programs::select_by_start_date(&prefix))
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok::<_, StoreError>(PersistedProgram {
                record: ProgramRecord {
                    channel_id: row.try_get("channel_id")?,
                    channel_name: row.try_get("channel_name")?,
                    start_time: row.try_get("start_time")?,
                    end_time: row.try_get("end_time")?,
                    program_title: row.try_get("program_title")?,
                    program_detail: row.try_get("program_detail")?,
                    link: row.try_get("link")?,
                },
                is_confirmed: row.try_get::<i64, _>("is_confirmed")? != 0,
                is_changed: row.try_get::<i64, _>("is_changed")? != 0,
                last_updated: row.try_get("last_updated")?,
            })
        })
        .collect()
}

/// Set the review flags of one row (the downstream confirmation workflow)
pub async fn set_review_flags(
    pool: &SqlitePool,
    record: &ProgramRecord,
    is_confirmed: bool,
    is_changed: bool,
) -> Result<u64, StoreError> {
    let sql = programs::set_review_flags(
        &record.channel_id,
        &record.start_time,
        &record.program_title,
        is_confirmed,
        is_changed,
    );
    let result = sqlx::query(&sql).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Synchronous SQLite store that owns a runtime for blocking operations.
pub struct SyncDb {
    pool: SqlitePool,
    runtime: Runtime,
}

impl SyncDb {
    /// Open the store at `db_path` and initialize its schema
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let pool = runtime.block_on(async {
            let pool = open_database_connection(db_path).await?;
            init_database_schema(&pool).await?;
            Ok::<_, StoreError>(pool)
        })?;
        Ok(Self { pool, runtime })
    }

    /// Block on an async future using the embedded runtime
    pub fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.runtime.block_on(fut)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn upsert_snapshot(
        &self,
        snapshot: &Snapshot,
        updated_at: NaiveDateTime,
        reset_review_flags: bool,
    ) -> Result<u64, StoreError> {
        self.block_on(upsert_snapshot(
            &self.pool,
            snapshot,
            updated_at,
            reset_review_flags,
        ))
    }

    pub fn count_programs(&self) -> Result<i64, StoreError> {
        self.block_on(count_programs(&self.pool))
    }

    pub fn programs_starting_on(&self, date: NaiveDate) -> Result<Vec<PersistedProgram>, StoreError> {
        self.block_on(programs_starting_on(&self.pool, date))
    }

    pub fn set_review_flags(
        &self,
        record: &ProgramRecord,
        is_confirmed: bool,
        is_changed: bool,
    ) -> Result<u64, StoreError> {
        self.block_on(set_review_flags(&self.pool, record, is_confirmed, is_changed))
    }

    /// Close the pool, flushing the WAL
    pub fn close(self) {
        self.runtime.block_on(self.pool.close());
    }
}
