//! Persistence for bookpair-import
//!
//! - [`schema`] - table declarations, applied with `SchemaSync`
//! - [`staging`] - per-run candidate staging (CSV line load)
//! - [`consolidate`] - dedup + merge of a run's staging partition into the inbox
//! - [`embeddings`] - paired embedding side stream
//! - [`books`] - book import flag
//! - [`inbox`] - read helpers over the durable inbox

pub mod books;
pub mod consolidate;
pub mod embeddings;
pub mod inbox;
pub mod schema;
pub mod staging;

use bookpair_common::db::SchemaSync;
use bookpair_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use thiserror::Error;

pub use consolidate::{consolidate, MergeStats};
pub use schema::{BookTable, EmbeddingStagingTable, EmbeddingsTable, InboxTable, StagingTable};
pub use staging::StagingRecord;

/// Errors while staging or merging a run
#[derive(Debug, Error)]
pub enum StagingError {
    #[error(transparent)]
    Database(#[from] bookpair_common::Error),

    #[error("CSV staging error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Embedding encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StagingError {
    fn from(e: sqlx::Error) -> Self {
        StagingError::Database(e.into())
    }
}

/// Initialize the database connection pool and ensure all tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new().max_connections(5).connect(&db_url).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create or extend every table the pipeline touches
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    SchemaSync::ensure_table::<InboxTable>(pool).await?;
    SchemaSync::ensure_table::<StagingTable>(pool).await?;
    SchemaSync::ensure_table::<EmbeddingStagingTable>(pool).await?;
    SchemaSync::ensure_table::<EmbeddingsTable>(pool).await?;
    SchemaSync::ensure_table::<BookTable>(pool).await?;

    tracing::info!("Database tables initialized (inbox, staging, embeddings, book)");
    Ok(())
}

/// Timestamp format stored in TEXT columns; sorts lexically
pub fn now_timestamp() -> String {
    timestamp(chrono::Utc::now())
}

pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
