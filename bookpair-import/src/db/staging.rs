//! Candidate staging
//!
//! Accepted candidates are projected to one CSV line each, then the CSV is
//! line-loaded into `tm_bookpair_inbox_staging` under the run's `run_id` with
//! multi-row inserts inside a single transaction.

use super::schema::{EMB_STAGING_TABLE, STAGING_TABLE};
use super::{now_timestamp, timestamp, StagingError};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

/// Rows per INSERT statement
const INSERT_CHUNK: usize = 200;

/// CSV projection of one accepted candidate. Field order is the line layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub src: String,
    pub tgt: String,
    pub lang_src: String,
    pub lang_tgt: String,
    pub quality: f64,
    pub series_id: Option<i64>,
    pub book_id: Option<i64>,
    pub chapter_src: Option<String>,
    pub chapter_tgt: Option<String>,
    pub location: Option<String>,
    pub source_tag: Option<String>,
    pub qe_score: Option<f64>,
    pub bt_score: Option<f64>,
    pub final_score: Option<f64>,
}

pub fn encode_csv(records: &[StagingRecord]) -> Result<Vec<u8>, StagingError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| StagingError::Csv(e.into_error().into()))
}

pub fn decode_csv(bytes: &[u8]) -> Result<Vec<StagingRecord>, StagingError> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes)
        .deserialize()
        .map(|r| r.map_err(StagingError::from))
        .collect()
}

/// Line-load CSV into the run's staging partition. Returns rows loaded.
pub async fn load_csv(pool: &SqlitePool, run_id: &str, bytes: &[u8]) -> Result<u64, StagingError> {
    let records = decode_csv(bytes)?;
    if records.is_empty() {
        return Ok(0);
    }

    let created_at = now_timestamp();
    let mut tx = pool.begin().await?;
    let mut loaded = 0u64;

    for chunk in records.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (run_id, src, tgt, lang_src, lang_tgt, quality, series_id, book_id, \
             chapter_src, chapter_tgt, location, source_tag, qe_score, bt_score, final_score, created_at) ",
            STAGING_TABLE
        ));
        builder.push_values(chunk, |mut row, r| {
            row.push_bind(run_id.to_string())
                .push_bind(r.src.clone())
                .push_bind(r.tgt.clone())
                .push_bind(r.lang_src.clone())
                .push_bind(r.lang_tgt.clone())
                .push_bind(r.quality)
                .push_bind(r.series_id)
                .push_bind(r.book_id)
                .push_bind(r.chapter_src.clone())
                .push_bind(r.chapter_tgt.clone())
                .push_bind(r.location.clone())
                .push_bind(r.source_tag.clone())
                .push_bind(r.qe_score)
                .push_bind(r.bt_score)
                .push_bind(r.final_score)
                .push_bind(created_at.clone());
        });
        loaded += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    debug!(run_id, rows = loaded, "Staging partition loaded");
    Ok(loaded)
}

/// Encode and load in one step
pub async fn stage_records(
    pool: &SqlitePool,
    run_id: &str,
    records: &[StagingRecord],
) -> Result<u64, StagingError> {
    let bytes = encode_csv(records)?;
    load_csv(pool, run_id, &bytes).await
}

/// Rows currently staged for a run
pub async fn count_run(pool: &SqlitePool, run_id: &str) -> Result<i64, StagingError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE run_id = ?", STAGING_TABLE);
    Ok(sqlx::query_scalar(&sql).bind(run_id).fetch_one(pool).await?)
}

/// Drop both staging partitions of a run (used after a failed run)
pub async fn discard_run(pool: &SqlitePool, run_id: &str) -> Result<u64, StagingError> {
    let mut removed = 0;
    for table in [STAGING_TABLE, EMB_STAGING_TABLE] {
        let sql = format!("DELETE FROM {} WHERE run_id = ?", table);
        removed += sqlx::query(&sql).bind(run_id).execute(pool).await?.rows_affected();
    }
    Ok(removed)
}

/// Purge staging partitions older than `max_age_minutes` left by interrupted runs
pub async fn purge_stale(pool: &SqlitePool, max_age_minutes: i64) -> Result<u64, StagingError> {
    let cutoff = timestamp(chrono::Utc::now() - chrono::Duration::minutes(max_age_minutes.max(0)));
    let mut purged = 0;
    for table in [STAGING_TABLE, EMB_STAGING_TABLE] {
        let sql = format!("DELETE FROM {} WHERE created_at < ?", table);
        purged += sqlx::query(&sql).bind(&cutoff).execute(pool).await?.rows_affected();
    }
    if purged > 0 {
        info!(rows = purged, cutoff = %cutoff, "Purged stale staging rows");
    }
    Ok(purged)
}
