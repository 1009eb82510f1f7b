//! Paired embedding side stream
//!
//! Vectors are staged as JSON arrays under the run's `run_id`, then attached
//! to the matching inbox row (by dedup key) in `tm_bookpair_embeddings`. A
//! later run replaces the vectors and keeps the higher quality.

use super::schema::{EMBEDDINGS_TABLE, EMB_STAGING_TABLE, INBOX_TABLE};
use super::{now_timestamp, StagingError};
use bookpair_common::db::retry_on_lock;
use bookpair_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

const INSERT_CHUNK: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub src: String,
    pub tgt: String,
    pub lang_src: String,
    pub lang_tgt: String,
    pub series_id: Option<i64>,
    pub book_id: Option<i64>,
    pub source_tag: Option<String>,
    pub quality: f64,
    pub emb_src: Vec<f32>,
    pub emb_tgt: Vec<f32>,
}

/// Stage paired vectors for a run. Pairs with an empty vector on either side are skipped.
pub async fn stage_embeddings(
    pool: &SqlitePool,
    run_id: &str,
    records: &[EmbeddingRecord],
) -> std::result::Result<u64, StagingError> {
    let usable: Vec<(&EmbeddingRecord, String, String)> = records
        .iter()
        .filter(|r| !r.emb_src.is_empty() && !r.emb_tgt.is_empty())
        .map(|r| Ok((r, serde_json::to_string(&r.emb_src)?, serde_json::to_string(&r.emb_tgt)?)))
        .collect::<std::result::Result<_, serde_json::Error>>()?;
    if usable.is_empty() {
        return Ok(0);
    }

    let created_at = now_timestamp();
    let mut tx = pool.begin().await?;
    let mut staged = 0u64;

    for chunk in usable.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (run_id, src, tgt, lang_src, lang_tgt, series_id, book_id, source_tag, \
             quality, emb_src, emb_tgt, created_at) ",
            EMB_STAGING_TABLE
        ));
        builder.push_values(chunk, |mut row, (r, src_json, tgt_json)| {
            row.push_bind(run_id.to_string())
                .push_bind(r.src.clone())
                .push_bind(r.tgt.clone())
                .push_bind(r.lang_src.clone())
                .push_bind(r.lang_tgt.clone())
                .push_bind(r.series_id)
                .push_bind(r.book_id)
                .push_bind(r.source_tag.clone())
                .push_bind(r.quality)
                .push_bind(src_json.clone())
                .push_bind(tgt_json.clone())
                .push_bind(created_at.clone());
        });
        staged += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    debug!(run_id, rows = staged, "Embedding partition staged");
    Ok(staged)
}

/// Attach a run's staged vectors to inbox rows, then clear the partition.
///
/// Staged pairs whose key has no inbox row are dropped.
pub async fn consolidate_embeddings(pool: &SqlitePool, run_id: &str, max_lock_wait_ms: u64) -> Result<u64> {
    let upsert = format!(
        "WITH ranked AS (
            SELECT s.*, ROW_NUMBER() OVER (
                PARTITION BY s.src, s.tgt, s.lang_src, s.lang_tgt,
                             COALESCE(s.series_id, 0), COALESCE(s.book_id, 0), COALESCE(s.source_tag, '')
                ORDER BY s.created_at DESC, s.rowid DESC
            ) AS rn
            FROM {staging} s
            WHERE s.run_id = ?1
        )
        INSERT INTO {emb} (inbox_id, emb_src, emb_tgt, dim, quality, updated_at)
        SELECT t.id, r.emb_src, r.emb_tgt, json_array_length(r.emb_src), r.quality, ?2
        FROM ranked r
        JOIN {inbox} t
          ON t.src = r.src AND t.tgt = r.tgt
         AND t.lang_src = r.lang_src AND t.lang_tgt = r.lang_tgt
         AND COALESCE(t.series_id, 0) = COALESCE(r.series_id, 0)
         AND COALESCE(t.book_id, 0) = COALESCE(r.book_id, 0)
         AND COALESCE(t.source_tag, '') = COALESCE(r.source_tag, '')
        WHERE r.rn = 1
        ON CONFLICT(inbox_id) DO UPDATE SET
            emb_src = excluded.emb_src,
            emb_tgt = excluded.emb_tgt,
            dim = excluded.dim,
            quality = MAX({emb}.quality, excluded.quality),
            updated_at = excluded.updated_at",
        staging = EMB_STAGING_TABLE,
        emb = EMBEDDINGS_TABLE,
        inbox = INBOX_TABLE,
    );
    let clear = format!("DELETE FROM {} WHERE run_id = ?", EMB_STAGING_TABLE);
    let (upsert, clear) = (upsert.as_str(), clear.as_str());

    let attached = retry_on_lock("consolidate embeddings", max_lock_wait_ms, move || async move {
        let mut tx = pool.begin().await?;
        let attached = sqlx::query(upsert)
            .bind(run_id)
            .bind(now_timestamp())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(clear).bind(run_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok::<_, bookpair_common::Error>(attached)
    })
    .await?;

    info!(run_id, attached, "Embeddings consolidated");
    Ok(attached)
}

/// Stored vectors for an inbox row
pub async fn fetch_embedding(
    pool: &SqlitePool,
    inbox_id: i64,
) -> std::result::Result<Option<(Vec<f32>, Vec<f32>)>, StagingError> {
    let sql = format!("SELECT emb_src, emb_tgt FROM {} WHERE inbox_id = ?", EMBEDDINGS_TABLE);
    let row: Option<(String, String)> = sqlx::query_as(&sql).bind(inbox_id).fetch_optional(pool).await?;
    match row {
        Some((src, tgt)) => Ok(Some((serde_json::from_str(&src)?, serde_json::from_str(&tgt)?))),
        None => Ok(None),
    }
}
