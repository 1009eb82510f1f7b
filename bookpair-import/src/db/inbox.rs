//! Read helpers over the durable inbox

use super::schema::INBOX_TABLE;
use crate::models::InboxStatus;
use bookpair_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Identity of an inbox row. `None` ids and tag compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub src: String,
    pub tgt: String,
    pub lang_src: String,
    pub lang_tgt: String,
    pub series_id: Option<i64>,
    pub book_id: Option<i64>,
    pub source_tag: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InboxRow {
    pub id: i64,
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
    pub status: String,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl InboxRow {
    /// Parsed status; `None` for values written by other tools
    pub fn status(&self) -> Option<InboxStatus> {
        self.status.parse().ok()
    }
}

pub async fn fetch_by_key(pool: &SqlitePool, key: &DedupKey) -> Result<Option<InboxRow>> {
    let sql = format!(
        "SELECT * FROM {} WHERE src = ? AND tgt = ? AND lang_src = ? AND lang_tgt = ?
           AND COALESCE(series_id, 0) = COALESCE(?, 0)
           AND COALESCE(book_id, 0) = COALESCE(?, 0)
           AND COALESCE(source_tag, '') = COALESCE(?, '')",
        INBOX_TABLE
    );
    let row = sqlx::query_as::<_, InboxRow>(&sql)
        .bind(&key.src)
        .bind(&key.tgt)
        .bind(&key.lang_src)
        .bind(&key.lang_tgt)
        .bind(key.series_id)
        .bind(key.book_id)
        .bind(&key.source_tag)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Rows of one book, oldest first
pub async fn list_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<InboxRow>> {
    let sql = format!("SELECT * FROM {} WHERE book_id = ? ORDER BY id", INBOX_TABLE);
    Ok(sqlx::query_as::<_, InboxRow>(&sql).bind(book_id).fetch_all(pool).await?)
}

/// Row count per status value
pub async fn count_by_status(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let sql = format!("SELECT status, COUNT(*) FROM {} GROUP BY status", INBOX_TABLE);
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}
