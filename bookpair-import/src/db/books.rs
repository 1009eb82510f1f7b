//! Book catalogue flag updates

use super::now_timestamp;
use super::schema::BOOK_TABLE;
use bookpair_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Set `pairs_imported` on a book. Returns false when no such book exists.
pub async fn mark_pairs_imported(pool: &SqlitePool, book_id: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET pairs_imported = 1, pairs_imported_at = ? WHERE id = ?",
        BOOK_TABLE
    );
    let updated = sqlx::query(&sql)
        .bind(now_timestamp())
        .bind(book_id)
        .execute(pool)
        .await?
        .rows_affected();

    if updated == 0 {
        warn!(book_id, "Book not found; pairs_imported not set");
        return Ok(false);
    }
    info!(book_id, "Book marked as pairs imported");
    Ok(true)
}

pub async fn is_pairs_imported(pool: &SqlitePool, book_id: i64) -> Result<bool> {
    let sql = format!("SELECT pairs_imported FROM {} WHERE id = ?", BOOK_TABLE);
    let flag: Option<i64> = sqlx::query_scalar(&sql).bind(book_id).fetch_optional(pool).await?;
    Ok(flag.unwrap_or(0) != 0)
}

/// Register a book, returning its id
pub async fn insert_book(pool: &SqlitePool, title: &str) -> Result<i64> {
    let sql = format!("INSERT INTO {} (title) VALUES (?)", BOOK_TABLE);
    let result = sqlx::query(&sql).bind(title).execute(pool).await?;
    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_db;

    #[tokio::test]
    async fn test_mark_existing_book() {
        let pool = setup_test_db().await;
        let id = insert_book(&pool, "Dom Casmurro").await.unwrap();
        assert!(!is_pairs_imported(&pool, id).await.unwrap());

        assert!(mark_pairs_imported(&pool, id).await.unwrap());
        assert!(is_pairs_imported(&pool, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_missing_book() {
        let pool = setup_test_db().await;
        assert!(!mark_pairs_imported(&pool, 404).await.unwrap());
        assert!(!is_pairs_imported(&pool, 404).await.unwrap());
    }
}
