//! Merge a run's staging partition into the durable inbox
//!
//! **One transaction, three statements:**
//! 1. Existing keys: numeric fields keep the best value, missing chapter and
//!    location labels are filled, status moves only upward
//! 2. New keys: insert with the first-insert status rule
//! 3. Delete the run's staging rows
//!
//! Staging rows are first reduced to one per dedup key, keeping the highest
//! quality and the latest row on ties. Re-running a merge over the same
//! partition is a no-op once the partition is gone.
//!
//! The status rules mirror [`ScoreComposer::classify`] and
//! [`ScoreComposer::promote`].
//!
//! [`ScoreComposer::classify`]: crate::scoring::ScoreComposer::classify
//! [`ScoreComposer::promote`]: crate::scoring::ScoreComposer::promote

use super::now_timestamp;
use super::schema::{INBOX_TABLE, STAGING_TABLE};
use crate::config::ScoringConfig;
use bookpair_common::db::retry_on_lock;
use bookpair_common::Result;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use tracing::info;

/// Rows touched by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub updated: u64,
    pub inserted: u64,
}

impl MergeStats {
    pub fn merged(&self) -> u64 {
        self.updated + self.inserted
    }
}

/// Best staged row per dedup key for run `?1`, exposed as `b`
static BEST_STAGED: Lazy<String> = Lazy::new(|| {
    format!(
        "WITH ranked AS (
            SELECT s.*, ROW_NUMBER() OVER (
                PARTITION BY s.src, s.tgt, s.lang_src, s.lang_tgt,
                             COALESCE(s.series_id, 0), COALESCE(s.book_id, 0), COALESCE(s.source_tag, '')
                ORDER BY s.quality DESC, s.created_at DESC, s.rowid DESC
            ) AS rn
            FROM {staging} s
            WHERE s.run_id = ?1
        ),
        b AS (SELECT * FROM ranked WHERE rn = 1)",
        staging = STAGING_TABLE
    )
});

const KEY_MATCH: &str = "t.src = b.src AND t.tgt = b.tgt
    AND t.lang_src = b.lang_src AND t.lang_tgt = b.lang_tgt
    AND COALESCE(t.series_id, 0) = COALESCE(b.series_id, 0)
    AND COALESCE(t.book_id, 0) = COALESCE(b.book_id, 0)
    AND COALESCE(t.source_tag, '') = COALESCE(b.source_tag, '')";

/// NULL-aware max of `t.col` and `b.col`
fn best_of(column: &str) -> String {
    format!(
        "MAX(COALESCE(t.{c}, b.{c}), COALESCE(b.{c}, t.{c}))",
        c = column
    )
}

/// `?2` good_min, `?3` qe_good_min, `?4` suspect_min
///
/// Scores keep their best value; promotion is judged on the staged row alone.
static UPDATE_EXISTING: Lazy<String> = Lazy::new(|| {
    let final_score = best_of("final_score");
    let qe_score = best_of("qe_score");
    format!(
        "{best}
        UPDATE {inbox} AS t SET
            quality = MAX(t.quality, b.quality),
            qe_score = {qe},
            bt_score = {bt},
            final_score = {fs},
            chapter_src = COALESCE(t.chapter_src, b.chapter_src),
            chapter_tgt = COALESCE(t.chapter_tgt, b.chapter_tgt),
            location = COALESCE(t.location, b.location),
            status = CASE
                WHEN t.status IN ('good', 'approved') THEN t.status
                WHEN COALESCE(b.final_score, 0) >= ?2 AND COALESCE(b.qe_score, 0) >= ?3 THEN 'good'
                WHEN t.status IN ('pending', 'rejected', 'suspect') AND COALESCE(b.final_score, 0) >= ?4 THEN 'suspect'
                ELSE t.status
            END
        FROM b
        WHERE {key}",
        best = &*BEST_STAGED,
        inbox = INBOX_TABLE,
        qe = qe_score,
        bt = best_of("bt_score"),
        fs = final_score,
        key = KEY_MATCH,
    )
});

/// `?2` good_min, `?3` qe_good_min, `?4` suspect_min, `?5` created_at
static INSERT_NEW: Lazy<String> = Lazy::new(|| {
    format!(
        "{best}
        INSERT INTO {inbox} (src, tgt, lang_src, lang_tgt, quality, series_id, book_id,
                             chapter_src, chapter_tgt, location, source_tag,
                             qe_score, bt_score, final_score, status, created_at)
        SELECT b.src, b.tgt, b.lang_src, b.lang_tgt, b.quality, b.series_id, b.book_id,
               b.chapter_src, b.chapter_tgt, b.location, b.source_tag,
               b.qe_score, b.bt_score, b.final_score,
               CASE
                   WHEN COALESCE(b.final_score, 0) >= ?2 AND COALESCE(b.qe_score, 0) >= ?3 THEN 'good'
                   WHEN COALESCE(b.final_score, 0) >= ?4 THEN 'suspect'
                   ELSE 'bad'
               END,
               ?5
        FROM b
        WHERE NOT EXISTS (SELECT 1 FROM {inbox} t WHERE {key})",
        best = &*BEST_STAGED,
        inbox = INBOX_TABLE,
        key = KEY_MATCH,
    )
});

/// Merge the staging partition of `run_id` into the inbox
pub async fn consolidate(
    pool: &SqlitePool,
    run_id: &str,
    scoring: &ScoringConfig,
    max_lock_wait_ms: u64,
) -> Result<MergeStats> {
    let stats = retry_on_lock("consolidate staging", max_lock_wait_ms, || {
        merge_once(pool, run_id, scoring)
    })
    .await?;

    info!(
        run_id,
        updated = stats.updated,
        inserted = stats.inserted,
        "Staging merged into inbox"
    );
    Ok(stats)
}

async fn merge_once(pool: &SqlitePool, run_id: &str, scoring: &ScoringConfig) -> Result<MergeStats> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(&UPDATE_EXISTING)
        .bind(run_id)
        .bind(scoring.good_min)
        .bind(scoring.qe_good_min)
        .bind(scoring.suspect_min)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let inserted = sqlx::query(&INSERT_NEW)
        .bind(run_id)
        .bind(scoring.good_min)
        .bind(scoring.qe_good_min)
        .bind(scoring.suspect_min)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query(&format!("DELETE FROM {} WHERE run_id = ?", STAGING_TABLE))
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(MergeStats { updated, inserted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::inbox::{count_by_status, fetch_by_key, DedupKey};
    use crate::db::staging::{count_run, stage_records, StagingRecord};
    use crate::db::test_support::setup_test_db;
    use crate::models::InboxStatus;
    use crate::scoring::ScoreComposer;

    fn record(src: &str, quality: f64, qe: Option<f64>, final_score: Option<f64>) -> StagingRecord {
        StagingRecord {
            src: src.to_string(),
            tgt: format!("{} (pt)", src),
            lang_src: "en".into(),
            lang_tgt: "pt".into(),
            quality,
            series_id: None,
            book_id: Some(1),
            chapter_src: None,
            chapter_tgt: None,
            location: Some("spine=0;block=0;sent=0".into()),
            source_tag: None,
            qe_score: qe,
            bt_score: None,
            final_score,
        }
    }

    fn key(src: &str) -> DedupKey {
        DedupKey {
            src: src.to_string(),
            tgt: format!("{} (pt)", src),
            lang_src: "en".into(),
            lang_tgt: "pt".into(),
            series_id: None,
            book_id: Some(1),
            source_tag: None,
        }
    }

    async fn merge(pool: &SqlitePool, run: &str, records: &[StagingRecord]) -> MergeStats {
        stage_records(pool, run, records).await.unwrap();
        consolidate(pool, run, &ScoringConfig::default(), 1000).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_insert_classifies() {
        let pool = setup_test_db().await;
        let stats = merge(
            &pool,
            "r1",
            &[
                record("good", 0.9, Some(0.9), Some(0.9)),
                record("suspect", 0.9, Some(0.1), Some(0.6)),
                record("bad", 0.9, None, Some(0.2)),
            ],
        )
        .await;

        assert_eq!(stats, MergeStats { updated: 0, inserted: 3 });
        assert_eq!(fetch_by_key(&pool, &key("good")).await.unwrap().unwrap().status, "good");
        assert_eq!(fetch_by_key(&pool, &key("suspect")).await.unwrap().unwrap().status, "suspect");
        assert_eq!(fetch_by_key(&pool, &key("bad")).await.unwrap().unwrap().status, "bad");
        assert_eq!(count_run(&pool, "r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_in_run_keep_best_quality() {
        let pool = setup_test_db().await;
        let mut low = record("dup", 0.4, Some(0.2), Some(0.3));
        low.chapter_src = Some("low".into());
        let mut high = record("dup", 0.8, Some(0.3), Some(0.4));
        high.chapter_src = Some("high".into());

        let stats = merge(&pool, "r1", &[low, high]).await;

        assert_eq!(stats.inserted, 1);
        let row = fetch_by_key(&pool, &key("dup")).await.unwrap().unwrap();
        assert_eq!(row.quality, 0.8);
        assert_eq!(row.chapter_src.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_remerge_keeps_best_and_fills_chapters() {
        let pool = setup_test_db().await;
        merge(&pool, "r1", &[record("line", 0.9, Some(0.6), Some(0.7))]).await;

        let mut weaker = record("line", 0.5, Some(0.2), Some(0.3));
        weaker.chapter_tgt = Some("Capítulo 1".into());
        let stats = merge(&pool, "r2", &[weaker]).await;

        assert_eq!(stats, MergeStats { updated: 1, inserted: 0 });
        let row = fetch_by_key(&pool, &key("line")).await.unwrap().unwrap();
        assert_eq!(row.quality, 0.9);
        assert_eq!(row.qe_score, Some(0.6));
        assert_eq!(row.final_score, Some(0.7));
        assert_eq!(row.chapter_tgt.as_deref(), Some("Capítulo 1"));
        assert_eq!(row.status, "suspect");
    }

    #[tokio::test]
    async fn test_status_promotes_but_never_regresses() {
        let pool = setup_test_db().await;
        merge(&pool, "r1", &[record("up", 0.9, Some(0.1), Some(0.6))]).await;
        merge(&pool, "r2", &[record("up", 0.9, Some(0.9), Some(0.9))]).await;
        assert_eq!(fetch_by_key(&pool, &key("up")).await.unwrap().unwrap().status, "good");

        sqlx::query("UPDATE tm_bookpair_inbox SET status = 'approved' WHERE src = 'up'")
            .execute(&pool)
            .await
            .unwrap();
        merge(&pool, "r3", &[record("up", 0.1, Some(0.0), Some(0.0))]).await;
        assert_eq!(fetch_by_key(&pool, &key("up")).await.unwrap().unwrap().status, "approved");
    }

    #[tokio::test]
    async fn test_pending_and_rejected_move_to_suspect() {
        let pool = setup_test_db().await;
        merge(&pool, "r1", &[record("p", 0.9, None, Some(0.1)), record("r", 0.9, None, Some(0.1))]).await;
        sqlx::query("UPDATE tm_bookpair_inbox SET status = 'pending' WHERE src = 'p'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE tm_bookpair_inbox SET status = 'rejected' WHERE src = 'r'")
            .execute(&pool)
            .await
            .unwrap();

        merge(&pool, "r2", &[record("p", 0.9, None, Some(0.6)), record("r", 0.9, None, Some(0.6))]).await;

        assert_eq!(fetch_by_key(&pool, &key("p")).await.unwrap().unwrap().status, "suspect");
        assert_eq!(fetch_by_key(&pool, &key("r")).await.unwrap().unwrap().status, "suspect");
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let pool = setup_test_db().await;
        let records = vec![record("a", 0.9, Some(0.9), Some(0.9)), record("b", 0.7, None, Some(0.4))];
        stage_records(&pool, "r1", &records).await.unwrap();

        let first = consolidate(&pool, "r1", &ScoringConfig::default(), 1000).await.unwrap();
        let second = consolidate(&pool, "r1", &ScoringConfig::default(), 1000).await.unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second, MergeStats::default());
        let counts = count_by_status(&pool).await.unwrap();
        assert_eq!(counts.values().sum::<i64>(), 2);
    }

    #[tokio::test]
    async fn test_sql_promotion_matches_composer() {
        let composer = ScoreComposer::default();
        let cases = [
            (InboxStatus::Pending, 0.60, 0.10),
            (InboxStatus::Suspect, 0.85, 0.80),
            (InboxStatus::Bad, 0.60, 0.10),
            (InboxStatus::Bad, 0.90, 0.90),
            (InboxStatus::Rejected, 0.30, 0.90),
        ];

        for (i, (current, fs, qe)) in cases.into_iter().enumerate() {
            let pool = setup_test_db().await;
            let src = format!("case{}", i);
            merge(&pool, "seed", &[record(&src, 0.5, Some(0.0), Some(0.0))]).await;
            sqlx::query("UPDATE tm_bookpair_inbox SET status = ?")
                .bind(current.as_str())
                .execute(&pool)
                .await
                .unwrap();

            merge(&pool, "next", &[record(&src, 0.5, Some(qe), Some(fs))]).await;

            let row = fetch_by_key(&pool, &key(&src)).await.unwrap().unwrap();
            let expected = composer.promote(current, Some(fs), Some(qe));
            assert_eq!(row.status, expected.as_str(), "case {:?}", (current, fs, qe));
        }
    }

    #[tokio::test]
    async fn test_promotion_judges_new_evidence_not_combined_maxima() {
        let pool = setup_test_db().await;
        merge(&pool, "r1", &[record("mix", 0.9, Some(0.1), Some(0.9))]).await;
        let before = fetch_by_key(&pool, &key("mix")).await.unwrap().unwrap();
        assert_eq!(before.status, "suspect");

        merge(&pool, "r2", &[record("mix", 0.9, Some(0.9), Some(0.3))]).await;

        let row = fetch_by_key(&pool, &key("mix")).await.unwrap().unwrap();
        let expected = ScoreComposer::default().promote(InboxStatus::Suspect, Some(0.3), Some(0.9));
        assert_eq!(row.status, expected.as_str());
        assert_eq!(row.status, "suspect");
        assert_eq!(row.final_score, Some(0.9));
        assert_eq!(row.qe_score, Some(0.9));
    }
}
