//! Table declarations for the import pipeline
//!
//! Applied idempotently at the start of every run via
//! [`SchemaSync::ensure_table`](bookpair_common::db::SchemaSync::ensure_table).

use bookpair_common::db::{ColumnDefinition, IndexDefinition, TableSchema};

pub const INBOX_TABLE: &str = "tm_bookpair_inbox";
pub const STAGING_TABLE: &str = "tm_bookpair_inbox_staging";
pub const EMB_STAGING_TABLE: &str = "tm_bookpair_emb_staging";
pub const EMBEDDINGS_TABLE: &str = "tm_bookpair_embeddings";
pub const BOOK_TABLE: &str = "book";

/// Dedup key terms with NULL sentinels, usable in index definitions and SQL
pub const DEDUP_KEY_TERMS: [&str; 7] = [
    "src",
    "tgt",
    "lang_src",
    "lang_tgt",
    "COALESCE(series_id, 0)",
    "COALESCE(book_id, 0)",
    "COALESCE(source_tag, '')",
];

/// Columns shared by the inbox and its staging table
fn pair_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new("src", "TEXT").not_null(),
        ColumnDefinition::new("tgt", "TEXT").not_null(),
        ColumnDefinition::new("lang_src", "TEXT").not_null(),
        ColumnDefinition::new("lang_tgt", "TEXT").not_null(),
        ColumnDefinition::new("quality", "REAL").not_null().default("0"),
        ColumnDefinition::new("series_id", "INTEGER"),
        ColumnDefinition::new("book_id", "INTEGER"),
        ColumnDefinition::new("chapter_src", "TEXT"),
        ColumnDefinition::new("chapter_tgt", "TEXT"),
        ColumnDefinition::new("location", "TEXT"),
        ColumnDefinition::new("source_tag", "TEXT"),
        ColumnDefinition::new("qe_score", "REAL"),
        ColumnDefinition::new("bt_score", "REAL"),
        ColumnDefinition::new("final_score", "REAL"),
    ]
}

/// Durable translation-memory inbox
pub struct InboxTable;

impl TableSchema for InboxTable {
    fn table_name() -> &'static str {
        INBOX_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![ColumnDefinition::new("id", "INTEGER").autoincrement()];
        columns.extend(pair_columns());
        columns.extend([
            ColumnDefinition::new("status", "TEXT").not_null().default("'pending'"),
            ColumnDefinition::new("reviewer", "TEXT"),
            ColumnDefinition::new("reviewed_at", "TEXT"),
            ColumnDefinition::new("created_at", "TEXT").not_null().default("''"),
        ]);
        columns
    }

    fn indexes() -> Vec<IndexDefinition> {
        vec![
            IndexDefinition::new("ux_tm_bookpair_inbox_key", &DEDUP_KEY_TERMS).unique(),
            IndexDefinition::new("idx_tm_bookpair_inbox_status", &["status"]),
            IndexDefinition::new("idx_tm_bookpair_inbox_book", &["book_id"]),
        ]
    }
}

/// Per-run candidate staging, partitioned by `run_id`
pub struct StagingTable;

impl TableSchema for StagingTable {
    fn table_name() -> &'static str {
        STAGING_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![ColumnDefinition::new("run_id", "TEXT").not_null().default("''")];
        columns.extend(pair_columns());
        columns.push(ColumnDefinition::new("created_at", "TEXT").not_null().default("''"));
        columns
    }

    fn indexes() -> Vec<IndexDefinition> {
        vec![IndexDefinition::new("idx_tm_bookpair_inbox_staging_run", &["run_id"])]
    }
}

/// Per-run paired embedding staging; vectors are JSON arrays
pub struct EmbeddingStagingTable;

impl TableSchema for EmbeddingStagingTable {
    fn table_name() -> &'static str {
        EMB_STAGING_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("run_id", "TEXT").not_null().default("''"),
            ColumnDefinition::new("src", "TEXT").not_null(),
            ColumnDefinition::new("tgt", "TEXT").not_null(),
            ColumnDefinition::new("lang_src", "TEXT").not_null(),
            ColumnDefinition::new("lang_tgt", "TEXT").not_null(),
            ColumnDefinition::new("series_id", "INTEGER"),
            ColumnDefinition::new("book_id", "INTEGER"),
            ColumnDefinition::new("source_tag", "TEXT"),
            ColumnDefinition::new("quality", "REAL").not_null().default("0"),
            ColumnDefinition::new("emb_src", "TEXT").not_null(),
            ColumnDefinition::new("emb_tgt", "TEXT").not_null(),
            ColumnDefinition::new("created_at", "TEXT").not_null().default("''"),
        ]
    }

    fn indexes() -> Vec<IndexDefinition> {
        vec![IndexDefinition::new("idx_tm_bookpair_emb_staging_run", &["run_id"])]
    }
}

/// Paired embeddings keyed by inbox row
pub struct EmbeddingsTable;

impl TableSchema for EmbeddingsTable {
    fn table_name() -> &'static str {
        EMBEDDINGS_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("inbox_id", "INTEGER").primary_key(),
            ColumnDefinition::new("emb_src", "TEXT").not_null(),
            ColumnDefinition::new("emb_tgt", "TEXT").not_null(),
            ColumnDefinition::new("dim", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("quality", "REAL").not_null().default("0"),
            ColumnDefinition::new("updated_at", "TEXT").not_null().default("''"),
        ]
    }
}

/// Minimal book catalogue carrying the import flag
pub struct BookTable;

impl TableSchema for BookTable {
    fn table_name() -> &'static str {
        BOOK_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").autoincrement(),
            ColumnDefinition::new("title", "TEXT"),
            ColumnDefinition::new("pairs_imported", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("pairs_imported_at", "TEXT"),
        ]
    }
}
