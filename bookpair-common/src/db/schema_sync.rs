//! Declarative schema maintenance
//!
//! Tables are described in code by a [`TableSchema`] implementation. On every run
//! [`SchemaSync::ensure_table`] brings the database in line with that description:
//!
//! 1. **Create** - `CREATE TABLE IF NOT EXISTS` from the declared columns
//! 2. **Extend** - `ALTER TABLE ADD COLUMN` for each declared column the table lacks
//! 3. **Index** - `CREATE [UNIQUE] INDEX IF NOT EXISTS` for each declared index
//!
//! All three steps are idempotent, so concurrent or repeated runs are harmless.
//! Type and constraint drift on existing columns is reported but never rewritten.
//!
//! ```rust,ignore
//! pub struct BookTable;
//!
//! impl TableSchema for BookTable {
//!     fn table_name() -> &'static str { "book" }
//!     fn expected_columns() -> Vec<ColumnDefinition> {
//!         vec![
//!             ColumnDefinition::new("id", "INTEGER").primary_key(),
//!             ColumnDefinition::new("pairs_imported", "INTEGER").not_null().default("0"),
//!         ]
//!     }
//! }
//!
//! SchemaSync::ensure_table::<BookTable>(&pool).await?;
//! ```

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL", "TIMESTAMP")
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    /// DEFAULT expression, inserted verbatim
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            unique: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// INTEGER PRIMARY KEY AUTOINCREMENT (implies primary key)
    pub fn autoincrement(mut self) -> Self {
        self.primary_key = true;
        self.autoincrement = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Column clause as it appears inside CREATE TABLE
    fn create_clause(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            clause.push_str(" PRIMARY KEY");
            if self.autoincrement {
                clause.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            clause.push_str(" NOT NULL");
        }
        if self.unique {
            clause.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default_value {
            clause.push_str(&format!(" DEFAULT {}", default));
        }
        clause
    }
}

/// Index over columns or expressions
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    /// Indexed terms, each a column name or SQL expression
    pub terms: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, terms: &[&str]) -> Self {
        Self {
            name: name.into(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            table,
            self.terms.join(", ")
        )
    }
}

/// Column as reported by PRAGMA table_info
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub cid: i32,
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub pk: bool,
}

/// Difference between declared and actual schema
#[derive(Debug, Clone)]
pub enum SchemaDrift {
    /// Declared column absent from the table (auto-fixed)
    MissingColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Declared type has a different SQLite affinity (reported only)
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    /// NOT NULL or PRIMARY KEY missing on an existing column (reported only)
    ConstraintMismatch {
        table: String,
        column: String,
        constraint: String,
    },
}

/// Declared schema of one table
pub trait TableSchema {
    fn table_name() -> &'static str;

    /// Column definitions, in creation order
    fn expected_columns() -> Vec<ColumnDefinition>;

    /// Indexes to maintain alongside the table
    fn indexes() -> Vec<IndexDefinition> {
        Vec::new()
    }

    /// CREATE TABLE IF NOT EXISTS statement for the declared columns
    fn create_table_sql() -> String {
        let columns: Vec<String> = Self::expected_columns()
            .iter()
            .map(ColumnDefinition::create_clause)
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            Self::table_name(),
            columns.join(",\n    ")
        )
    }
}

/// Reads the live schema through PRAGMA / sqlite_master
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Columns of `table_name`, ordered by cid
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
                not_null: row.get::<i32, _>("notnull") != 0,
                default_value: row.get("dflt_value"),
                pk: row.get::<i32, _>("pk") != 0,
            })
            .collect();
        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    pub async fn index_exists(pool: &SqlitePool, index_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?)",
        )
        .bind(index_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

/// Declared-vs-actual comparison
pub struct SchemaDiff;

impl SchemaDiff {
    pub fn compare(
        table_name: &str,
        expected: &[ColumnDefinition],
        actual: &[ActualColumn],
    ) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();

        for expected_col in expected {
            let Some(actual_col) = actual.iter().find(|c| c.name == expected_col.name) else {
                drift.push(SchemaDrift::MissingColumn {
                    table: table_name.to_string(),
                    column: expected_col.clone(),
                });
                continue;
            };

            if !Self::types_compatible(&expected_col.sql_type, &actual_col.type_name) {
                drift.push(SchemaDrift::TypeMismatch {
                    table: table_name.to_string(),
                    column: expected_col.name.clone(),
                    expected: expected_col.sql_type.clone(),
                    actual: actual_col.type_name.clone(),
                });
            }
            // INTEGER PRIMARY KEY columns are implicitly NOT NULL without reporting it
            if expected_col.not_null && !actual_col.not_null && !actual_col.pk {
                drift.push(SchemaDrift::ConstraintMismatch {
                    table: table_name.to_string(),
                    column: expected_col.name.clone(),
                    constraint: "NOT NULL".to_string(),
                });
            }
            if expected_col.primary_key && !actual_col.pk {
                drift.push(SchemaDrift::ConstraintMismatch {
                    table: table_name.to_string(),
                    column: expected_col.name.clone(),
                    constraint: "PRIMARY KEY".to_string(),
                });
            }
        }

        drift
    }

    /// SQLite type affinity comparison
    fn types_compatible(expected: &str, actual: &str) -> bool {
        fn affinity(t: &str) -> &'static str {
            let t = t.to_uppercase();
            if t.contains("INT") {
                "INTEGER"
            } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
                "TEXT"
            } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
                "REAL"
            } else if t.is_empty() || t.contains("BLOB") {
                "BLOB"
            } else {
                "NUMERIC"
            }
        }

        expected.eq_ignore_ascii_case(actual) || affinity(expected) == affinity(actual)
    }
}

/// Applies declared schemas to a database
pub struct SchemaSync;

impl SchemaSync {
    /// Create the table if absent, add missing columns, then create missing indexes.
    pub async fn ensure_table<T: TableSchema>(pool: &SqlitePool) -> Result<()> {
        let table_name = T::table_name();

        if !SchemaIntrospector::table_exists(pool, table_name).await? {
            info!(table = table_name, "Creating table");
            sqlx::query(&T::create_table_sql()).execute(pool).await?;
        } else {
            Self::sync_columns(pool, table_name, &T::expected_columns()).await?;
        }

        for index in T::indexes() {
            sqlx::query(&index.create_sql(table_name)).execute(pool).await?;
        }

        Ok(())
    }

    /// Add declared columns missing from an existing table
    ///
    /// **Fixed here:** missing columns.
    /// **Reported only:** type changes, constraint changes (need a table rebuild in SQLite).
    pub async fn sync_columns(
        pool: &SqlitePool,
        table_name: &str,
        expected: &[ColumnDefinition],
    ) -> Result<()> {
        let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
        let drift = SchemaDiff::compare(table_name, expected, &actual);

        if drift.is_empty() {
            debug!(table = table_name, "Schema up to date");
            return Ok(());
        }

        for change in drift {
            match change {
                SchemaDrift::MissingColumn { table, column } => {
                    Self::add_column(pool, &table, &column).await?;
                }
                SchemaDrift::TypeMismatch { table, column, expected, actual } => {
                    warn!(
                        "Type mismatch in {}.{}: expected '{}', found '{}'. Manual migration required.",
                        table, column, expected, actual
                    );
                }
                SchemaDrift::ConstraintMismatch { table, column, constraint } => {
                    warn!(
                        "Constraint mismatch in {}.{}: missing '{}'. Manual migration required.",
                        table, column, constraint
                    );
                }
            }
        }

        Ok(())
    }

    /// ALTER TABLE ADD COLUMN, within SQLite's limits:
    /// no PRIMARY KEY, no UNIQUE, NOT NULL only with a DEFAULT.
    async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
        let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, column.sql_type);

        if column.primary_key || column.unique {
            warn!(
                "Cannot add key constraint on {}.{} via ALTER TABLE, adding plain column",
                table, column.name
            );
        }

        match (&column.default_value, column.not_null) {
            (Some(default), true) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => sql.push_str(&format!(" DEFAULT {}", default)),
            (None, true) => warn!(
                "Cannot add NOT NULL column {}.{} without DEFAULT, adding as nullable",
                table, column.name
            ),
            (None, false) => {}
        }

        info!(table, column = %column.name, sql_type = %column.sql_type, "Adding column");

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                debug!(table, column = %column.name, "Column added concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    struct NotesV1;
    struct NotesV2;

    impl TableSchema for NotesV1 {
        fn table_name() -> &'static str {
            "notes"
        }

        fn expected_columns() -> Vec<ColumnDefinition> {
            vec![
                ColumnDefinition::new("id", "INTEGER").autoincrement(),
                ColumnDefinition::new("body", "TEXT").not_null(),
            ]
        }
    }

    impl TableSchema for NotesV2 {
        fn table_name() -> &'static str {
            "notes"
        }

        fn expected_columns() -> Vec<ColumnDefinition> {
            let mut cols = NotesV1::expected_columns();
            cols.push(ColumnDefinition::new("status", "TEXT").not_null().default("'pending'"));
            cols.push(ColumnDefinition::new("score", "REAL"));
            cols
        }

        fn indexes() -> Vec<IndexDefinition> {
            vec![IndexDefinition::new("ux_notes_body", &["body", "COALESCE(score, 0)"]).unique()]
        }
    }

    #[test]
    fn test_create_table_sql() {
        let sql = NotesV2::create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS notes"));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("status TEXT NOT NULL DEFAULT 'pending'"));
    }

    #[test]
    fn test_types_compatible() {
        assert!(SchemaDiff::types_compatible("text", "TEXT"));
        assert!(SchemaDiff::types_compatible("INTEGER", "BIGINT"));
        assert!(SchemaDiff::types_compatible("TEXT", "VARCHAR(20)"));
        assert!(SchemaDiff::types_compatible("DOUBLE", "REAL"));
        assert!(SchemaDiff::types_compatible("TIMESTAMP", "DATETIME"));
        assert!(!SchemaDiff::types_compatible("TEXT", "INTEGER"));
        assert!(!SchemaDiff::types_compatible("REAL", "TEXT"));
    }

    #[tokio::test]
    async fn test_ensure_creates_missing_table() {
        let pool = setup_test_db().await;

        SchemaSync::ensure_table::<NotesV2>(&pool).await.unwrap();

        let columns = SchemaIntrospector::introspect_table(&pool, "notes").await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "body", "status", "score"]);
        assert!(columns[0].pk);
        assert!(SchemaIntrospector::index_exists(&pool, "ux_notes_body").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_adds_missing_columns_to_existing_table() {
        let pool = setup_test_db().await;
        SchemaSync::ensure_table::<NotesV1>(&pool).await.unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('hello')")
            .execute(&pool)
            .await
            .unwrap();

        SchemaSync::ensure_table::<NotesV2>(&pool).await.unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM notes WHERE body = 'hello'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let pool = setup_test_db().await;
        for _ in 0..3 {
            SchemaSync::ensure_table::<NotesV2>(&pool).await.unwrap();
        }
        let columns = SchemaIntrospector::introspect_table(&pool, "notes").await.unwrap();
        assert_eq!(columns.len(), 4);
    }

    #[tokio::test]
    async fn test_detect_type_mismatch_is_reported_not_fixed() {
        let pool = setup_test_db().await;
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let actual = SchemaIntrospector::introspect_table(&pool, "notes").await.unwrap();
        let drift = SchemaDiff::compare("notes", &NotesV1::expected_columns(), &actual);

        assert_eq!(drift.len(), 1);
        match &drift[0] {
            SchemaDrift::TypeMismatch { column, expected, actual, .. } => {
                assert_eq!(column, "body");
                assert_eq!(expected, "TEXT");
                assert_eq!(actual, "INTEGER");
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unique_expression_index_treats_null_as_sentinel() {
        let pool = setup_test_db().await;
        SchemaSync::ensure_table::<NotesV2>(&pool).await.unwrap();

        sqlx::query("INSERT INTO notes (body, score) VALUES ('a', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        let dup = sqlx::query("INSERT INTO notes (body, score) VALUES ('a', 0)")
            .execute(&pool)
            .await;
        assert!(dup.is_err(), "NULL and 0 must collide through COALESCE");
    }
}
