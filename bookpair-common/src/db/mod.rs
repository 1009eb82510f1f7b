//! Database helpers shared across bookpair crates

pub mod retry;
pub mod schema_sync;

pub use retry::retry_on_lock;
pub use schema_sync::{
    ColumnDefinition, IndexDefinition, SchemaDiff, SchemaDrift, SchemaIntrospector, SchemaSync,
    TableSchema,
};
