//! bookpair-import library interface
//!
//! Builds a bilingual translation-memory inbox from two editions of the same
//! book. Exposed for the binary, the HTTP API and integration tests.

pub mod align;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod import;
pub mod models;
pub mod oracle;
pub mod scoring;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::ImportConfig;
use crate::import::ImportOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ImportConfig>,
    pub orchestrator: Arc<ImportOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last import failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<ImportConfig>, orchestrator: Arc<ImportOrchestrator>) -> Self {
        Self {
            db,
            config,
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::import_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
