//! Book-pair import endpoints
//!
//! - `POST /import/book-pair` runs one import and returns its summary
//! - `GET /inbox/stats` reports inbox row counts per status

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::db::inbox;
use crate::error::ApiResult;
use crate::import::ImportRequest;
use crate::models::ImportSummary;
use crate::AppState;

/// POST /import/book-pair
///
/// Runs to completion before responding; the summary is the response body.
pub async fn import_book_pair(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    info!(
        src = %request.src_path.display(),
        tgt = %request.tgt_path.display(),
        mode = %request.mode,
        "POST /import/book-pair"
    );

    match state.orchestrator.import_book_pair(&request).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InboxStatsResponse {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

/// GET /inbox/stats
pub async fn inbox_stats(State(state): State<AppState>) -> ApiResult<Json<InboxStatsResponse>> {
    let by_status = inbox::count_by_status(&state.db).await?;
    Ok(Json(InboxStatsResponse {
        total: by_status.values().sum(),
        by_status,
    }))
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import/book-pair", post(import_book_pair))
        .route("/inbox/stats", get(inbox_stats))
}
