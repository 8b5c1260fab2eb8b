//! Interactive test and import handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use super::super::AppState;
use super::load_source_for_admin;
use super::types::{ApiError, ImportRequest, ImportResponse, TestResponse};

/// Connectivity check: list the feed without importing, filtered and capped.
pub async fn test_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let source = load_source_for_admin(&state, &headers, &source_id).await?;

    let files = state.engine.test(&source).await?;
    Ok(Json(TestResponse {
        ok: true,
        list: files.into_iter().map(Into::into).collect(),
    }))
}

/// Import the requested items. Per-item failures stay per-item; the response
/// carries one result line per requested file.
pub async fn import_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let source = load_source_for_admin(&state, &headers, &source_id).await?;

    let report = state.engine.import(&source, &req.files).await?;
    Ok(Json(ImportResponse {
        ok: true,
        inserted: report.inserted,
        results: report.results,
    }))
}
