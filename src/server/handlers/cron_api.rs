//! Unattended (cron-authenticated) handlers and cron secret management.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::require_admin;
use super::types::{ApiError, RotateResponse};
use crate::services::{CronStatus, RunOutcome, DOCUMENT_FEEDS_CAPABILITY};

/// Headers carrying the automation credentials.
const TENANT_KEY_HEADER: &str = "x-cron-key";
const GLOBAL_KEY_HEADER: &str = "x-cron-admin-key";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Authenticate an unattended call for a tenant: the tenant's rotating
/// secret, or the deployment-wide shared key. Either suffices.
async fn authenticate_cron(
    state: &AppState,
    headers: &HeaderMap,
    tenant_id: &str,
) -> Result<(), ApiError> {
    if let Some(supplied) = header_value(headers, TENANT_KEY_HEADER) {
        if state.cron.authenticate(tenant_id, supplied).await? {
            return Ok(());
        }
    }
    if let Some(supplied) = header_value(headers, GLOBAL_KEY_HEADER) {
        if state.cron.check_global(supplied) {
            return Ok(());
        }
    }
    Err(ApiError::Unauthorized(
        "missing or invalid automation credential".into(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct TenantParams {
    pub tenant_id: String,
}

/// Status for monitoring: is automation configured and enabled, and under
/// which key prefix.
pub async fn cron_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TenantParams>,
) -> Result<Json<CronStatus>, ApiError> {
    authenticate_cron(&state, &headers, &params.tenant_id).await?;
    Ok(Json(state.cron.status(&params.tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RunParams {
    pub tenant_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub source_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub ok: bool,
    pub runs: Vec<RunResult>,
}

/// Run the tenant's due sources, bounded by the tenant's run limit (or a
/// smaller requested one). Per-source failures are reported, not fatal.
pub async fn cron_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RunParams>,
) -> Result<Json<RunResponse>, ApiError> {
    authenticate_cron(&state, &headers, &params.tenant_id).await?;

    if !state
        .entitlements
        .tenant_has_capability(&params.tenant_id, DOCUMENT_FEEDS_CAPABILITY)
        .await
    {
        return Err(ApiError::Forbidden(
            "tenant does not have the document feeds capability".into(),
        ));
    }

    let tenant_limit = state.cron.run_limit(&params.tenant_id).await?.max(0) as usize;
    let limit = params
        .limit
        .map(|l| l.min(tenant_limit))
        .unwrap_or(tenant_limit);

    let outcomes = state
        .engine
        .run_due_for_tenant(&params.tenant_id, limit)
        .await?;

    let runs = outcomes
        .into_iter()
        .map(|(source_id, outcome)| match outcome {
            Ok(RunOutcome::Completed(report)) => RunResult {
                source_id,
                status: "completed",
                inserted: Some(report.inserted),
                error: None,
            },
            Ok(RunOutcome::AlreadyRunning) => RunResult {
                source_id,
                status: "already_running",
                inserted: None,
                error: None,
            },
            Err(e) => RunResult {
                source_id,
                status: "error",
                inserted: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(RunResponse { ok: true, runs }))
}

/// Rotate the tenant's cron secret. Admin-authenticated (not cron-
/// authenticated: a leaked cron key must not be able to mint its successor).
/// The response is the only place the raw secret ever appears.
pub async fn rotate_cron_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Path(tenant_id): axum::extract::Path<String>,
) -> Result<Json<RotateResponse>, ApiError> {
    require_admin(&state, &headers, &tenant_id).await?;

    let secret = state.cron.rotate(&tenant_id).await?;
    let status = state.cron.status(&tenant_id).await?;
    Ok(Json(RotateResponse {
        secret,
        key_prefix: status.key_prefix,
    }))
}
