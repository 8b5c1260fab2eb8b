//! Source management handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use super::super::AppState;
use super::types::{
    ApiError, CredentialsRequest, OkResponse, SourceSummary, StatusResponse, UpsertSourceRequest,
};
use super::{load_source_for_admin, require_admin};
use crate::models::{Source, MIN_SCHEDULE_MINUTES};

const DEFAULT_SCHEDULE_MINUTES: i32 = 15;

/// Create or update a source. New sources get a generated id; updates keep
/// creation and run bookkeeping intact and cannot move a source between
/// tenants.
pub async fn upsert_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpsertSourceRequest>,
) -> Result<Json<SourceSummary>, ApiError> {
    require_admin(&state, &headers, &req.tenant_id).await?;

    let existing = match &req.id {
        Some(id) => state.sources.get(id).await?,
        None => None,
    };

    let mut source = match existing {
        Some(existing) => {
            if existing.tenant_id != req.tenant_id {
                return Err(ApiError::Forbidden(
                    "source belongs to a different tenant".into(),
                ));
            }
            existing
        }
        None => Source::new(
            req.id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            req.tenant_id.clone(),
            req.name.clone(),
            req.provider,
            req.config.clone(),
        ),
    };

    source.name = req.name;
    source.provider = req.provider;
    source.config = req.config;
    if let Some(enabled) = req.enabled {
        source.enabled = enabled;
    }
    source.schedule_minutes = req
        .schedule_minutes
        .unwrap_or(DEFAULT_SCHEDULE_MINUTES)
        .max(MIN_SCHEDULE_MINUTES);

    state.sources.save(&source).await?;

    let saved = state
        .sources
        .get(&source.id)
        .await?
        .ok_or_else(|| ApiError::Internal("source vanished after save".into()))?;
    Ok(Json(saved.into()))
}

/// List a tenant's sources.
pub async fn list_sources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<SourceSummary>>, ApiError> {
    require_admin(&state, &headers, &tenant_id).await?;

    let sources = state.sources.get_for_tenant(&tenant_id).await?;
    Ok(Json(sources.into_iter().map(SourceSummary::from).collect()))
}

/// Connection status: derived from whether the vault holds a non-empty
/// secret. Only a fingerprint of that secret is ever exposed.
pub async fn source_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let source = load_source_for_admin(&state, &headers, &source_id).await?;

    Ok(Json(StatusResponse {
        connected: state.vault.is_connected(&source.id).await?,
        secret_fingerprint: state.vault.fingerprint(&source.id).await?,
    }))
}

/// Direct credential write for SFTP/FTPS sources. OAuth sources connect
/// through the consent flow instead.
pub async fn set_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let source = load_source_for_admin(&state, &headers, &source_id).await?;

    if source.provider.is_oauth() {
        return Err(ApiError::BadRequest(format!(
            "{} sources connect through the OAuth flow",
            source.provider.as_str()
        )));
    }
    if req.secret.is_empty() {
        return Err(ApiError::BadRequest("secret must not be empty".into()));
    }

    state.vault.store(&source.id, &req.secret).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Explicit disconnect: clears the credential, keeps the source.
pub async fn disconnect_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let source = load_source_for_admin(&state, &headers, &source_id).await?;

    state.vault.clear(&source.id).await?;
    Ok(Json(OkResponse { ok: true }))
}
