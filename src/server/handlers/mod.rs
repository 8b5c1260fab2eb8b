//! HTTP handlers.

mod cron_api;
mod oauth;
mod sources;
mod sync_api;
pub mod types;

pub use cron_api::{cron_run, cron_status, rotate_cron_secret};
pub use oauth::{oauth_callback, oauth_start};
pub use sources::{
    disconnect_source, list_sources, set_credentials, source_status, upsert_source,
};
pub use sync_api::{import_source, test_source};

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use super::AppState;
use crate::models::Source;
use crate::services::DOCUMENT_FEEDS_CAPABILITY;
use types::ApiError;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// The authenticated caller, as injected by the platform gateway.
pub(crate) fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".into()))
}

/// Require the caller to administer the tenant, and the tenant to hold the
/// document-feeds entitlement. Returns the caller id.
pub(crate) async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    tenant_id: &str,
) -> Result<String, ApiError> {
    let user_id = caller_id(headers)?;

    if !state.directory.is_tenant_admin(&user_id, tenant_id).await {
        return Err(ApiError::Forbidden(format!(
            "user is not an admin of tenant {}",
            tenant_id
        )));
    }
    if !state
        .entitlements
        .tenant_has_capability(tenant_id, DOCUMENT_FEEDS_CAPABILITY)
        .await
    {
        return Err(ApiError::Forbidden(
            "tenant does not have the document feeds capability".into(),
        ));
    }

    Ok(user_id)
}

/// Load a source and authorize the caller as an admin of its tenant.
pub(crate) async fn load_source_for_admin(
    state: &AppState,
    headers: &HeaderMap,
    source_id: &str,
) -> Result<Source, ApiError> {
    let source = state
        .sources
        .get(source_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("source {} not found", source_id)))?;

    require_admin(state, headers, &source.tenant_id).await?;
    Ok(source)
}
