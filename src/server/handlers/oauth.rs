//! OAuth round-trip handlers.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::super::AppState;
use super::types::ApiError;
use super::{caller_id, load_source_for_admin};
use crate::models::SourceProvider;
use crate::oauth::{sanitize_return_to, sign_state, verify_state, StateClaims};

/// Where the browser lands after consent when no return path was supplied.
const DEFAULT_RETURN_PATH: &str = "/settings/feeds";

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub source_id: String,
    pub return_to: Option<String>,
}

/// First leg: authorize the admin, sign the state token, and send the
/// browser to the provider's consent screen.
pub async fn oauth_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(params): Query<StartParams>,
) -> Result<Redirect, ApiError> {
    let provider = SourceProvider::from_str(&provider)
        .filter(|p| p.is_oauth())
        .ok_or_else(|| ApiError::BadRequest(format!("unknown OAuth provider '{}'", provider)))?;

    let user_id = caller_id(&headers)?;
    let source = load_source_for_admin(&state, &headers, &params.source_id).await?;

    if source.provider != provider {
        return Err(ApiError::BadRequest(format!(
            "source {} is a {} source",
            source.id,
            source.provider.as_str()
        )));
    }

    let claims = StateClaims::new(
        source.id.clone(),
        user_id,
        sanitize_return_to(params.return_to.as_deref()),
    );
    let token = sign_state(&state.state_key, &claims);

    let url = state.oauth.build_authorize_url(provider, &token)?;
    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Provider-reported denial (user clicked cancel, policy block, ...).
    pub error: Option<String>,
}

/// Second leg. Verification order, all before any side effect: state
/// signature, state expiry, caller binding, source existence and tenant
/// admin rights. Only then is the code exchanged; a response without a
/// refresh token aborts with nothing persisted.
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError::Provider {
            message: format!("provider returned '{}'", error),
            hint: Some("the consent screen was cancelled or blocked".into()),
        });
    }

    let token = params
        .state
        .ok_or_else(|| ApiError::BadRequest("missing state parameter".into()))?;
    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("missing code parameter".into()))?;

    // Signature and expiry
    let claims = verify_state(&state.state_key, &token, Utc::now())
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    // Caller binding: the callback must arrive in the same admin's session
    // that started the round trip.
    let user_id = caller_id(&headers)?;
    if user_id != claims.user_id {
        return Err(ApiError::Unauthorized(
            "state token was issued to a different user".into(),
        ));
    }

    // The source must still exist and still be administered by the caller.
    let source = load_source_for_admin(&state, &headers, &claims.source_id).await?;

    let tokens = state.oauth.exchange_code(source.provider, &code).await?;
    let refresh_token = tokens
        .refresh_token
        .ok_or(crate::oauth::OAuthError::MissingRefreshToken)?;

    // The refresh credential fully replaces the source's secret.
    state.vault.store(&source.id, &refresh_token).await?;
    info!(source = %source.id, provider = source.provider.as_str(), "source connected");

    let destination = claims
        .return_to
        .unwrap_or_else(|| DEFAULT_RETURN_PATH.to_string());
    Ok(Redirect::to(&destination))
}
