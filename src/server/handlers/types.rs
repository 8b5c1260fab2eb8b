//! Request/response types and error mapping for the API handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connectors::{ConnectorError, RemoteFile};
use crate::models::{Source, SourceConfig, SourceProvider};
use crate::oauth::OAuthError;
use crate::repository::DieselError;
use crate::services::{ImportFile, ItemResult, SyncError};

/// API error with an HTTP status and an optional actionable hint.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Provider { message: String, hint: Option<String> },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, hint) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Provider { message, hint } => (StatusCode::BAD_GATEWAY, message, hint),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    None,
                )
            }
        };

        let mut body = serde_json::json!({ "error": error });
        if let Some(hint) = hint {
            body["hint"] = serde_json::Value::String(hint);
        }
        (status, Json(body)).into_response()
    }
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ConnectorError> for ApiError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Config(msg) => ApiError::BadRequest(msg),
            ConnectorError::Auth(msg) => ApiError::Provider {
                message: msg,
                hint: Some("the stored credential was rejected; reconnect the source".into()),
            },
            ConnectorError::Provider(msg) => ApiError::Provider {
                message: msg,
                hint: None,
            },
            ConnectorError::Timeout => ApiError::Provider {
                message: "provider request timed out".into(),
                hint: Some("the remote server did not answer in time; try again".into()),
            },
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected => {
                ApiError::BadRequest("source is not connected".to_string())
            }
            SyncError::Connector(e) => e.into(),
            SyncError::Db(e) => e.into(),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Config(msg) => ApiError::BadRequest(msg),
            OAuthError::Rejected(msg) => ApiError::Provider {
                message: msg,
                hint: Some("the provider rejected the grant; reconnect the source".into()),
            },
            OAuthError::Exchange(msg) => ApiError::Provider {
                message: msg,
                hint: None,
            },
            OAuthError::MissingRefreshToken => ApiError::Provider {
                message: "provider did not return a refresh token".into(),
                hint: Some(
                    "approve the consent screen again, including offline access".into(),
                ),
            },
        }
    }
}

/// Upsert request for a source. `id` is assigned when omitted.
#[derive(Debug, Deserialize)]
pub struct UpsertSourceRequest {
    pub id: Option<String>,
    pub tenant_id: String,
    pub name: String,
    pub provider: SourceProvider,
    pub enabled: Option<bool>,
    pub schedule_minutes: Option<i32>,
    #[serde(default)]
    pub config: SourceConfig,
}

/// Source as shown to admins. Credentials never appear here.
#[derive(Debug, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider: SourceProvider,
    pub enabled: bool,
    pub schedule_minutes: i32,
    pub config: SourceConfig,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<Source> for SourceSummary {
    fn from(source: Source) -> Self {
        Self {
            id: source.id,
            tenant_id: source.tenant_id,
            name: source.name,
            provider: source.provider,
            enabled: source.enabled,
            schedule_minutes: source.schedule_minutes,
            config: source.config,
            created_at: source.created_at,
            last_run_at: source.last_run_at,
            last_attempt_at: source.last_attempt_at,
            last_error: source.last_error,
        }
    }
}

/// Direct credential write for the credential-based providers.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub secret: String,
}

/// Body of an import call.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub files: Vec<ImportFile>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub ok: bool,
    pub inserted: usize,
    pub results: Vec<ItemResult>,
}

/// Entry in a test listing, in wire shape.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "modifiedAt", skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl From<RemoteFile> for ListEntry {
    fn from(file: RemoteFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            modified_at: file.modified_at,
            size: file.size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub ok: bool,
    pub list: Vec<ListEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RotateResponse {
    /// The raw secret, shown exactly once.
    pub secret: String,
    pub key_prefix: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}
