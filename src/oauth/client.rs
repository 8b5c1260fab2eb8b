//! Authorization-code and refresh-token exchange.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::connectors::ConnectorError;
use crate::models::SourceProvider;

/// Error types for OAuth operations.
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Missing client credentials or a non-OAuth provider. Setup problem.
    #[error("OAuth client is not configured: {0}")]
    Config(String),
    /// The provider rejected the grant itself (revoked or expired token,
    /// bad code). The credential is dead; retrying will not help.
    #[error("grant rejected: {0}")]
    Rejected(String),
    /// Network trouble or an unexpected provider response.
    #[error("token exchange failed: {0}")]
    Exchange(String),
    /// The provider issued no refresh token. Without one the source cannot
    /// run unattended, so nothing is persisted.
    #[error("provider did not return a refresh token")]
    MissingRefreshToken,
}

impl From<OAuthError> for ConnectorError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Config(msg) => ConnectorError::Config(msg),
            OAuthError::Rejected(msg) => ConnectorError::Auth(msg),
            OAuthError::Exchange(msg) => ConnectorError::Provider(msg),
            OAuthError::MissingRefreshToken => {
                ConnectorError::Provider("provider did not return a refresh token".into())
            }
        }
    }
}

/// Registered client credentials for one provider.
#[derive(Debug, Clone, Default)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthApp {
    fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Token endpoint response. `refresh_token` is present on first consent and
/// whenever the provider rotates the credential during refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

struct ProviderEndpoints {
    authorize: &'static str,
    token: &'static str,
    scope: &'static str,
}

fn endpoints(provider: SourceProvider) -> Option<ProviderEndpoints> {
    match provider {
        SourceProvider::GoogleDrive => Some(ProviderEndpoints {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
            scope: "https://www.googleapis.com/auth/drive.readonly",
        }),
        SourceProvider::Onedrive => Some(ProviderEndpoints {
            authorize: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            token: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            scope: "offline_access Files.Read",
        }),
        _ => None,
    }
}

/// OAuth client shared by the callback handlers and the connector factory.
pub struct OAuthClient {
    http: reqwest::Client,
    google: OAuthApp,
    microsoft: OAuthApp,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        http: reqwest::Client,
        google: OAuthApp,
        microsoft: OAuthApp,
        redirect_uri: String,
    ) -> Self {
        Self {
            http,
            google,
            microsoft,
            redirect_uri,
        }
    }

    fn app_for(&self, provider: SourceProvider) -> Result<&OAuthApp, OAuthError> {
        let app = match provider {
            SourceProvider::GoogleDrive => &self.google,
            SourceProvider::Onedrive => &self.microsoft,
            _ => {
                return Err(OAuthError::Config(format!(
                    "{} is not an OAuth provider",
                    provider.as_str()
                )))
            }
        };
        if !app.is_configured() {
            return Err(OAuthError::Config(format!(
                "no client credentials registered for {}",
                provider.as_str()
            )));
        }
        Ok(app)
    }

    /// Build the provider's consent URL.
    ///
    /// Offline access and forced consent are always requested so a refresh
    /// token is guaranteed on completion; without one the source could never
    /// run unattended.
    pub fn build_authorize_url(
        &self,
        provider: SourceProvider,
        state: &str,
    ) -> Result<Url, OAuthError> {
        let app = self.app_for(provider)?;
        let endpoints = endpoints(provider)
            .ok_or_else(|| OAuthError::Config("provider has no OAuth endpoints".into()))?;

        let mut url = Url::parse(endpoints.authorize)
            .map_err(|e| OAuthError::Config(format!("authorize endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &app.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", endpoints.scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens. A response without a
    /// refresh token is a hard error; the caller persists nothing.
    pub async fn exchange_code(
        &self,
        provider: SourceProvider,
        code: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.app_for(provider)?;
        let endpoints = endpoints(provider)
            .ok_or_else(|| OAuthError::Config("provider has no OAuth endpoints".into()))?;

        let response = self
            .http
            .post(endpoints.token)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let token = Self::parse_token_response(response).await?;
        if token.refresh_token.is_none() {
            return Err(OAuthError::MissingRefreshToken);
        }
        Ok(token)
    }

    /// Trade the stored refresh token for a fresh access token. The response
    /// may carry a rotated refresh token; the caller must persist it before
    /// using the access token, since the provider has already invalidated the
    /// old one.
    pub async fn refresh(
        &self,
        provider: SourceProvider,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.app_for(provider)?;
        let endpoints = endpoints(provider)
            .ok_or_else(|| OAuthError::Config("provider has no OAuth endpoints".into()))?;

        let response = self
            .http
            .post(endpoints.token)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Self::parse_token_response(response).await
    }

    async fn parse_token_response(
        response: reqwest::Response,
    ) -> Result<TokenResponse, OAuthError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| OAuthError::Exchange(format!("token response parse: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("invalid_grant")
            || status == StatusCode::UNAUTHORIZED
        {
            Err(OAuthError::Rejected(format!("{}: {}", status, body)))
        } else {
            Err(OAuthError::Exchange(format!("{}: {}", status, body)))
        }
    }
}
