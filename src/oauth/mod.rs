//! OAuth2 connector for the drive providers.
//!
//! Builds consent URLs, exchanges authorization codes, refreshes access
//! tokens for unattended runs, and signs the state token that ties the two
//! legs of the browser round trip together.

mod client;
mod state;

pub use client::{OAuthApp, OAuthClient, OAuthError, TokenResponse};
pub use state::{
    sanitize_return_to, sign_state, verify_state, StateClaims, StateError, STATE_TTL_SECS,
};
