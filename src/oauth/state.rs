//! Signed state tokens for the OAuth round trip.
//!
//! The token carries {source, initiating user, issue time, return path}
//! across the redirect and back, authenticated with a keyed blake3 MAC over
//! the encoded claims. Nothing is persisted server-side; tamper-evidence,
//! the expiry window, and the embedded user id are the whole contract.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long a state token stays valid after issuance.
pub const STATE_TTL_SECS: i64 = 600;

/// Error types for state verification. Deliberately coarse; callers map all
/// of them to the same authorization failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("state token is malformed")]
    Malformed,
    #[error("state token signature mismatch")]
    Signature,
    #[error("state token expired")]
    Expired,
}

/// Claims carried across the OAuth round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateClaims {
    pub source_id: String,
    pub user_id: String,
    /// Unix seconds at issuance.
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

impl StateClaims {
    pub fn new(source_id: String, user_id: String, return_to: Option<String>) -> Self {
        Self {
            source_id,
            user_id,
            issued_at: Utc::now().timestamp(),
            return_to,
        }
    }
}

/// Sign claims into a `payload.mac` token.
pub fn sign_state(key: &[u8; 32], claims: &StateClaims) -> String {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    let mac = blake3::keyed_hash(key, payload.as_bytes());
    format!("{}.{}", payload, mac.to_hex())
}

/// Verify a token's signature and expiry, returning the claims.
///
/// Signature is checked before anything is decoded, and the comparison is
/// constant-time (blake3::Hash equality). Audience binding against the
/// current caller happens at the call site, which knows who that is.
pub fn verify_state(
    key: &[u8; 32],
    token: &str,
    now: DateTime<Utc>,
) -> Result<StateClaims, StateError> {
    let (payload, mac_hex) = token.split_once('.').ok_or(StateError::Malformed)?;

    let mut mac_bytes = [0u8; 32];
    hex::decode_to_slice(mac_hex, &mut mac_bytes).map_err(|_| StateError::Malformed)?;
    let presented = blake3::Hash::from(mac_bytes);

    let expected = blake3::keyed_hash(key, payload.as_bytes());
    if expected != presented {
        return Err(StateError::Signature);
    }

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| StateError::Malformed)?;
    let claims: StateClaims = serde_json::from_slice(&raw).map_err(|_| StateError::Malformed)?;

    if now.timestamp() - claims.issued_at > STATE_TTL_SECS {
        return Err(StateError::Expired);
    }

    Ok(claims)
}

/// Keep only path-only return locations: must start with `/` and must not be
/// scheme-relative (`//host`), so the post-consent redirect can never leave
/// the application origin.
pub fn sanitize_return_to(raw: Option<&str>) -> Option<String> {
    let path = raw?.trim();
    if path.starts_with('/') && !path.starts_with("//") {
        Some(path.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> [u8; 32] {
        blake3::derive_key("ledgerfeed oauth state v1", b"test key material")
    }

    fn claims() -> StateClaims {
        StateClaims::new("src-1".into(), "user-1".into(), Some("/settings".into()))
    }

    #[test]
    fn test_round_trip() {
        let token = sign_state(&key(), &claims());
        let verified = verify_state(&key(), &token, Utc::now()).unwrap();
        assert_eq!(verified.source_id, "src-1");
        assert_eq!(verified.user_id, "user-1");
        assert_eq!(verified.return_to.as_deref(), Some("/settings"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_state(&key(), &claims());
        let (payload, mac) = token.split_once('.').unwrap();

        let other = StateClaims::new("src-2".into(), "user-1".into(), None);
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap());
        let forged = format!("{}.{}", forged_payload, mac);

        assert_eq!(
            verify_state(&key(), &forged, Utc::now()),
            Err(StateError::Signature)
        );
        // Original still verifies
        assert!(verify_state(&key(), &format!("{}.{}", payload, mac), Utc::now()).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = sign_state(&key(), &claims());
        let other_key = blake3::derive_key("ledgerfeed oauth state v1", b"different material");
        assert_eq!(
            verify_state(&other_key, &token, Utc::now()),
            Err(StateError::Signature)
        );
    }

    #[test]
    fn test_expired_rejected_despite_valid_signature() {
        let mut c = claims();
        c.issued_at = (Utc::now() - Duration::minutes(11)).timestamp();
        let token = sign_state(&key(), &c);
        assert_eq!(
            verify_state(&key(), &token, Utc::now()),
            Err(StateError::Expired)
        );
    }

    #[test]
    fn test_just_inside_window_accepted() {
        let mut c = claims();
        c.issued_at = (Utc::now() - Duration::minutes(9)).timestamp();
        let token = sign_state(&key(), &c);
        assert!(verify_state(&key(), &token, Utc::now()).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(
            verify_state(&key(), "no-separator", Utc::now()),
            Err(StateError::Malformed)
        );
        assert_eq!(
            verify_state(&key(), "payload.nothex", Utc::now()),
            Err(StateError::Malformed)
        );
    }

    #[test]
    fn test_sanitize_return_to() {
        assert_eq!(
            sanitize_return_to(Some("/settings/feeds")),
            Some("/settings/feeds".to_string())
        );
        assert_eq!(sanitize_return_to(Some("//evil.example.com")), None);
        assert_eq!(sanitize_return_to(Some("https://evil.example.com")), None);
        assert_eq!(sanitize_return_to(Some("relative/path")), None);
        assert_eq!(sanitize_return_to(None), None);
    }
}
