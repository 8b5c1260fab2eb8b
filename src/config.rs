//! Configuration management for ledgerfeed.
//!
//! Settings come from a TOML file in the data directory with environment
//! overrides on top; `.env` files are honored at startup. Secrets (state
//! signing key, cron pepper) are generated on `init` and written to the
//! config file; when the service starts without them it generates ephemeral
//! values and warns, since tokens and hashes then won't survive a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::oauth::OAuthApp;

const CONFIG_FILE: &str = "config.toml";

/// Service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory for the database, documents and config file.
    pub data_dir: PathBuf,
    pub listen_host: String,
    pub listen_port: u16,
    /// External base URL of this service; the OAuth redirect URI is derived
    /// from it.
    pub public_base_url: String,
    /// Key material for the OAuth state token MAC.
    pub state_key: String,
    /// Pepper mixed into cron secret hashes.
    pub cron_pepper: String,
    /// Deployment-wide shared key accepted by the automation entry points.
    pub global_cron_key: Option<String>,
    /// Per-call timeout for provider operations, in seconds.
    pub request_timeout_secs: u64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub microsoft_client_id: String,
    pub microsoft_client_secret: String,
    /// Tenant -> admin user ids. Empty means the upstream gateway enforces.
    pub tenant_admins: HashMap<String, Vec<String>>,
    /// Tenant -> capability keys. Empty means all capabilities are granted.
    pub tenant_capabilities: HashMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8321,
            public_base_url: "http://127.0.0.1:8321".to_string(),
            state_key: String::new(),
            cron_pepper: String::new(),
            global_cron_key: None,
            request_timeout_secs: 30,
            google_client_id: String::new(),
            google_client_secret: String::new(),
            microsoft_client_id: String::new(),
            microsoft_client_secret: String::new(),
            tenant_admins: HashMap::new(),
            tenant_capabilities: HashMap::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("ledgerfeed"))
        .unwrap_or_else(|| PathBuf::from(".ledgerfeed"))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

impl Settings {
    /// Load settings: file (if present), then environment overrides.
    pub fn load(data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let dir = data_dir
            .map(|p| p.to_path_buf())
            .or_else(|| {
                std::env::var("LEDGERFEED_DATA_DIR")
                    .ok()
                    .map(|raw| PathBuf::from(shellexpand::tilde(&raw).into_owned()))
            })
            .unwrap_or_else(default_data_dir);

        let config_path = dir.join(CONFIG_FILE);
        let mut settings = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&raw)?
        } else {
            Settings::default()
        };
        settings.data_dir = dir;

        settings.apply_env_overrides();
        settings.ensure_secrets();

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        let overrides: &mut [(&str, &mut String)] = &mut [
            ("LEDGERFEED_PUBLIC_BASE_URL", &mut self.public_base_url),
            ("LEDGERFEED_STATE_KEY", &mut self.state_key),
            ("LEDGERFEED_CRON_PEPPER", &mut self.cron_pepper),
            ("GOOGLE_CLIENT_ID", &mut self.google_client_id),
            ("GOOGLE_CLIENT_SECRET", &mut self.google_client_secret),
            ("MICROSOFT_CLIENT_ID", &mut self.microsoft_client_id),
            ("MICROSOFT_CLIENT_SECRET", &mut self.microsoft_client_secret),
        ];
        for (name, slot) in overrides.iter_mut() {
            if let Ok(value) = std::env::var(*name) {
                **slot = value;
            }
        }

        if let Ok(value) = std::env::var("LEDGERFEED_GLOBAL_CRON_KEY") {
            self.global_cron_key = Some(value).filter(|v| !v.is_empty());
        }
        if let Ok(value) = std::env::var("LEDGERFEED_LISTEN_PORT") {
            if let Ok(port) = value.parse() {
                self.listen_port = port;
            }
        }
    }

    /// Fill in missing secret material. Ephemeral values keep the service
    /// functional but don't survive restarts; `init` persists real ones.
    fn ensure_secrets(&mut self) {
        if self.state_key.is_empty() {
            warn!("no state_key configured; generating an ephemeral one (OAuth round trips will not survive a restart)");
            self.state_key = random_hex(32);
        }
        if self.cron_pepper.is_empty() {
            warn!("no cron_pepper configured; generating an ephemeral one (existing cron secrets will stop verifying after a restart)");
            self.cron_pepper = random_hex(32);
        }
    }

    /// Write the current settings to the config file, generating persistent
    /// secrets first. Used by `ledgerfeed init`.
    pub fn persist(&mut self) -> anyhow::Result<PathBuf> {
        if self.state_key.is_empty() {
            self.state_key = random_hex(32);
        }
        if self.cron_pepper.is_empty() {
            self.cron_pepper = random_hex(32);
        }

        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(CONFIG_FILE);
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ledgerfeed.db")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    /// The redirect URI registered with both OAuth providers.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/oauth/callback", self.public_base_url.trim_end_matches('/'))
    }

    /// Derived 32-byte key for the state token MAC.
    pub fn state_mac_key(&self) -> [u8; 32] {
        blake3::derive_key("ledgerfeed oauth state v1", self.state_key.as_bytes())
    }

    pub fn oauth_apps(&self) -> (OAuthApp, OAuthApp) {
        (
            OAuthApp {
                client_id: self.google_client_id.clone(),
                client_secret: self.google_client_secret.clone(),
            },
            OAuthApp {
                client_id: self.microsoft_client_id.clone(),
                client_secret: self.microsoft_client_secret.clone(),
            },
        )
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_port, 8321);
        assert_eq!(settings.request_timeout_secs, 30);
        assert!(settings.tenant_admins.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempdir().unwrap();
        let mut settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let path = settings.persist().unwrap();
        assert!(path.exists());
        assert!(!settings.state_key.is_empty());

        let reloaded = Settings::load(Some(dir.path())).unwrap();
        assert_eq!(reloaded.state_key, settings.state_key);
        assert_eq!(reloaded.cron_pepper, settings.cron_pepper);
    }

    #[test]
    fn test_oauth_redirect_uri_strips_trailing_slash() {
        let settings = Settings {
            public_base_url: "https://books.example.com/".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.oauth_redirect_uri(),
            "https://books.example.com/oauth/callback"
        );
    }
}
