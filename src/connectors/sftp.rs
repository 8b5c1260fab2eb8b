//! SFTP adapter.
//!
//! ssh2 is a blocking library, so every operation opens a session inside
//! spawn_blocking, the same sync-under-async pattern the SQLite layer uses.
//! Sessions are per-call; feeds are polled on multi-minute schedules and a
//! held-open session would only rot between runs.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ssh2::Session;

use super::{Connector, ConnectorError, RemoteFile};
use crate::models::Source;

/// SFTP adapter; one session per list/download call.
#[derive(Debug)]
pub struct SftpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    root_path: String,
    timeout: Duration,
}

impl SftpConnector {
    pub fn from_source(
        source: &Source,
        secret: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectorError> {
        let host = source
            .config
            .host
            .clone()
            .ok_or_else(|| ConnectorError::Config("host is not set".into()))?;
        let username = source
            .config
            .username
            .clone()
            .ok_or_else(|| ConnectorError::Config("username is not set".into()))?;

        Ok(Self {
            host,
            port: source.config.port.unwrap_or(22),
            username,
            password: secret.to_string(),
            root_path: source
                .config
                .root_path
                .clone()
                .unwrap_or_else(|| "/".to_string()),
            timeout,
        })
    }

    fn open_session(&self) -> Result<Session, ConnectorError> {
        let addr = format!("{}:{}", self.host, self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectorError::Provider(format!("resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| {
                ConnectorError::Provider(format!("no address found for {}", self.host))
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ConnectorError::Timeout
            } else {
                ConnectorError::Provider(format!("connect {}: {}", addr, e))
            }
        })?;

        let mut session = Session::new()
            .map_err(|e| ConnectorError::Provider(format!("ssh session: {}", e)))?;
        session.set_tcp_stream(stream);
        session.set_timeout(self.timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| ConnectorError::Provider(format!("ssh handshake: {}", e)))?;

        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| ConnectorError::Auth(format!("password rejected: {}", e)))?;
        if !session.authenticated() {
            return Err(ConnectorError::Auth("password rejected".into()));
        }

        Ok(session)
    }

    fn list_blocking(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        let session = self.open_session()?;
        let sftp = session
            .sftp()
            .map_err(|e| ConnectorError::Provider(format!("sftp subsystem: {}", e)))?;

        let entries = sftp
            .readdir(Path::new(&self.root_path))
            .map_err(|e| ConnectorError::Provider(format!("readdir {}: {}", self.root_path, e)))?;

        let mut files = Vec::new();
        for (path, stat) in entries {
            if !stat.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            files.push(RemoteFile {
                id: path.display().to_string(),
                name,
                modified_at: stat
                    .mtime
                    .and_then(|m| Utc.timestamp_opt(m as i64, 0).single()),
                size: stat.size.map(|s| s as i64),
            });
        }

        Ok(files)
    }

    fn download_blocking(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let session = self.open_session()?;
        let sftp = session
            .sftp()
            .map_err(|e| ConnectorError::Provider(format!("sftp subsystem: {}", e)))?;

        let mut file = sftp
            .open(Path::new(remote_id))
            .map_err(|e| ConnectorError::Provider(format!("open {}: {}", remote_id, e)))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ConnectorError::Provider(format!("read {}: {}", remote_id, e)))?;

        Ok(bytes)
    }

    fn clone_for_task(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            root_path: self.root_path.clone(),
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn list(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        let this = self.clone_for_task();
        tokio::task::spawn_blocking(move || this.list_blocking())
            .await
            .map_err(|e| ConnectorError::Provider(format!("task join: {}", e)))?
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let this = self.clone_for_task();
        let remote_id = remote_id.to_string();
        tokio::task::spawn_blocking(move || this.download_blocking(&remote_id))
            .await
            .map_err(|e| ConnectorError::Provider(format!("task join: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceConfig, SourceProvider};

    fn sftp_source(config: SourceConfig) -> Source {
        Source::new(
            "s1".into(),
            "t1".into(),
            "Feed".into(),
            SourceProvider::Sftp,
            config,
        )
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let source = sftp_source(SourceConfig {
            username: Some("acct".into()),
            ..SourceConfig::default()
        });
        let err = SftpConnector::from_source(&source, "pw", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[test]
    fn test_defaults_port_and_root() {
        let source = sftp_source(SourceConfig {
            host: Some("sftp.example.com".into()),
            username: Some("acct".into()),
            ..SourceConfig::default()
        });
        let conn = SftpConnector::from_source(&source, "pw", Duration::from_secs(5)).unwrap();
        assert_eq!(conn.port, 22);
        assert_eq!(conn.root_path, "/");
    }
}
