//! FTPS adapter (explicit TLS over rustls).
//!
//! suppaftp's stream is blocking, so calls run under spawn_blocking like the
//! SFTP adapter. Listings are parsed from LIST lines with suppaftp's own
//! parser; entries it cannot parse are skipped rather than failing the run.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::list::File as FtpFile;
use suppaftp::types::FileType;
use suppaftp::Status;
use suppaftp::{FtpError, RustlsConnector, RustlsFtpStream};

use super::{Connector, ConnectorError, RemoteFile};
use crate::models::Source;

/// FTPS adapter; one control connection per list/download call.
#[derive(Debug)]
pub struct FtpsConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    root_path: Option<String>,
    timeout: Duration,
}

impl FtpsConnector {
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
            port: source.config.port.unwrap_or(21),
            username,
            password: secret.to_string(),
            root_path: source.config.root_path.clone(),
            timeout,
        })
    }

    fn tls_config() -> Result<rustls::ClientConfig, ConnectorError> {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            // Unusable platform certs are skipped, not fatal
            let _ = roots.add(cert);
        }
        Ok(rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth())
    }

    fn open_stream(&self) -> Result<RustlsFtpStream, ConnectorError> {
        let addr = format!("{}:{}", self.host, self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectorError::Provider(format!("resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| {
                ConnectorError::Provider(format!("no address found for {}", self.host))
            })?;

        let stream =
            RustlsFtpStream::connect_timeout(addr, self.timeout).map_err(map_ftp_error)?;

        let mut stream = stream
            .into_secure(
                RustlsConnector::from(Arc::new(Self::tls_config()?)),
                &self.host,
            )
            .map_err(map_ftp_error)?;

        stream
            .login(&self.username, &self.password)
            .map_err(map_ftp_error)?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(map_ftp_error)?;

        if let Some(dir) = &self.root_path {
            stream.cwd(dir).map_err(map_ftp_error)?;
        }

        Ok(stream)
    }

    fn list_blocking(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        let mut stream = self.open_stream()?;
        let lines = stream.list(None).map_err(map_ftp_error)?;
        let _ = stream.quit();

        let mut files = Vec::new();
        for line in lines {
            let Ok(entry) = FtpFile::try_from(line.as_str()) else {
                continue;
            };
            if !entry.is_file() {
                continue;
            }
            files.push(RemoteFile {
                id: entry.name().to_string(),
                name: entry.name().to_string(),
                modified_at: Some(DateTime::<Utc>::from(entry.modified())),
                size: Some(entry.size() as i64),
            });
        }

        Ok(files)
    }

    fn download_blocking(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let mut stream = self.open_stream()?;
        let buffer = stream.retr_as_buffer(remote_id).map_err(map_ftp_error)?;
        let _ = stream.quit();
        Ok(buffer.into_inner())
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

fn map_ftp_error(err: FtpError) -> ConnectorError {
    match &err {
        FtpError::UnexpectedResponse(response) if response.status == Status::NotLoggedIn => {
            ConnectorError::Auth(format!("login rejected: {}", err))
        }
        FtpError::ConnectionError(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            ConnectorError::Timeout
        }
        _ => ConnectorError::Provider(err.to_string()),
    }
}

#[async_trait]
impl Connector for FtpsConnector {
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
