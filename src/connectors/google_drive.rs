//! Google Drive adapter.
//!
//! Lists a folder's children through the Drive v3 files API and downloads
//! with `alt=media`. The access token is minted per run by the factory from
//! the stored refresh credential.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{Connector, ConnectorError, RemoteFile};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Google Drive adapter over the REST API.
pub struct GoogleDriveConnector {
    http: reqwest::Client,
    access_token: String,
    folder_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    id: String,
    name: String,
    mime_type: String,
    modified_time: Option<DateTime<Utc>>,
    // Drive returns size as a decimal string
    size: Option<String>,
}

impl GoogleDriveConnector {
    pub fn new(http: reqwest::Client, access_token: String, folder_id: String) -> Self {
        Self {
            http,
            access_token,
            folder_id,
        }
    }

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<FileList, ConnectorError> {
        let query = format!("'{}' in parents and trashed = false", self.folder_id);
        let mut request = self
            .http
            .get(FILES_URL)
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "nextPageToken,files(id,name,mimeType,modifiedTime,size)"),
                ("pageSize", "1000"),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(map_request_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::Auth(format!(
                "Drive listing rejected with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::Provider(format!(
                "Drive listing failed with {}",
                status
            )));
        }

        response
            .json::<FileList>()
            .await
            .map_err(|e| ConnectorError::Provider(format!("Drive response parse: {}", e)))
    }
}

pub(super) fn map_request_error(err: reqwest::Error) -> ConnectorError {
    if err.is_timeout() {
        ConnectorError::Timeout
    } else {
        ConnectorError::Provider(err.to_string())
    }
}

#[async_trait]
impl Connector for GoogleDriveConnector {
    async fn list(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(page_token.as_deref()).await?;
            for entry in page.files {
                if entry.mime_type == FOLDER_MIME {
                    continue;
                }
                files.push(RemoteFile {
                    id: entry.id,
                    name: entry.name,
                    modified_at: entry.modified_time,
                    size: entry.size.and_then(|s| s.parse().ok()),
                });
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let url = format!("{}/{}", FILES_URL, urlencoding::encode(remote_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::Auth(format!(
                "Drive download rejected with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::Provider(format!(
                "Drive download failed with {}",
                status
            )));
        }

        let bytes = response.bytes().await.map_err(map_request_error)?;
        Ok(bytes.to_vec())
    }
}
