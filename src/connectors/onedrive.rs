//! OneDrive adapter over the Microsoft Graph API.
//!
//! Lists a folder's children and downloads item content; Graph answers the
//! content request with a redirect that reqwest follows. Entries without a
//! `file` facet (folders, notebooks) are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use super::google_drive::map_request_error;
use super::{Connector, ConnectorError, RemoteFile};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// OneDrive adapter.
pub struct OneDriveConnector {
    http: reqwest::Client,
    access_token: String,
    folder_id: String,
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    size: Option<i64>,
    last_modified_date_time: Option<DateTime<Utc>>,
    file: Option<serde_json::Value>,
}

impl OneDriveConnector {
    pub fn new(http: reqwest::Client, access_token: String, folder_id: String) -> Self {
        Self {
            http,
            access_token,
            folder_id,
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<ChildrenPage, ConnectorError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::Auth(format!(
                "Graph listing rejected with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::Provider(format!(
                "Graph listing failed with {}",
                status
            )));
        }

        response
            .json::<ChildrenPage>()
            .await
            .map_err(|e| ConnectorError::Provider(format!("Graph response parse: {}", e)))
    }
}

#[async_trait]
impl Connector for OneDriveConnector {
    async fn list(&self) -> Result<Vec<RemoteFile>, ConnectorError> {
        let mut files = Vec::new();
        let mut url = format!(
            "{}/me/drive/items/{}/children?$select=id,name,size,lastModifiedDateTime,file&$top=200",
            GRAPH_BASE,
            urlencoding::encode(&self.folder_id)
        );

        loop {
            let page = self.fetch_page(&url).await?;
            for item in page.value {
                if item.file.is_none() {
                    continue;
                }
                files.push(RemoteFile {
                    id: item.id,
                    name: item.name,
                    modified_at: item.last_modified_date_time,
                    size: item.size,
                });
            }

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(files)
    }

    async fn download(&self, remote_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let url = format!(
            "{}/me/drive/items/{}/content",
            GRAPH_BASE,
            urlencoding::encode(remote_id)
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::Auth(format!(
                "Graph download rejected with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::Provider(format!(
                "Graph download failed with {}",
                status
            )));
        }

        let bytes = response.bytes().await.map_err(map_request_error)?;
        Ok(bytes.to_vec())
    }
}
