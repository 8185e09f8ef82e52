//! Google Drive API client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use drivegate_common::{Error, Result};

use super::auth::TokenManager;
use crate::store::{
    ByteStream, ObjectMetadata, RemoteResponse, RemoteStore, UploadSession, UploadTarget,
    FOLDER_MIME_TYPE,
};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name,mimeType,kind,parents";
/// Fields requested for file listings.
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,kind,parents)";

/// Endpoints and transport settings for the Drive client.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    /// Metadata API base (`.../drive/v3`).
    pub api_base: String,
    /// Upload API base (`.../upload/drive/v3`).
    pub upload_base: String,
    /// Timeout for metadata calls. Content transfers are not bounded.
    pub request_timeout: Duration,
    /// User agent sent upstream.
    pub user_agent: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!("DriveGate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<ObjectMetadata>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Body of a folder creation request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFolder<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: [&'a str; 1],
}

/// Metadata sent when negotiating a resumable upload.
#[derive(Debug, Default, Serialize)]
struct UploadMetadata<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<[&'a str; 1]>,
}

/// Quote a value for the Drive query language.
fn quote_query_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Query matching the non-trashed children of `parent_id`.
fn children_query(parent_id: &str) -> String {
    format!(
        "{} in parents and trashed = false",
        quote_query_value(parent_id)
    )
}

/// Query matching the non-trashed children of `parent_id` named `name`.
fn child_by_name_query(parent_id: &str, name: &str) -> String {
    format!(
        "{} in parents and name = {} and trashed = false",
        quote_query_value(parent_id),
        quote_query_value(name)
    )
}

/// Google Drive API client.
///
/// Every request carries a bearer token from the [`TokenManager`]; if no
/// token can be obtained the request is never sent.
pub struct DriveClient {
    http: Client,
    token_manager: Arc<TokenManager>,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    /// Create a new Drive client.
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new(token_manager: Arc<TokenManager>, endpoints: DriveEndpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent(endpoints.user_agent.clone())
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_manager,
            endpoints,
        })
    }

    /// Attach the authorization header.
    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token_manager.get_access_token().await?;
        Ok(request.header(header::AUTHORIZATION, format!("Bearer {}", token)))
    }

    /// Send a metadata request with the configured timeout.
    async fn send_metadata(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        self.authorized(request)
            .await?
            .timeout(self.endpoints.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", action, e)))
    }

    /// Send a request whose response is passed through unchanged.
    async fn send_passthrough(&self, request: RequestBuilder, action: &str) -> Result<RemoteResponse> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", action, e)))?;

        Ok(into_remote_response(response))
    }

    /// Fetch one page of a file listing.
    async fn list_page(&self, query: &str, page_size: &str, page_token: Option<&str>) -> Result<FileListResponse> {
        let url = format!("{}/files", self.endpoints.api_base);

        let mut request = self.http.get(&url).query(&[
            ("q", query),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
        ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self.send_metadata(request, "list files").await?;
        handle_response(response).await
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ObjectMetadata>> {
        let query = child_by_name_query(parent_id, name);
        let page = self.list_page(&query, "1", None).await?;

        // Names are not unique server-side; the first match wins
        Ok(page.files.into_iter().next())
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<ObjectMetadata>> {
        let query = children_query(parent_id);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(&query, "1000", page_token.as_deref())
                .await?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<ObjectMetadata> {
        let url = format!("{}/files", self.endpoints.api_base);

        let request = self
            .http
            .post(&url)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .json(&NewFolder {
                name,
                mime_type: FOLDER_MIME_TYPE,
                parents: [parent_id],
            });

        let response = self.send_metadata(request, "create folder").await?;
        handle_response(response).await
    }

    async fn download(&self, file_id: &str) -> Result<RemoteResponse> {
        let url = format!("{}/files/{}", self.endpoints.api_base, file_id);

        let request = self
            .http
            .get(&url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

        self.send_passthrough(request, "download file").await
    }

    async fn start_upload_session(&self, target: UploadTarget<'_>) -> Result<UploadSession> {
        let request = match target {
            UploadTarget::Create { name, parent_id } => self
                .http
                .post(format!("{}/files", self.endpoints.upload_base))
                .json(&UploadMetadata {
                    name: Some(name),
                    parents: Some([parent_id]),
                }),
            UploadTarget::Update { file_id } => self
                .http
                .patch(format!("{}/files/{}", self.endpoints.upload_base, file_id))
                .json(&UploadMetadata::default()),
        }
        .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")]);

        let response = self
            .send_metadata(request, "start resumable upload")
            .await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match location {
            Some(session_url) => Ok(UploadSession::Location(session_url)),
            None => {
                tracing::warn!(
                    status = %response.status(),
                    "Upload session negotiation returned no location"
                );
                Ok(UploadSession::Rejected(into_remote_response(response)))
            }
        }
    }

    async fn transfer_content(
        &self,
        session_url: &str,
        content_type: &str,
        body: ByteStream,
    ) -> Result<RemoteResponse> {
        let request = self
            .http
            .put(session_url)
            .header(header::CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(body));

        self.send_passthrough(request, "upload content").await
    }

    async fn delete(&self, file_id: &str) -> Result<RemoteResponse> {
        let url = format!("{}/files/{}", self.endpoints.api_base, file_id);
        let request = self
            .http
            .delete(&url)
            .query(&[("supportsAllDrives", "true")]);

        self.send_passthrough(request, "delete file").await
    }
}

/// Convert a reqwest response into a streaming pass-through response.
fn into_remote_response(response: Response) -> RemoteResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .bytes_stream()
        .map(|result| result.map_err(|e| Error::Network(format!("Stream read error: {}", e))));

    RemoteResponse {
        status,
        headers,
        body: Box::pin(body),
    }
}

/// Handle API response with error checking.
async fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::remote(status.as_u16(), format!("Failed to parse response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, "Drive API call failed");
        Err(Error::remote(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdrive::auth::{IssuedToken, TokenExchanger};

    struct RejectingExchanger;

    #[async_trait]
    impl TokenExchanger for RejectingExchanger {
        async fn exchange(&self) -> Result<IssuedToken> {
            Err(Error::Authentication("invalid_grant".to_string()))
        }
    }

    fn offline_client() -> DriveClient {
        let tokens = Arc::new(TokenManager::new(
            Arc::new(RejectingExchanger),
            Duration::from_secs(0),
        ));
        // Port 9 (discard) is never contacted because auth fails first
        let endpoints = DriveEndpoints {
            api_base: "http://127.0.0.1:9/drive/v3".to_string(),
            upload_base: "http://127.0.0.1:9/upload/drive/v3".to_string(),
            ..DriveEndpoints::default()
        };
        DriveClient::new(tokens, endpoints).unwrap()
    }

    #[test]
    fn test_query_quoting() {
        assert_eq!(quote_query_value("docs"), "'docs'");
        assert_eq!(quote_query_value("it's"), r"'it\'s'");
        assert_eq!(quote_query_value(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_child_queries() {
        assert_eq!(
            children_query("root"),
            "'root' in parents and trashed = false"
        );
        assert_eq!(
            child_by_name_query("abc", "readme.txt"),
            "'abc' in parents and name = 'readme.txt' and trashed = false"
        );
    }

    #[test]
    fn test_upload_metadata_shapes() {
        let create = UploadMetadata {
            name: Some("file.bin"),
            parents: Some(["folder"]),
        };
        assert_eq!(
            serde_json::to_string(&create).unwrap(),
            r#"{"name":"file.bin","parents":["folder"]}"#
        );
        assert_eq!(
            serde_json::to_string(&UploadMetadata::default()).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_new_folder_body() {
        let body = NewFolder {
            name: "new",
            mime_type: FOLDER_MIME_TYPE,
            parents: ["root"],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"name":"new","mimeType":"application/vnd.google-apps.folder","parents":["root"]}"#
        );
    }

    #[test]
    fn test_file_list_response_parsing() {
        let json = r#"{
            "nextPageToken": "page-2",
            "files": [
                {"kind": "drive#file", "id": "1", "name": "a.txt", "mimeType": "text/plain", "parents": ["root"]}
            ]
        }"#;
        let list: FileListResponse = serde_json::from_str(json).unwrap();

        assert_eq!(list.files.len(), 1);
        assert_eq!(list.next_page_token.as_deref(), Some("page-2"));

        let empty: FileListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }

    #[tokio::test]
    async fn test_requests_fail_closed_without_token() {
        let client = offline_client();

        let err = client.find_child("root", "docs").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        let err = client.download("file-id").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        let err = client
            .start_upload_session(UploadTarget::Update { file_id: "file-id" })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
