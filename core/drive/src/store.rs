//! Remote object store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use drivegate_common::Result;

/// MIME type the remote store uses to mark folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Byte stream type for upload/download bodies.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Descriptor of a remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Opaque object ID, stable for the object's lifetime.
    pub id: String,
    /// Display name. Not guaranteed unique among siblings.
    pub name: String,
    /// MIME type; folders use [`FOLDER_MIME_TYPE`].
    pub mime_type: String,
    /// Resource kind marker (e.g. `drive#file`).
    #[serde(default)]
    pub kind: Option<String>,
    /// Parent folder IDs. Only the first is authoritative.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl ObjectMetadata {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Check if the MIME type marks an image.
    pub fn is_image(&self) -> bool {
        self.mime_type.contains("image")
    }

    /// The authoritative parent ID.
    pub fn parent_id(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// A raw upstream response, passed through to clients unchanged.
pub struct RemoteResponse {
    /// Upstream status code.
    pub status: StatusCode,
    /// Upstream response headers.
    pub headers: HeaderMap,
    /// Upstream response body.
    pub body: ByteStream,
}

impl RemoteResponse {
    /// Build a response with a fully buffered body.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: Box::pin(stream::once(async move { Ok(body) })),
        }
    }

    /// Drain the body into memory.
    pub async fn into_bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(data))
    }
}

impl fmt::Debug for RemoteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// What a resumable upload session will write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget<'a> {
    /// Create a new file named `name` under `parent_id`.
    Create { name: &'a str, parent_id: &'a str },
    /// Replace the content of an existing file, keeping name and parents.
    Update { file_id: &'a str },
}

/// Outcome of negotiating a resumable upload session.
#[derive(Debug)]
pub enum UploadSession {
    /// The store accepted the session; content goes to this URL.
    Location(String),
    /// The store answered without a session URL. The raw response is
    /// handed back to the caller.
    Rejected(RemoteResponse),
}

/// Remote object store addressed by ID and parent links.
///
/// Lookup and creation calls return typed results and fail with
/// `Error::Remote` on non-success upstream answers. Terminal calls
/// (download, content transfer, delete) return the raw upstream response
/// whatever its status.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Find the first non-trashed child of `parent_id` named exactly `name`.
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ObjectMetadata>>;

    /// List the non-trashed children of `parent_id` in store order.
    async fn list_children(&self, parent_id: &str) -> Result<Vec<ObjectMetadata>>;

    /// Create a folder named `name` under `parent_id`.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<ObjectMetadata>;

    /// Download file content by ID.
    async fn download(&self, file_id: &str) -> Result<RemoteResponse>;

    /// Negotiate a resumable upload session.
    async fn start_upload_session(&self, target: UploadTarget<'_>) -> Result<UploadSession>;

    /// Send the content of a negotiated upload session.
    async fn transfer_content(
        &self,
        session_url: &str,
        content_type: &str,
        body: ByteStream,
    ) -> Result<RemoteResponse>;

    /// Delete an object by ID.
    async fn delete(&self, file_id: &str) -> Result<RemoteResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(mime_type: &str) -> ObjectMetadata {
        ObjectMetadata {
            id: "1".to_string(),
            name: "entry".to_string(),
            mime_type: mime_type.to_string(),
            kind: Some("drive#file".to_string()),
            parents: vec!["root".to_string(), "other".to_string()],
        }
    }

    #[test]
    fn test_object_kind_markers() {
        assert!(object(FOLDER_MIME_TYPE).is_folder());
        assert!(!object("text/plain").is_folder());
        assert!(object("image/png").is_image());
        assert!(!object("application/pdf").is_image());
    }

    #[test]
    fn test_first_parent_is_authoritative() {
        assert_eq!(object("text/plain").parent_id(), Some("root"));
    }

    #[test]
    fn test_object_metadata_from_api_json() {
        let json = r#"{"kind":"drive#file","id":"abc","name":"docs","mimeType":"application/vnd.google-apps.folder"}"#;
        let meta: ObjectMetadata = serde_json::from_str(json).unwrap();

        assert_eq!(meta.id, "abc");
        assert!(meta.is_folder());
        assert!(meta.parents.is_empty());
    }

    #[tokio::test]
    async fn test_remote_response_into_bytes() {
        let response = RemoteResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "hello");
        assert_eq!(response.into_bytes().await.unwrap(), Bytes::from("hello"));
    }
}
