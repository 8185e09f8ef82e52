//! In-memory remote store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use drivegate_common::{Error, Result};

use crate::store::{
    ByteStream, ObjectMetadata, RemoteResponse, RemoteStore, UploadSession, UploadTarget,
    FOLDER_MIME_TYPE,
};

/// Root ID used by [`MemoryStore::new`].
pub const MEMORY_ROOT_ID: &str = "root";

const UPLOAD_URL_PREFIX: &str = "memory://upload/";

/// Stored object.
#[derive(Debug, Clone)]
struct Node {
    meta: ObjectMetadata,
    content: Bytes,
}

/// Pending resumable upload.
#[derive(Debug, Clone)]
enum PendingUpload {
    Create { name: String, parent_id: String },
    Update { file_id: String },
}

#[derive(Debug, Default)]
struct State {
    /// Objects in creation order, which is also enumeration order.
    nodes: Vec<Node>,
    uploads: HashMap<String, PendingUpload>,
}

impl State {
    fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.meta.id == id)
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.meta.id == id)
    }

    fn push(&mut self, parent_id: &str, name: &str, mime_type: &str, content: Bytes) -> ObjectMetadata {
        let meta = ObjectMetadata {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            kind: Some("drive#file".to_string()),
            parents: vec![parent_id.to_string()],
        };
        self.nodes.push(Node {
            meta: meta.clone(),
            content,
        });
        meta
    }
}

/// Number of calls made against a [`MemoryStore`], per operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub find_child: usize,
    pub list_children: usize,
    pub create_folder: usize,
    pub download: usize,
    pub start_upload_session: usize,
    pub transfer_content: usize,
    pub delete: usize,
}

#[derive(Debug, Default)]
struct Counters {
    find_child: AtomicUsize,
    list_children: AtomicUsize,
    create_folder: AtomicUsize,
    download: AtomicUsize,
    start_upload_session: AtomicUsize,
    transfer_content: AtomicUsize,
    delete: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// In-memory remote store.
///
/// Mimics the parent-linked object graph of the real store, including
/// duplicate sibling names and resumable upload sessions. Every call is
/// counted so tests can assert how many remote round trips an operation
/// made.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    counters: Counters,
    fail_lookups: AtomicBool,
    reject_upload_sessions: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store rooted at [`MEMORY_ROOT_ID`].
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a folder without counting a call.
    pub fn add_folder(&self, parent_id: &str, name: &str) -> ObjectMetadata {
        self.write()
            .push(parent_id, name, FOLDER_MIME_TYPE, Bytes::new())
    }

    /// Add a file without counting a call.
    pub fn add_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        content: impl Into<Bytes>,
    ) -> ObjectMetadata {
        self.write().push(parent_id, name, mime_type, content.into())
    }

    /// Get an object by ID.
    pub fn get(&self, id: &str) -> Option<ObjectMetadata> {
        self.read().node(id).map(|node| node.meta.clone())
    }

    /// Get the content of a file by ID.
    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.read().node(id).map(|node| node.content.clone())
    }

    /// All children of `parent_id`, in creation order.
    pub fn children(&self, parent_id: &str) -> Vec<ObjectMetadata> {
        self.read()
            .nodes
            .iter()
            .filter(|node| node.meta.parent_id() == Some(parent_id))
            .map(|node| node.meta.clone())
            .collect()
    }

    /// Rename an object in place, as another client might.
    pub fn rename(&self, id: &str, new_name: &str) -> bool {
        match self.write().node_mut(id) {
            Some(node) => {
                node.meta.name = new_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Number of stored objects, excluding the root.
    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    /// Check if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            find_child: c.find_child.load(Ordering::SeqCst),
            list_children: c.list_children.load(Ordering::SeqCst),
            create_folder: c.create_folder.load(Ordering::SeqCst),
            download: c.download.load(Ordering::SeqCst),
            start_upload_session: c.start_upload_session.load(Ordering::SeqCst),
            transfer_content: c.transfer_content.load(Ordering::SeqCst),
            delete: c.delete.load(Ordering::SeqCst),
        }
    }

    /// Make every lookup fail with an upstream 500.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make upload session negotiation answer without a location.
    pub fn set_reject_upload_sessions(&self, reject: bool) {
        self.reject_upload_sessions.store(reject, Ordering::SeqCst);
    }

    fn json_response(status: StatusCode, body: &impl serde::Serialize) -> Result<RemoteResponse> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::remote(500, format!("Failed to encode response: {}", e)))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        Ok(RemoteResponse::from_bytes(status, headers, bytes))
    }

    fn not_found(id: &str) -> Result<RemoteResponse> {
        Self::json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": { "code": 404, "message": format!("File not found: {}", id) } }),
        )
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ObjectMetadata>> {
        bump(&self.counters.find_child);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::remote(500, "backend error"));
        }

        Ok(self
            .read()
            .nodes
            .iter()
            .find(|node| node.meta.parent_id() == Some(parent_id) && node.meta.name == name)
            .map(|node| node.meta.clone()))
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<ObjectMetadata>> {
        bump(&self.counters.list_children);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::remote(500, "backend error"));
        }

        Ok(self.children(parent_id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<ObjectMetadata> {
        bump(&self.counters.create_folder);
        Ok(self
            .write()
            .push(parent_id, name, FOLDER_MIME_TYPE, Bytes::new()))
    }

    async fn download(&self, file_id: &str) -> Result<RemoteResponse> {
        bump(&self.counters.download);

        let node = match self.read().node(file_id).cloned() {
            Some(node) => node,
            None => return Self::not_found(file_id),
        };

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&node.meta.mime_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=0"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(node.content.len()));

        Ok(RemoteResponse::from_bytes(StatusCode::OK, headers, node.content))
    }

    async fn start_upload_session(&self, target: UploadTarget<'_>) -> Result<UploadSession> {
        bump(&self.counters.start_upload_session);

        if self.reject_upload_sessions.load(Ordering::SeqCst) {
            let rejected = Self::json_response(
                StatusCode::FORBIDDEN,
                &serde_json::json!({ "error": { "code": 403, "message": "storageQuotaExceeded" } }),
            )?;
            return Ok(UploadSession::Rejected(rejected));
        }

        let pending = match target {
            UploadTarget::Create { name, parent_id } => PendingUpload::Create {
                name: name.to_string(),
                parent_id: parent_id.to_string(),
            },
            UploadTarget::Update { file_id } => {
                if self.read().node(file_id).is_none() {
                    return Ok(UploadSession::Rejected(Self::not_found(file_id)?));
                }
                PendingUpload::Update {
                    file_id: file_id.to_string(),
                }
            }
        };

        let session_url = format!("{}{}", UPLOAD_URL_PREFIX, Uuid::new_v4().simple());
        self.write().uploads.insert(session_url.clone(), pending);
        Ok(UploadSession::Location(session_url))
    }

    async fn transfer_content(
        &self,
        session_url: &str,
        content_type: &str,
        mut body: ByteStream,
    ) -> Result<RemoteResponse> {
        bump(&self.counters.transfer_content);

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        let data = Bytes::from(data);

        let mut state = self.write();
        let pending = match state.uploads.remove(session_url) {
            Some(pending) => pending,
            None => return Self::not_found(session_url),
        };

        let meta = match pending {
            PendingUpload::Create { name, parent_id } => {
                state.push(&parent_id, &name, content_type, data)
            }
            PendingUpload::Update { file_id } => match state.node_mut(&file_id) {
                Some(node) => {
                    node.content = data;
                    node.meta.mime_type = content_type.to_string();
                    node.meta.clone()
                }
                None => return Self::not_found(&file_id),
            },
        };
        drop(state);

        Self::json_response(StatusCode::OK, &meta)
    }

    async fn delete(&self, file_id: &str) -> Result<RemoteResponse> {
        bump(&self.counters.delete);

        let mut state = self.write();
        let before = state.nodes.len();
        state.nodes.retain(|node| node.meta.id != file_id);
        let removed = state.nodes.len() != before;
        drop(state);

        if removed {
            Ok(RemoteResponse::from_bytes(
                StatusCode::NO_CONTENT,
                HeaderMap::new(),
                Bytes::new(),
            ))
        } else {
            Self::not_found(file_id)
        }
    }
}
