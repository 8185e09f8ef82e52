//! Path-addressed operations on the remote store.

use axum::response::Response;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use drivegate_common::{DrivePath, Error, Result};
use drivegate_drive::gdrive::{DriveClient, OAuthExchanger, TokenManager};
use drivegate_drive::{
    ByteStream, ObjectMetadata, PathResolver, RemoteStore, Resolution, ResolutionCache,
    UploadSession, UploadTarget,
};

use crate::config::GatewayConfig;
use crate::listing::{self, ListingEntry};
use crate::response;

/// Content type assumed for uploads that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// How a folder GET is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingMode {
    /// Child URLs only.
    #[default]
    Summary,
    /// Child URLs with a thumbnail per child.
    Full,
}

/// Wait for the first non-empty chunk of `body`.
///
/// Returns `None` when the body is absent or ends without data; otherwise
/// a stream that yields the full body including the inspected chunk.
async fn non_empty_body(body: Option<ByteStream>) -> Result<Option<ByteStream>> {
    let Some(mut body) = body else {
        return Ok(None);
    };

    while let Some(chunk) = body.next().await {
        let chunk: Bytes = chunk?;
        if !chunk.is_empty() {
            let rest = stream::once(async move { Ok(chunk) }).chain(body);
            return Ok(Some(Box::pin(rest)));
        }
    }

    Ok(None)
}

/// The operation layer: fetch, list, upload and delete by path.
///
/// Every handler resolves the client path through the [`PathResolver`] and
/// ends with one terminal call on the store, whose response is passed
/// through unchanged. Client mistakes become 400/404.
pub struct DriveGateway {
    resolver: PathResolver,
    listing_concurrency: usize,
}

impl DriveGateway {
    /// Create a gateway over `resolver`.
    pub fn new(resolver: PathResolver, listing_concurrency: usize) -> Self {
        Self {
            resolver,
            listing_concurrency: listing_concurrency.max(1),
        }
    }

    /// Create a gateway over any store, rooted at `root_id`.
    pub fn with_store(
        store: Arc<dyn RemoteStore>,
        root_id: impl Into<String>,
        listing_concurrency: usize,
    ) -> Self {
        let resolver = PathResolver::new(store, Arc::new(ResolutionCache::new()), root_id);
        Self::new(resolver, listing_concurrency)
    }

    /// Wire a gateway to Google Drive from `config`.
    ///
    /// No network call is made; the first access token is fetched by the
    /// first request.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let exchanger = OAuthExchanger::new(config.auth_config())?;
        let tokens = Arc::new(TokenManager::new(Arc::new(exchanger), config.token_margin()));
        let client = DriveClient::new(tokens, config.endpoints())?;

        info!(root = %config.root_id, "Drive gateway configured");
        Ok(Self::with_store(
            Arc::new(client),
            config.root_id.clone(),
            config.listing_concurrency,
        ))
    }

    /// The resolver used by every operation.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    fn store(&self) -> &Arc<dyn RemoteStore> {
        self.resolver.store()
    }

    /// Serve a GET: stream a file or list a folder.
    ///
    /// `request_url` is the absolute URL the client used; listings are
    /// built relative to it.
    pub async fn fetch(&self, path: &DrivePath, request_url: &Url, mode: ListingMode) -> Response {
        self.try_fetch(path, request_url, mode)
            .await
            .unwrap_or_else(|e| response::error_response(&e))
    }

    /// Serve a PUT: create or replace the file at `path`.
    pub async fn upload(
        &self,
        path: &DrivePath,
        content_type: Option<&str>,
        body: Option<ByteStream>,
    ) -> Response {
        self.try_upload(path, content_type, body)
            .await
            .unwrap_or_else(|e| response::error_response(&e))
    }

    /// Serve a DELETE: remove the file at `path`.
    pub async fn delete(&self, path: &DrivePath, body: Option<ByteStream>) -> Response {
        self.try_delete(path, body)
            .await
            .unwrap_or_else(|e| response::error_response(&e))
    }

    async fn try_fetch(&self, path: &DrivePath, request_url: &Url, mode: ListingMode) -> Result<Response> {
        debug!(path = %path, "Fetching");

        let entry = match self.resolver.resolve(path, false).await? {
            Resolution::Found(entry) => entry,
            Resolution::NotFound => return Ok(response::not_found()),
        };

        if entry.is_folder() {
            return self.list(&entry, request_url, mode).await;
        }

        let remote = self.store().download(&entry.id).await?;
        debug!(path = %path, status = %remote.status, "Streaming file");
        Ok(response::inline_file(remote))
    }

    async fn list(&self, folder: &ObjectMetadata, request_url: &Url, mode: ListingMode) -> Result<Response> {
        let children = self.store().list_children(&folder.id).await?;
        debug!(folder = %folder.id, children = children.len(), mode = ?mode, "Listing folder");

        match mode {
            ListingMode::Summary => response::json(&listing::summary(request_url, &children)?),
            ListingMode::Full => {
                let entries: Vec<ListingEntry> = listing::with_thumbnails(
                    self.store().clone(),
                    request_url.clone(),
                    children,
                    self.listing_concurrency,
                )
                .try_collect()
                .await?;
                response::json(&entries)
            }
        }
    }

    /// Resolve the folder holding the leaf of `path`, creating it if needed.
    async fn target_folder(&self, path: &DrivePath) -> Result<(ObjectMetadata, String)> {
        let (folder_path, leaf) = path
            .split_leaf()
            .ok_or_else(|| Error::NotFound(format!("No file name in {}", path)))?;

        let folder = self
            .resolver
            .resolve(&folder_path, true)
            .await?
            .found()
            .filter(ObjectMetadata::is_folder)
            .ok_or_else(|| Error::NotFound(format!("Not a folder: {}", folder_path)))?;

        Ok((folder, leaf))
    }

    async fn try_upload(
        &self,
        path: &DrivePath,
        content_type: Option<&str>,
        body: Option<ByteStream>,
    ) -> Result<Response> {
        let body = non_empty_body(body)
            .await?
            .ok_or_else(|| Error::BadRequest("Upload requires a body".to_string()))?;

        if path.is_root() {
            return Err(Error::NotFound("No file name in /".to_string()));
        }

        // Any entry may be stale once something is written
        self.resolver.cache().clear().await;

        let (folder, leaf) = self.target_folder(path).await?;
        let existing = self.resolver.resolve(path, false).await?.found();

        let target = match &existing {
            Some(file) if file.is_folder() => {
                return Err(Error::NotFound(format!("Folder in the way: {}", path)));
            }
            Some(file) => UploadTarget::Update { file_id: &file.id },
            None => UploadTarget::Create {
                name: &leaf,
                parent_id: &folder.id,
            },
        };

        let session_url = match self.store().start_upload_session(target).await? {
            UploadSession::Location(url) => url,
            UploadSession::Rejected(remote) => {
                info!(path = %path, status = %remote.status, "Upload session rejected");
                return Ok(response::passthrough(remote));
            }
        };

        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
        let remote = self
            .store()
            .transfer_content(&session_url, content_type, body)
            .await?;

        info!(
            path = %path,
            status = %remote.status,
            update = existing.is_some(),
            "File uploaded"
        );
        Ok(response::passthrough(remote))
    }

    async fn try_delete(&self, path: &DrivePath, body: Option<ByteStream>) -> Result<Response> {
        if non_empty_body(body).await?.is_none() {
            return Err(Error::BadRequest("Delete requires a body".to_string()));
        }

        self.resolver.cache().clear().await;

        // Missing folders on the way are created, same as for uploads
        self.target_folder(path).await?;

        let file = self
            .resolver
            .resolve(path, false)
            .await?
            .found()
            .ok_or_else(|| Error::NotFound(format!("No such file: {}", path)))?;

        let remote = self.store().delete(&file.id).await?;
        // The deleted entry was cached by the lookup above
        self.resolver.cache().clear().await;
        info!(path = %path, status = %remote.status, "File deleted");
        Ok(response::passthrough(remote))
    }
}
