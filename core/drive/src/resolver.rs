//! Path resolution over the parent-linked object graph.

use std::sync::Arc;
use tracing::{debug, info};

use drivegate_common::{DrivePath, Result};

use crate::cache::ResolutionCache;
use crate::store::{ObjectMetadata, RemoteStore, FOLDER_MIME_TYPE};

/// Display name of the synthetic root entry.
const ROOT_NAME: &str = "My Drive";

/// Outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every segment resolved; this is the last one.
    Found(ObjectMetadata),
    /// Some segment had no match and folders were not created.
    NotFound,
}

impl Resolution {
    /// Convert into an option.
    pub fn found(self) -> Option<ObjectMetadata> {
        match self {
            Self::Found(meta) => Some(meta),
            Self::NotFound => None,
        }
    }
}

/// Resolves client paths to remote objects one segment at a time.
pub struct PathResolver {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ResolutionCache>,
    root_id: String,
}

impl PathResolver {
    /// Create a resolver rooted at `root_id`.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ResolutionCache>,
        root_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            root_id: root_id.into(),
        }
    }

    /// The store lookups go to.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// The cache lookups are memoized in.
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Synthetic entry standing for the root container.
    pub fn root_entry(&self) -> ObjectMetadata {
        ObjectMetadata {
            id: self.root_id.clone(),
            name: ROOT_NAME.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            kind: Some("drive#file".to_string()),
            parents: Vec::new(),
        }
    }

    /// Resolve `path`, optionally creating missing folders on the way.
    ///
    /// # Postconditions
    /// - The root path resolves without any remote call
    /// - Lookup hits are cached under (segment, parent ID); created
    ///   folders are not
    /// - Without `create_missing_folders`, the first missing segment ends
    ///   the walk with `Resolution::NotFound`
    ///
    /// # Errors
    /// - Any failed lookup or folder creation fails the whole resolution
    pub async fn resolve(&self, path: &DrivePath, create_missing_folders: bool) -> Result<Resolution> {
        if path.is_root() {
            return Ok(Resolution::Found(self.root_entry()));
        }

        let mut parent_id = self.root_id.clone();
        let mut current = None;

        for name in path.components() {
            let entry = match self.lookup(name, &parent_id).await? {
                Some(entry) => entry,
                None if create_missing_folders => {
                    let folder = self.store.create_folder(&parent_id, name).await?;
                    info!(name = %name, parent = %parent_id, id = %folder.id, "Folder created");
                    folder
                }
                None => {
                    debug!(path = %path, missing = %name, "Path not found");
                    return Ok(Resolution::NotFound);
                }
            };

            parent_id = entry.id.clone();
            current = Some(entry);
        }

        Ok(current.map_or(Resolution::NotFound, Resolution::Found))
    }

    /// Find the child `name` of `parent_id`, consulting the cache first.
    async fn lookup(&self, name: &str, parent_id: &str) -> Result<Option<ObjectMetadata>> {
        if let Some(hit) = self.cache.get(name, parent_id).await {
            return Ok(Some(hit));
        }

        let found = self.store.find_child(parent_id, name).await?;
        if let Some(entry) = &found {
            self.cache.insert(name, parent_id, entry.clone()).await;
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CallCounts, MemoryStore, MEMORY_ROOT_ID};

    fn setup() -> (Arc<MemoryStore>, PathResolver) {
        let store = Arc::new(MemoryStore::new());
        let resolver = PathResolver::new(
            store.clone(),
            Arc::new(ResolutionCache::new()),
            MEMORY_ROOT_ID,
        );
        (store, resolver)
    }

    /// Walk parent links from `meta` back to the root.
    fn ancestor_names(store: &MemoryStore, meta: &ObjectMetadata) -> Vec<String> {
        let mut names = vec![meta.name.clone()];
        let mut parent = meta.parent_id().map(str::to_string);
        while let Some(id) = parent {
            if id == MEMORY_ROOT_ID {
                break;
            }
            let entry = store.get(&id).unwrap();
            names.push(entry.name.clone());
            parent = entry.parent_id().map(str::to_string);
        }
        names.reverse();
        names
    }

    #[tokio::test]
    async fn test_root_resolves_without_remote_call() {
        let (store, resolver) = setup();

        for raw in ["", "/", "//"] {
            let meta = resolver
                .resolve(&DrivePath::parse(raw), true)
                .await
                .unwrap()
                .found()
                .unwrap();
            assert_eq!(meta.id, MEMORY_ROOT_ID);
            assert!(meta.is_folder());
        }

        assert_eq!(store.calls(), CallCounts::default());
    }

    #[tokio::test]
    async fn test_resolves_existing_file() {
        let (store, resolver) = setup();
        let docs = store.add_folder(MEMORY_ROOT_ID, "docs");
        let readme = store.add_file(&docs.id, "readme.txt", "text/plain", "hello");

        let found = resolver
            .resolve(&DrivePath::parse("/docs/readme.txt"), false)
            .await
            .unwrap();

        assert_eq!(found, Resolution::Found(readme));
        assert_eq!(store.calls().find_child, 2);
        assert_eq!(store.calls().create_folder, 0);
    }

    #[tokio::test]
    async fn test_missing_segment_stops_the_walk() {
        let (store, resolver) = setup();
        store.add_folder(MEMORY_ROOT_ID, "docs");

        let found = resolver
            .resolve(&DrivePath::parse("/missing/deeper/file.txt"), false)
            .await
            .unwrap();

        assert_eq!(found, Resolution::NotFound);
        assert_eq!(store.calls().find_child, 1);
    }

    #[tokio::test]
    async fn test_creates_one_folder_per_missing_segment() {
        let (store, resolver) = setup();
        let existing = store.add_folder(MEMORY_ROOT_ID, "a");

        let meta = resolver
            .resolve(&DrivePath::parse("/a/b/c/d"), true)
            .await
            .unwrap()
            .found()
            .unwrap();

        assert_eq!(store.calls().create_folder, 3);
        assert_eq!(store.len(), 4);
        assert!(meta.is_folder());
        assert_eq!(ancestor_names(&store, &meta), vec!["a", "b", "c", "d"]);
        assert_eq!(store.children(MEMORY_ROOT_ID), vec![existing]);
    }

    #[tokio::test]
    async fn test_cached_pairs_skip_remote_lookup() {
        let (store, resolver) = setup();
        let docs = store.add_folder(MEMORY_ROOT_ID, "docs");
        store.add_file(&docs.id, "readme.txt", "text/plain", "hello");
        let path = DrivePath::parse("/docs/readme.txt");

        resolver.resolve(&path, false).await.unwrap();
        resolver.resolve(&path, false).await.unwrap();

        assert_eq!(store.calls().find_child, 2);
        assert_eq!(resolver.cache().len().await, 2);
    }

    #[tokio::test]
    async fn test_created_folders_are_not_cached() {
        let (store, resolver) = setup();
        let path = DrivePath::parse("/fresh");

        resolver.resolve(&path, true).await.unwrap();
        assert!(resolver.cache().is_empty().await);

        // The next walk looks the folder up remotely and caches it
        resolver.resolve(&path, true).await.unwrap();
        assert_eq!(store.calls().create_folder, 1);
        assert_eq!(store.calls().find_child, 2);
        assert_eq!(resolver.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_entry_until_cleared() {
        let (store, resolver) = setup();
        let file = store.add_file(MEMORY_ROOT_ID, "old.txt", "text/plain", "x");
        let old = DrivePath::parse("/old.txt");

        resolver.resolve(&old, false).await.unwrap();
        store.rename(&file.id, "new.txt");

        // No write went through the resolver, so the cached entry is served
        assert!(resolver.resolve(&old, false).await.unwrap().found().is_some());

        resolver.cache().clear().await;
        assert_eq!(resolver.resolve(&old, false).await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_file_as_intermediate_segment_is_not_found() {
        let (store, resolver) = setup();
        store.add_file(MEMORY_ROOT_ID, "notes.txt", "text/plain", "x");

        let found = resolver
            .resolve(&DrivePath::parse("/notes.txt/inner"), false)
            .await
            .unwrap();

        assert_eq!(found, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let (store, resolver) = setup();
        store.set_fail_lookups(true);

        let err = resolver
            .resolve(&DrivePath::parse("/docs"), true)
            .await
            .unwrap_err();

        assert!(matches!(err, drivegate_common::Error::Remote { status: 500, .. }));
        assert_eq!(store.calls().create_folder, 0);
    }
}
