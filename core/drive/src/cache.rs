//! Name+parent keyed cache of resolved objects.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::store::ObjectMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    parent_id: String,
}

impl CacheKey {
    fn new(name: &str, parent_id: &str) -> Self {
        Self {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        }
    }
}

/// Cache of `(name, parent ID) -> object` lookups.
///
/// There is no targeted invalidation. Any write makes every entry suspect,
/// so writers call [`ResolutionCache::clear`] before resolving.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<CacheKey, ObjectMetadata>>,
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the child `name` of `parent_id`.
    pub async fn get(&self, name: &str, parent_id: &str) -> Option<ObjectMetadata> {
        self.entries
            .read()
            .await
            .get(&CacheKey::new(name, parent_id))
            .cloned()
    }

    /// Remember the child `name` of `parent_id`.
    pub async fn insert(&self, name: &str, parent_id: &str, meta: ObjectMetadata) {
        self.entries
            .write()
            .await
            .insert(CacheKey::new(name, parent_id), meta);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        if !entries.is_empty() {
            tracing::debug!(entries = entries.len(), "Clearing resolution cache");
        }
        entries.clear();
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> ObjectMetadata {
        ObjectMetadata {
            id: id.to_string(),
            name: "x".to_string(),
            mime_type: "text/plain".to_string(),
            kind: None,
            parents: vec![],
        }
    }

    #[tokio::test]
    async fn test_keys_do_not_collide_on_concatenation() {
        let cache = ResolutionCache::new();
        cache.insert("ab", "c", meta("first")).await;
        cache.insert("a", "bc", meta("second")).await;

        assert_eq!(cache.get("ab", "c").await.unwrap().id, "first");
        assert_eq!(cache.get("a", "bc").await.unwrap().id, "second");
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = ResolutionCache::new();
        cache.insert("docs", "root", meta("1")).await;
        cache.insert("readme.txt", "1", meta("2")).await;

        cache.clear().await;

        assert!(cache.is_empty().await);
        assert!(cache.get("docs", "root").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let cache = ResolutionCache::new();
        cache.insert("Docs", "root", meta("1")).await;

        assert!(cache.get("docs", "root").await.is_none());
    }
}
