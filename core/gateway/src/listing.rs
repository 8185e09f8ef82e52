//! Folder listings: child URLs and thumbnail discovery.

use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use drivegate_common::{Error, Result};
use drivegate_drive::{ObjectMetadata, RemoteStore};

/// One child in a full listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Absolute URL of the child.
    pub url: String,
    /// Absolute URL of the child's first image, or empty.
    pub thumb: String,
}

/// Append `segments` to the request URL.
///
/// The query and fragment are dropped and trailing slashes collapsed, so
/// `http://h/docs/?x=1` plus `a.txt` gives `http://h/docs/a.txt`. Segments
/// are percent-encoded as needed.
pub fn child_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);

    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);

    url.path_segments_mut()
        .map_err(|_| Error::InvalidInput(format!("Cannot append to URL: {}", base)))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Absolute URLs of `children`, in enumeration order.
pub fn summary(base: &Url, children: &[ObjectMetadata]) -> Result<Vec<String>> {
    children
        .iter()
        .map(|child| child_url(base, &[&child.name]).map(String::from))
        .collect()
}

/// Find the first image among the children of `child`.
async fn thumbnail_for(
    store: &dyn RemoteStore,
    base: &Url,
    child: &ObjectMetadata,
) -> Result<ListingEntry> {
    let grandchildren = store.list_children(&child.id).await?;

    let thumb = match grandchildren.iter().find(|entry| entry.is_image()) {
        Some(image) => child_url(base, &[&child.name, &image.name])?.to_string(),
        None => String::new(),
    };

    Ok(ListingEntry {
        url: child_url(base, &[&child.name])?.to_string(),
        thumb,
    })
}

/// Lazily pair every child with its thumbnail.
///
/// At most `concurrency` children are probed at once; entries are yielded
/// in the order of `children` regardless of completion order.
pub fn with_thumbnails(
    store: Arc<dyn RemoteStore>,
    base: Url,
    children: Vec<ObjectMetadata>,
    concurrency: usize,
) -> impl Stream<Item = Result<ListingEntry>> + Send {
    stream::iter(children)
        .map(move |child| {
            let store = store.clone();
            let base = base.clone();
            async move { thumbnail_for(store.as_ref(), &base, &child).await }
        })
        .buffered(concurrency.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivegate_drive::memory::{MemoryStore, MEMORY_ROOT_ID};
    use futures::TryStreamExt;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_child_url_joins_segments() {
        let base = url("http://drive.local/docs");
        assert_eq!(
            child_url(&base, &["a.txt"]).unwrap().as_str(),
            "http://drive.local/docs/a.txt"
        );
    }

    #[test]
    fn test_child_url_collapses_trailing_slash_and_drops_query() {
        let base = url("http://drive.local/docs//?full=1#top");
        assert_eq!(
            child_url(&base, &["b.png"]).unwrap().as_str(),
            "http://drive.local/docs/b.png"
        );

        let root = url("http://drive.local/");
        assert_eq!(
            child_url(&root, &["photos", "cover.jpg"]).unwrap().as_str(),
            "http://drive.local/photos/cover.jpg"
        );
    }

    #[test]
    fn test_child_url_encodes_names() {
        let base = url("http://drive.local/");
        assert_eq!(
            child_url(&base, &["My Photos", "a#1.png"]).unwrap().as_str(),
            "http://drive.local/My%20Photos/a%231.png"
        );
    }

    #[tokio::test]
    async fn test_thumbnails_follow_enumeration_order() {
        let store = Arc::new(MemoryStore::new());
        let trip = store.add_folder(MEMORY_ROOT_ID, "trip");
        store.add_file(&trip.id, "notes.txt", "text/plain", "x");
        store.add_file(&trip.id, "cover.jpg", "image/jpeg", "x");
        store.add_file(&trip.id, "other.png", "image/png", "x");
        let empty = store.add_folder(MEMORY_ROOT_ID, "empty");
        let readme = store.add_file(MEMORY_ROOT_ID, "readme.md", "text/markdown", "x");

        let entries: Vec<ListingEntry> = with_thumbnails(
            store.clone(),
            url("http://drive.local/"),
            vec![trip, empty, readme],
            2,
        )
        .try_collect()
        .await
        .unwrap();

        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    url: "http://drive.local/trip".to_string(),
                    thumb: "http://drive.local/trip/cover.jpg".to_string(),
                },
                ListingEntry {
                    url: "http://drive.local/empty".to_string(),
                    thumb: String::new(),
                },
                ListingEntry {
                    url: "http://drive.local/readme.md".to_string(),
                    thumb: String::new(),
                },
            ]
        );
        assert_eq!(store.calls().list_children, 3);
    }

    #[tokio::test]
    async fn test_thumbnail_lookup_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        let trip = store.add_folder(MEMORY_ROOT_ID, "trip");
        store.set_fail_lookups(true);

        let result: Result<Vec<ListingEntry>> =
            with_thumbnails(store, url("http://drive.local/"), vec![trip], 1)
                .try_collect()
                .await;

        assert!(result.is_err());
    }
}
