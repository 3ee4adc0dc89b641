//! Seam between this service and the remote media store.
//!
//! The ingest endpoint and the sweeper only ever talk to `dyn RemoteStore`;
//! `CloudinaryClient` is the production implementation.

use crate::models::remote_object::RemoteObject;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;
use std::{io, path::Path, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Largest page the search API hands out per request.
pub const MAX_RESULTS_PER_PAGE: usize = 500;

/// Streamed object content.
pub type ByteStream = BoxStream<'static, Result<Bytes, RemoteError>>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to remote store failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from remote store: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub resources: Vec<RemoteObject>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Key-addressed media store operations.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload the file at `local_path` under `public_id`.
    async fn upload(&self, local_path: &Path, public_id: &str) -> Result<RemoteObject, RemoteError>;

    /// List objects whose key sits under `prefix/`, one page at a time.
    async fn search(
        &self,
        prefix: &str,
        max_results: usize,
        cursor: Option<&str>,
    ) -> Result<SearchPage, RemoteError>;

    /// Open the content behind `url` as a byte stream.
    async fn fetch(&self, url: &str) -> Result<ByteStream, RemoteError>;
}

/// List every object under `prefix`, following continuation cursors.
///
/// A fresh call always starts from the first page.
pub async fn list_all(
    store: &dyn RemoteStore,
    prefix: &str,
) -> Result<Vec<RemoteObject>, RemoteError> {
    let mut objects = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = store
            .search(prefix, MAX_RESULTS_PER_PAGE, cursor.as_deref())
            .await?;
        debug!(
            prefix,
            page_len = page.resources.len(),
            has_more = page.next_cursor.is_some(),
            "fetched search page"
        );
        objects.extend(page.resources);

        match page.next_cursor.filter(|next| !next.is_empty()) {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                warn!(prefix, cursor = %next, "remote store repeated its cursor; stopping listing");
                break;
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(objects)
}

#[cfg(test)]
pub mod testing {
    //! In-memory `RemoteStore` that records every call.

    use super::*;
    use futures::{StreamExt, stream};
    use std::{
        collections::{HashMap, HashSet},
        path::PathBuf,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    };

    pub const URL_BASE: &str = "https://res.test/image/upload/v1";

    #[derive(Clone, Default)]
    pub struct RecordingStore {
        listing: Arc<Mutex<Vec<RemoteObject>>>,
        contents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        broken_urls: Arc<Mutex<HashSet<String>>>,
        uploads: Arc<Mutex<Vec<(PathBuf, String, Vec<u8>)>>>,
        page_size: Arc<Mutex<Option<usize>>>,
        fail_search: Arc<AtomicBool>,
        fail_upload: Arc<AtomicBool>,
        searches: Arc<AtomicUsize>,
        fetches: Arc<AtomicUsize>,
    }

    impl RecordingStore {
        pub fn url_for(public_id: &str) -> String {
            format!("{URL_BASE}/{public_id}.jpg")
        }

        /// Add an object to the listing with `content` behind its URL.
        pub fn put(&self, public_id: &str, content: &[u8]) -> RemoteObject {
            let object = RemoteObject::new(public_id, Self::url_for(public_id));
            self.listing.lock().unwrap().push(object.clone());
            self.contents
                .lock()
                .unwrap()
                .insert(object.url.clone(), content.to_vec());
            object
        }

        /// Make fetches of `url` yield a few bytes and then fail.
        pub fn break_url(&self, url: &str) {
            self.broken_urls.lock().unwrap().insert(url.to_string());
        }

        pub fn set_page_size(&self, size: usize) {
            *self.page_size.lock().unwrap() = Some(size);
        }

        pub fn fail_search(&self) {
            self.fail_search.store(true, Ordering::SeqCst);
        }

        pub fn fail_upload(&self) {
            self.fail_upload.store(true, Ordering::SeqCst);
        }

        pub fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        /// `(local path, public_id, bytes read from the path)` per upload call.
        pub fn uploads(&self) -> Vec<(PathBuf, String, Vec<u8>)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingStore {
        async fn upload(
            &self,
            local_path: &Path,
            public_id: &str,
        ) -> Result<RemoteObject, RemoteError> {
            let bytes = tokio::fs::read(local_path).await?;
            self.uploads.lock().unwrap().push((
                local_path.to_path_buf(),
                public_id.to_string(),
                bytes.clone(),
            ));
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(RemoteError::Status {
                    status: 401,
                    body: "invalid api_key".into(),
                });
            }
            let object = RemoteObject::new(public_id, Self::url_for(public_id));
            self.contents
                .lock()
                .unwrap()
                .insert(object.url.clone(), bytes);
            Ok(object)
        }

        async fn search(
            &self,
            prefix: &str,
            max_results: usize,
            cursor: Option<&str>,
        ) -> Result<SearchPage, RemoteError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(RemoteError::Timeout(Duration::from_secs(1)));
            }
            let needle = format!("{prefix}/");
            let matching: Vec<RemoteObject> = self
                .listing
                .lock()
                .unwrap()
                .iter()
                .filter(|o| o.public_id.starts_with(&needle))
                .cloned()
                .collect();
            let size = self.page_size.lock().unwrap().unwrap_or(max_results).min(max_results);
            let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + size).min(matching.len());
            Ok(SearchPage {
                resources: matching[start..end].to_vec(),
                next_cursor: (end < matching.len()).then(|| end.to_string()),
            })
        }

        async fn fetch(&self, url: &str) -> Result<ByteStream, RemoteError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.broken_urls.lock().unwrap().contains(url) {
                let chunks: Vec<Result<Bytes, RemoteError>> = vec![
                    Ok(Bytes::from_static(b"partial")),
                    Err(RemoteError::InvalidResponse("connection reset".into())),
                ];
                return Ok(stream::iter(chunks).boxed());
            }
            let content = self
                .contents
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| RemoteError::Status {
                    status: 404,
                    body: "not found".into(),
                })?;
            let chunks: Vec<Result<Bytes, RemoteError>> = content
                .chunks(4)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }
}
