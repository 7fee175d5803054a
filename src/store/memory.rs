//! In-process object store.
//!
//! Keeps every bucket as an ordered map from key to payload so listings come
//! back in lexicographic order, the way S3 returns them. Listing honours the
//! delimiter, truncates at `max_keys` (objects and common prefixes both count)
//! and hands out opaque base64 continuation tokens.
//!
//! Faults can be injected per key so partial-failure paths can be exercised.

use super::{
    ListPage, ListRequest, ObjectBody, ObjectStore, StoreError, StoreResult, StoredObject,
    encode_key_path,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

const STREAM_CHUNK_SIZE: usize = 8192;
const MAX_LIST_KEYS: usize = 1000;

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// Operations that can be made to fail for a given key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Copy,
    Delete,
    Get,
}

#[derive(Default)]
struct Faults {
    keys: HashSet<(FaultOp, String)>,
    fail_listing: bool,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, MemoryObject>>>,
    faults: RwLock<Faults>,
    list_calls: AtomicUsize,
}

/// Position a truncated listing stopped at.
///
/// A common prefix marker skips every key underneath it on resume, a key
/// marker only skips keys up to and including itself.
#[derive(Debug, PartialEq, Eq)]
enum Marker {
    Key(String),
    Prefix(String),
}

impl Marker {
    fn encode(&self) -> String {
        let raw = match self {
            Marker::Key(key) => format!("k:{}", key),
            Marker::Prefix(prefix) => format!("p:{}", prefix),
        };
        general_purpose::STANDARD.encode(raw)
    }

    fn decode(token: &str) -> StoreResult<Self> {
        let raw = general_purpose::STANDARD
            .decode(token)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(StoreError::InvalidToken)?;
        match raw.split_at_checked(2) {
            Some(("k:", key)) => Ok(Marker::Key(key.to_string())),
            Some(("p:", prefix)) => Ok(Marker::Prefix(prefix.to_string())),
            _ => Err(StoreError::InvalidToken),
        }
    }

    fn covers(&self, key: &str) -> bool {
        match self {
            Marker::Key(last) => key <= last.as_str(),
            Marker::Prefix(prefix) => key <= prefix.as_str() || key.starts_with(prefix.as_str()),
        }
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_fault(&self, op: FaultOp, key: &str) -> StoreResult<()> {
        let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
        if faults.keys.contains(&(op, key.to_string())) {
            return Err(StoreError::Backend(format!(
                "injected {:?} failure for `{}`",
                op, key
            )));
        }
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> StoreError {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_listing
        {
            return Err(StoreError::Backend("injected listing failure".into()));
        }

        let marker = request
            .continuation_token
            .as_deref()
            .map(Marker::decode)
            .transpose()?;
        let max_keys = request.max_keys.clamp(1, MAX_LIST_KEYS);

        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut page = ListPage::default();
        let mut emitted = 0usize;
        let mut last: Option<Marker> = None;

        let candidates = entries
            .range(request.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&request.prefix))
            .filter(|(key, _)| !marker.as_ref().is_some_and(|m| m.covers(key)));

        for (key, object) in candidates {
            let grouped = request
                .delimiter
                .as_deref()
                .and_then(|delim| compute_common_prefix(key, &request.prefix, delim));

            if let (Some(group), Some(Marker::Prefix(current))) = (&grouped, &last) {
                if group == current {
                    continue;
                }
            }

            if emitted == max_keys {
                page.is_truncated = true;
                page.next_continuation_token = last.as_ref().map(Marker::encode);
                break;
            }

            match grouped {
                Some(group) => {
                    page.common_prefixes.push(group.clone());
                    last = Some(Marker::Prefix(group));
                }
                None => {
                    page.contents.push(StoredObject {
                        key: key.clone(),
                        size: object.data.len() as u64,
                        last_modified: Some(object.last_modified),
                    });
                    last = Some(Marker::Key(key.clone()));
                }
            }
            emitted += 1;
        }

        Ok(page)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        self.check_fault(FaultOp::Copy, source_key)?;
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let entries = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::not_found(bucket, source_key))?;
        let mut object = entries
            .get(source_key)
            .cloned()
            .ok_or_else(|| Self::not_found(bucket, source_key))?;
        object.last_modified = Utc::now();
        entries.insert(dest_key.to_string(), object);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.check_fault(FaultOp::Delete, key)?;
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        buckets
            .get_mut(bucket)
            .and_then(|entries| entries.remove(key))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MemoryObject {
                data: body,
                content_type,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody> {
        self.check_fault(FaultOp::Get, key)?;
        let object = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| Self::not_found(bucket, key))?;

        let length = object.data.len() as u64;
        let chunks: Vec<std::io::Result<Bytes>> = (0..object.data.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| {
                let end = (start + STREAM_CHUNK_SIZE).min(object.data.len());
                Ok(object.data.slice(start..end))
            })
            .collect();

        Ok(ObjectBody {
            stream: Box::pin(stream::iter(chunks)),
            content_type: object.content_type,
            content_length: Some(length),
        })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<String> {
        let expires_at = Utc::now().timestamp() + expires_in.as_secs() as i64;
        Ok(format!(
            "memory://{}/{}?expires={}",
            bucket,
            encode_key_path(key),
            expires_at
        ))
    }
}

/// Compute the common prefix `key` rolls up into under `prefix`, if any.
fn compute_common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let pos = rest.find(delimiter)?;
    Some(format!("{}{}", prefix, &rest[..pos + delimiter.len()]))
}

/// Seeding, inspection and fault injection for tests.
#[cfg(test)]
impl MemoryObjectStore {
    /// Seed a bucket with objects, creating it if needed.
    pub fn with_objects<I, K, V>(self, bucket: &str, objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        {
            let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
            let entries = buckets.entry(bucket.to_string()).or_default();
            for (key, data) in objects {
                entries.insert(
                    key.into(),
                    MemoryObject {
                        data: data.into(),
                        content_type: None,
                        last_modified: Utc::now(),
                    },
                );
            }
        }
        self
    }

    /// Every key currently stored in `bucket`, in lexicographic order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contents(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .map(|object| object.data.clone())
    }

    /// Number of listing calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make `op` fail with a backend error whenever it targets `key`.
    pub fn inject_fault(&self, op: FaultOp, key: impl Into<String>) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .insert((op, key.into()));
    }

    pub fn fail_listing(&self, fail: bool) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_listing = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const BUCKET: &str = "test-bucket";

    fn seeded() -> MemoryObjectStore {
        MemoryObjectStore::new().with_objects(
            BUCKET,
            [
                ("docs/", ""),
                ("docs/a.txt", "a"),
                ("docs/b.txt", "bb"),
                ("docs/sub/c.txt", "c"),
                ("docs/sub/d.txt", "d"),
                ("docs/z.txt", "z"),
                ("other.txt", "o"),
            ],
        )
    }

    fn delimited(prefix: &str, max_keys: usize, token: Option<String>) -> ListRequest {
        ListRequest {
            prefix: prefix.into(),
            delimiter: Some("/".into()),
            max_keys,
            continuation_token: token,
        }
    }

    #[test]
    fn common_prefix_only_for_nested_keys() {
        assert_eq!(
            compute_common_prefix("docs/sub/c.txt", "docs/", "/"),
            Some("docs/sub/".to_string())
        );
        assert_eq!(compute_common_prefix("docs/a.txt", "docs/", "/"), None);
        assert_eq!(compute_common_prefix("other.txt", "docs/", "/"), None);
    }

    #[tokio::test]
    async fn delimited_listing_groups_children() {
        let store = seeded();
        let page = store
            .list_objects(BUCKET, delimited("docs/", 100, None))
            .await
            .unwrap();

        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/", "docs/a.txt", "docs/b.txt", "docs/z.txt"]);
        assert_eq!(page.common_prefixes, ["docs/sub/"]);
        assert!(!page.is_truncated);
        assert!(page.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn truncated_listing_resumes_past_common_prefix() {
        let store = seeded();
        let first = store
            .list_objects(BUCKET, delimited("docs/", 4, None))
            .await
            .unwrap();
        assert!(first.is_truncated);
        assert_eq!(first.common_prefixes, ["docs/sub/"]);
        assert_eq!(first.contents.len(), 3);

        let second = store
            .list_objects(BUCKET, delimited("docs/", 4, first.next_continuation_token))
            .await
            .unwrap();
        let keys: Vec<_> = second.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/z.txt"]);
        assert!(second.common_prefixes.is_empty());
        assert!(!second.is_truncated);
    }

    #[tokio::test]
    async fn key_marker_does_not_skip_longer_siblings() {
        let store = MemoryObjectStore::new().with_objects(BUCKET, [("a", "1"), ("ab", "2")]);
        let first = store
            .list_objects(BUCKET, delimited("", 1, None))
            .await
            .unwrap();
        let second = store
            .list_objects(BUCKET, delimited("", 1, first.next_continuation_token))
            .await
            .unwrap();
        assert_eq!(second.contents[0].key, "ab");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let store = seeded();
        let err = store
            .list_objects(BUCKET, delimited("docs/", 10, Some("not base64!".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidToken));
    }

    #[tokio::test]
    async fn delete_missing_key_reports_not_found() {
        let store = seeded();
        let err = store.delete_object(BUCKET, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn get_streams_in_bounded_chunks() {
        let payload = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];
        let store = MemoryObjectStore::new().with_objects(BUCKET, [("big.bin", payload.clone())]);
        let body = store.get_object(BUCKET, "big.bin").await.unwrap();
        assert_eq!(body.content_length, Some(payload.len() as u64));

        let chunks: Vec<_> = body.stream.collect().await;
        assert_eq!(chunks.len(), 3);
        assert!(
            chunks
                .iter()
                .all(|c| c.as_ref().unwrap().len() <= STREAM_CHUNK_SIZE)
        );
    }

    #[tokio::test]
    async fn injected_copy_fault_fails_only_that_key() {
        let store = seeded();
        store.inject_fault(FaultOp::Copy, "docs/a.txt");
        assert!(store.copy_object(BUCKET, "docs/a.txt", "x").await.is_err());
        assert!(store.copy_object(BUCKET, "docs/b.txt", "y").await.is_ok());
        assert_eq!(store.contents(BUCKET, "y").unwrap(), Bytes::from("bb"));
    }
}
