//! Object store client adapter.
//!
//! The namespace layer only ever talks to a bucket through [`ObjectStore`].
//! Implementations are expected to be reliable per call: a transient fault
//! surfaces as [`StoreError::Backend`] and is never retried here.
//!
//! - [`s3::S3ObjectStore`] talks to AWS S3 or any S3-compatible endpoint.
//! - [`memory::MemoryObjectStore`] keeps an ordered key space in process and
//!   backs local development and the test suite.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::{io, time::Duration};
use thiserror::Error;

/// Parameters for a single `ListObjectsV2`-style call.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: String,
    /// `Some("/")` groups keys into common prefixes; `None` walks the whole sub-tree.
    pub delimiter: Option<String>,
    pub max_keys: usize,
    pub continuation_token: Option<String>,
}

/// One object row as returned by a listing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub contents: Vec<StoredObject>,
    pub next_continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// Object body handed back by [`ObjectStore::get_object`].
pub struct ObjectBody {
    pub stream: BoxStream<'static, io::Result<Bytes>>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid continuation token")]
    InvalidToken,
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal surface of an S3-compatible bucket.
///
/// Every call addresses exactly one bucket and is atomic only for the single
/// object it touches.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name used in logs and readiness output.
    fn kind(&self) -> &'static str;

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage>;

    /// Server-side copy of `source_key` onto `dest_key`, overwriting any existing object.
    async fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str)
    -> StoreResult<()>;

    /// Delete one object. Backends may report a missing key as
    /// [`StoreError::NotFound`]; callers decide whether that matters.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody>;

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration)
    -> StoreResult<String>;
}

/// Percent-encode each path segment of a key, keeping the `/` separators.
pub(crate) fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
