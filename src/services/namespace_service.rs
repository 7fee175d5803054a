//! NamespaceService: folder-style view over one bucket of an object store.
//!
//! This file holds the service context, the listing path and the
//! single-object operations (create folder, upload, delete, presign,
//! stream). Multi-object operations live in `prefix_copier`, `rename` and
//! `bulk`.
//!
//! Nothing is cached: every call asks the store afresh.

use crate::{
    models::entry::{
        DELIMITER, Listing, NamespaceEntry, basename, is_folder_key, normalize_prefix,
    },
    store::{ListRequest, ObjectBody, ObjectStore, StoreError},
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::pager::{ObjectPager, WalkOptions};

pub const MIN_LIST_KEYS: usize = 50;
pub const MAX_LIST_KEYS: usize = 1000;
pub const DEFAULT_LIST_KEYS: usize = 500;
/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_PRESIGN_TTL_SECS: u64 = 604_800;
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum NamespaceError {
    /// Rejected before any backend call; no state was touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NamespaceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        NamespaceError::InvalidInput(msg.into())
    }
}

pub type NamespaceResult<T> = Result<T, NamespaceError>;

/// Page request for [`NamespaceService::list`].
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub continuation_token: Option<String>,
    pub max_keys: usize,
    /// Substring matched case-insensitively against the keys of this page only.
    pub search: Option<String>,
}

impl ListOptions {
    /// Build options from raw caller input.
    ///
    /// Numeric `max_keys` is clamped to `50..=1000`, anything non-numeric
    /// falls back to 500. Blank tokens and searches count as absent.
    pub fn from_raw(
        continuation_token: Option<String>,
        max_keys: Option<&str>,
        search: Option<String>,
    ) -> Self {
        Self {
            continuation_token: continuation_token.filter(|t| !t.is_empty()),
            max_keys: clamp_max_keys(max_keys),
            search: search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

pub fn clamp_max_keys(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .map(|value| value.clamp(MIN_LIST_KEYS as i64, MAX_LIST_KEYS as i64) as usize)
        .unwrap_or(DEFAULT_LIST_KEYS)
}

/// Explicit per-bucket context for every namespace call.
///
/// Cloning is cheap; the store handle is shared.
#[derive(Clone)]
pub struct NamespaceService {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) bucket: String,
    pub(crate) walk: WalkOptions,
    pub(crate) presign_ttl: Duration,
}

impl NamespaceService {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            walk: WalkOptions::default(),
            presign_ttl: Duration::from_secs(DEFAULT_PRESIGN_TTL_SECS),
        }
    }

    pub fn with_walk_options(mut self, walk: WalkOptions) -> Self {
        self.walk = walk;
        self
    }

    pub fn with_presign_ttl(mut self, ttl: Duration) -> Self {
        self.presign_ttl = ttl;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// Lazily walk every object under `prefix`, page by page.
    pub fn pager(&self, prefix: &str) -> ObjectPager {
        ObjectPager::new(self.store.clone(), &self.bucket, prefix, &self.walk)
    }

    /// Immediate children of `prefix`, one backend page at a time.
    ///
    /// A failing backend call yields an empty listing instead of an error so
    /// the caller can still render the page.
    pub async fn list(&self, prefix: &str, options: ListOptions) -> Listing {
        let request = ListRequest {
            prefix: prefix.to_string(),
            delimiter: Some(DELIMITER.to_string()),
            max_keys: options.max_keys,
            continuation_token: options.continuation_token.clone(),
        };

        let page = match self.store.list_objects(&self.bucket, request).await {
            Ok(page) => page,
            Err(err) => {
                warn!(
                    bucket = %self.bucket,
                    prefix,
                    error = %err,
                    "listing failed, showing prefix as empty"
                );
                return Listing::empty(prefix);
            }
        };

        let needle = options
            .search
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        let folders = page
            .common_prefixes
            .into_iter()
            .map(|cp| NamespaceEntry::folder(cp, prefix));
        let files = page
            .contents
            .into_iter()
            .map(|obj| NamespaceEntry::file(obj.key, prefix, obj.size, obj.last_modified));
        let entries = folders.chain(files).filter(|entry| entry.matches(&needle));

        let next_token = if page.is_truncated {
            page.next_continuation_token
        } else {
            None
        };
        let listing = Listing::from_entries(prefix, entries, next_token);

        debug!(
            bucket = %self.bucket,
            prefix,
            folders = listing.folder_count,
            files = listing.file_count,
            truncated = listing.continuation_token.is_some(),
            "listed prefix"
        );
        listing
    }

    /// One-key listing at the bucket root. Unlike [`Self::list`] this
    /// surfaces backend errors, for readiness checks.
    pub async fn check_store(&self) -> NamespaceResult<()> {
        let request = ListRequest {
            prefix: String::new(),
            delimiter: Some(DELIMITER.to_string()),
            max_keys: 1,
            continuation_token: None,
        };
        self.store.list_objects(&self.bucket, request).await?;
        Ok(())
    }

    /// Write an empty marker object for `parent + name + "/"`.
    pub async fn create_folder(&self, parent: &str, name: &str) -> NamespaceResult<String> {
        let name = name.trim();
        if name.is_empty() || name == DELIMITER {
            return Err(NamespaceError::invalid("folder name is required"));
        }
        let key = format!("{}{}", normalize_prefix(parent.trim()), normalize_prefix(name));

        self.store
            .put_object(&self.bucket, &key, Bytes::new(), None)
            .await?;
        info!(bucket = %self.bucket, key, "created folder");
        Ok(key)
    }

    /// Store `body` as `prefix + basename(filename)`.
    pub async fn upload(
        &self,
        prefix: &str,
        filename: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> NamespaceResult<String> {
        let name = basename(filename.trim());
        if name.is_empty() {
            return Err(NamespaceError::invalid("file name is required"));
        }
        let key = format!("{}{}", normalize_prefix(prefix), name);
        let size = body.len();

        self.store
            .put_object(&self.bucket, &key, body, content_type)
            .await?;
        info!(bucket = %self.bucket, key, size, "uploaded object");
        Ok(key)
    }

    /// Delete one object; a key that is already gone counts as deleted.
    pub async fn delete_object(&self, key: &str) -> NamespaceResult<()> {
        if key.is_empty() {
            return Err(NamespaceError::invalid("key is required"));
        }
        match self.store.delete_object(&self.bucket, key).await {
            Ok(()) => {
                debug!(bucket = %self.bucket, key, "deleted object");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(bucket = %self.bucket, key, "object already absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Time-limited read URL for `key`.
    ///
    /// The URL stays valid until it expires; deleting the object afterwards
    /// does not revoke it.
    pub async fn presign(&self, key: &str, ttl_secs: Option<u64>) -> NamespaceResult<String> {
        ensure_object_key(key)?;
        let ttl = match ttl_secs {
            Some(secs) if secs == 0 || secs > MAX_PRESIGN_TTL_SECS => {
                return Err(NamespaceError::invalid(format!(
                    "ttl must be between 1 and {} seconds",
                    MAX_PRESIGN_TTL_SECS
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => self.presign_ttl,
        };

        let url = self.store.presign_get(&self.bucket, key, ttl).await?;
        info!(bucket = %self.bucket, key, ttl_secs = ttl.as_secs(), "issued presigned url");
        Ok(url)
    }

    /// Open `key` for streaming to a caller.
    pub async fn stream(&self, key: &str) -> NamespaceResult<ObjectBody> {
        ensure_object_key(key)?;
        let body = self.store.get_object(&self.bucket, key).await?;
        debug!(
            bucket = %self.bucket,
            key,
            content_length = ?body.content_length,
            "streaming object"
        );
        Ok(body)
    }
}

fn ensure_object_key(key: &str) -> NamespaceResult<()> {
    if key.is_empty() {
        return Err(NamespaceError::invalid("key is required"));
    }
    if is_folder_key(key) {
        return Err(NamespaceError::invalid(format!(
            "`{}` is a folder, not an object",
            key
        )));
    }
    Ok(())
}
