//! Lazy, restartable walk over every object under a prefix.
//!
//! Unlike the delimited listing used for browsing, a walk ignores folder
//! grouping and follows the backend's continuation token until the backend
//! reports no further pages. Each call to [`ObjectPager::next_page`] costs
//! exactly one backend round trip, so callers can check for cancellation,
//! bound total work, or persist [`ObjectPager::resume_token`] between pages.

use crate::store::{ListRequest, ObjectStore, StoreResult, StoredObject};
use std::{sync::Arc, time::Duration};
use tracing::debug;

pub const MAX_WALK_PAGE_SIZE: usize = 1000;

/// Pacing for full sub-tree walks.
#[derive(Clone, Debug)]
pub struct WalkOptions {
    pub page_size: usize,
    /// Sleep between consecutive page requests.
    pub pause: Option<Duration>,
    /// Stop after this many pages even if the backend has more.
    pub max_pages: Option<usize>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_WALK_PAGE_SIZE,
            pause: None,
            max_pages: None,
        }
    }
}

pub struct ObjectPager {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    page_size: usize,
    pause: Option<Duration>,
    max_pages: Option<usize>,
    token: Option<String>,
    pages_fetched: usize,
    exhausted: bool,
}

impl ObjectPager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        prefix: &str,
        options: &WalkOptions,
    ) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            page_size: options.page_size.clamp(1, MAX_WALK_PAGE_SIZE),
            pause: options.pause.filter(|p| !p.is_zero()),
            max_pages: options.max_pages,
            token: None,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Token that fetches the page after the last one returned.
    pub fn resume_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// True once the backend has reported its last page.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page of objects.
    ///
    /// Returns `None` when the walk is finished or the page budget is spent.
    /// A failed call leaves the position untouched, so calling again retries
    /// the same page.
    pub async fn next_page(&mut self) -> Option<StoreResult<Vec<StoredObject>>> {
        if self.exhausted {
            return None;
        }
        if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
            return None;
        }
        if self.pages_fetched > 0 {
            if let Some(pause) = self.pause {
                tokio::time::sleep(pause).await;
            }
        }

        let request = ListRequest {
            prefix: self.prefix.clone(),
            delimiter: None,
            max_keys: self.page_size,
            continuation_token: self.token.clone(),
        };
        let page = match self.store.list_objects(&self.bucket, request).await {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };

        self.pages_fetched += 1;
        match page.next_continuation_token {
            Some(next) if page.is_truncated => self.token = Some(next),
            _ => {
                self.token = None;
                self.exhausted = true;
            }
        }

        debug!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            page = self.pages_fetched,
            objects = page.contents.len(),
            more = !self.exhausted,
            "fetched walk page"
        );
        Some(Ok(page.contents))
    }
}
