//! Whole sub-tree copy, move and delete.
//!
//! Object stores have no rename, so moving a folder means walking every key
//! under the source prefix and copying each one, deleting the source key only
//! after its own copy succeeded. The walk stops at the first failure and
//! nothing already done is undone; the returned report says how far it got.
//!
//! Destination keys that already exist are overwritten.

use super::{
    namespace_service::{NamespaceError, NamespaceResult, NamespaceService},
    pager::ObjectPager,
};
use crate::models::{OperationReport, entry::is_folder_key};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl NamespaceService {
    /// Copy every object under `source` to the same relative path under
    /// `dest`, optionally deleting each source object once copied.
    pub async fn copy_prefix(
        &self,
        source: &str,
        dest: &str,
        delete_source: bool,
        cancel: &CancellationToken,
    ) -> NamespaceResult<OperationReport> {
        validate_prefix_pair(source, dest)?;
        let operation = if delete_source { "move_prefix" } else { "copy_prefix" };
        let mut report = OperationReport::new(operation, None);
        let mut pager = self.pager(source);

        'walk: loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let objects = match pager.next_page().await {
                None if pager.is_exhausted() => break,
                None => {
                    warn!(bucket = %self.bucket, prefix = source, "walk page budget spent");
                    report.record_failure(source, budget_spent(&pager));
                    break;
                }
                Some(Ok(objects)) => objects,
                Some(Err(err)) => {
                    warn!(
                        bucket = %self.bucket,
                        prefix = source,
                        resume = ?pager.resume_token(),
                        error = %err,
                        "walk failed"
                    );
                    report.record_failure(source, err);
                    break;
                }
            };

            for object in objects {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'walk;
                }
                let relative = object.key.strip_prefix(source).unwrap_or(&object.key);
                let dest_key = format!("{}{}", dest, relative);

                if let Err(err) = self
                    .store
                    .copy_object(&self.bucket, &object.key, &dest_key)
                    .await
                {
                    warn!(
                        bucket = %self.bucket,
                        key = %object.key,
                        dest_key,
                        error = %err,
                        "copy failed"
                    );
                    report.record_failure(object.key, err);
                    break 'walk;
                }

                if delete_source {
                    if let Err(err) = self.delete_object(&object.key).await {
                        warn!(
                            bucket = %self.bucket,
                            key = %object.key,
                            error = %err,
                            "delete after copy failed"
                        );
                        let reason =
                            format!("copied to `{}` but source delete failed: {}", dest_key, err);
                        report.record_failure(object.key, reason);
                        break 'walk;
                    }
                }

                debug!(bucket = %self.bucket, key = %object.key, dest_key, "copied object");
                report.objects_processed += 1;
                report.record_success(object.key);
            }
        }

        info!(
            bucket = %self.bucket,
            source,
            dest,
            pages = pager.pages_fetched(),
            exhausted = pager.is_exhausted(),
            objects = report.objects_processed,
            complete = report.is_complete(),
            "{}",
            report.summary()
        );
        Ok(report)
    }

    /// Delete every object under `prefix`, the folder marker included.
    ///
    /// Keys that vanish mid-walk count as deleted, so re-running after a
    /// partial failure is safe.
    pub async fn delete_prefix(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> NamespaceResult<OperationReport> {
        if !is_folder_key(prefix) {
            return Err(NamespaceError::invalid(format!(
                "`{}` is not a folder prefix",
                prefix
            )));
        }
        let mut report = OperationReport::new("delete_prefix", None);
        let mut pager = self.pager(prefix);

        'walk: loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let objects = match pager.next_page().await {
                None if pager.is_exhausted() => break,
                None => {
                    warn!(bucket = %self.bucket, prefix, "walk page budget spent");
                    report.record_failure(prefix, budget_spent(&pager));
                    break;
                }
                Some(Ok(objects)) => objects,
                Some(Err(err)) => {
                    warn!(
                        bucket = %self.bucket,
                        prefix,
                        resume = ?pager.resume_token(),
                        error = %err,
                        "walk failed"
                    );
                    report.record_failure(prefix, err);
                    break;
                }
            };

            for object in objects {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'walk;
                }
                if let Err(err) = self.delete_object(&object.key).await {
                    warn!(bucket = %self.bucket, key = %object.key, error = %err, "delete failed");
                    report.record_failure(object.key, err);
                    break 'walk;
                }
                report.objects_processed += 1;
                report.record_success(object.key);
            }
        }

        info!(
            bucket = %self.bucket,
            prefix,
            pages = pager.pages_fetched(),
            exhausted = pager.is_exhausted(),
            objects = report.objects_processed,
            complete = report.is_complete(),
            "{}",
            report.summary()
        );
        Ok(report)
    }
}

/// Failure reason for a walk stopped by `WalkOptions::max_pages` with
/// objects still left under the prefix.
fn budget_spent(pager: &ObjectPager) -> String {
    format!(
        "walk stopped after {} pages with objects remaining (resume token {})",
        pager.pages_fetched(),
        pager.resume_token().unwrap_or("none")
    )
}

/// Both prefixes must be folder-shaped and `dest` must lie outside `source`;
/// a walk would otherwise see its own output.
fn validate_prefix_pair(source: &str, dest: &str) -> NamespaceResult<()> {
    if !is_folder_key(source) {
        return Err(NamespaceError::invalid(format!(
            "source `{}` is not a folder prefix",
            source
        )));
    }
    if !is_folder_key(dest) {
        return Err(NamespaceError::invalid(format!(
            "destination `{}` is not a folder prefix",
            dest
        )));
    }
    if dest.starts_with(source) {
        return Err(NamespaceError::invalid(format!(
            "cannot copy `{}` into itself (`{}`)",
            source, dest
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{
            namespace_service::tests::{BUCKET, service_cancelling_after, service_with},
            pager::WalkOptions,
        },
        store::memory::FaultOp,
    };

    const DOCS: [&str; 4] = ["docs/", "docs/a.txt", "docs/b.txt", "docs/sub/c.txt"];

    fn under<'a>(keys: &'a [String], prefix: &str) -> Vec<&'a str> {
        keys.iter()
            .filter(|k| k.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    #[tokio::test]
    async fn copy_preserves_relative_paths_and_sources() {
        let (store, service) = service_with(&DOCS);
        let report = service
            .copy_prefix("docs/", "backup/", false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.objects_processed, 4);
        let keys = store.keys(BUCKET);
        assert_eq!(
            under(&keys, "backup/"),
            ["backup/", "backup/a.txt", "backup/b.txt", "backup/sub/c.txt"]
        );
        assert_eq!(under(&keys, "docs/"), DOCS);
        assert_eq!(store.contents(BUCKET, "backup/sub/c.txt").unwrap(), "docs/sub/c.txt");
    }

    #[tokio::test]
    async fn move_leaves_nothing_under_source() {
        let (store, service) = service_with(&["docs/a.txt", "docs/b.txt", "docs/sub/c.txt"]);
        let report = service
            .copy_prefix("docs/", "archive/", true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(
            store.keys(BUCKET),
            ["archive/a.txt", "archive/b.txt", "archive/sub/c.txt"]
        );
    }

    #[tokio::test]
    async fn move_walks_across_many_pages() {
        let keys: Vec<String> = (0..25).map(|i| format!("big/{:02}.dat", i)).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (store, service) = service_with(&refs);
        let service = service.with_walk_options(WalkOptions {
            page_size: 4,
            ..Default::default()
        });

        let report = service
            .copy_prefix("big/", "moved/", true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.objects_processed, 25);
        let remaining = store.keys(BUCKET);
        assert!(under(&remaining, "big/").is_empty());
        assert_eq!(under(&remaining, "moved/").len(), 25);
    }

    #[tokio::test]
    async fn empty_source_is_successful_noop() {
        let (store, service) = service_with(&["other.txt"]);
        let report = service
            .copy_prefix("missing/", "dest/", true, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.objects_processed, 0);
        assert_eq!(store.keys(BUCKET), ["other.txt"]);
    }

    #[tokio::test]
    async fn failure_stops_walk_without_rollback() {
        let (store, service) = service_with(&["docs/a.txt", "docs/b.txt", "docs/c.txt"]);
        store.inject_fault(FaultOp::Copy, "docs/b.txt");

        let report = service
            .copy_prefix("docs/", "archive/", true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.succeeded, ["docs/a.txt"]);
        assert_eq!(report.failed[0].key, "docs/b.txt");
        assert_eq!(report.summary(), "move_prefix failed after 2 processed");
        assert_eq!(
            store.keys(BUCKET),
            ["archive/a.txt", "docs/b.txt", "docs/c.txt"]
        );
    }

    #[tokio::test]
    async fn source_is_kept_when_its_delete_fails() {
        let (store, service) = service_with(&["docs/a.txt"]);
        store.inject_fault(FaultOp::Delete, "docs/a.txt");

        let report = service
            .copy_prefix("docs/", "archive/", true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.failed[0].reason.contains("source delete failed"));
        assert_eq!(store.keys(BUCKET), ["archive/a.txt", "docs/a.txt"]);
    }

    #[tokio::test]
    async fn rejects_destination_inside_source() {
        let (store, service) = service_with(&DOCS);
        let err = service
            .copy_prefix("docs/", "docs/nested/", false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceError::InvalidInput(_)));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn rejects_non_folder_prefixes() {
        let (_, service) = service_with(&DOCS);
        let cancel = CancellationToken::new();
        assert!(service.copy_prefix("docs", "x/", false, &cancel).await.is_err());
        assert!(service.copy_prefix("docs/", "", false, &cancel).await.is_err());
        assert!(service.copy_prefix("", "x/", false, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_walk_touches_nothing() {
        let (store, service) = service_with(&DOCS);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = service
            .copy_prefix("docs/", "archive/", true, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert_eq!(under(&store.keys(BUCKET), "docs/"), DOCS);
    }

    #[tokio::test]
    async fn delete_prefix_is_idempotent() {
        let (store, service) = service_with(&["tmp/", "tmp/a", "tmp/b/c", "keep.txt"]);
        let cancel = CancellationToken::new();

        let first = service.delete_prefix("tmp/", &cancel).await.unwrap();
        assert_eq!(first.objects_processed, 3);
        let second = service.delete_prefix("tmp/", &cancel).await.unwrap();
        assert!(second.is_complete());
        assert_eq!(second.objects_processed, 0);
        assert_eq!(store.keys(BUCKET), ["keep.txt"]);
    }

    #[tokio::test]
    async fn spent_page_budget_is_not_reported_complete() {
        let (store, service) = service_with(&["d/1", "d/2", "d/3", "d/4"]);
        let service = service.with_walk_options(WalkOptions {
            page_size: 2,
            max_pages: Some(1),
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let report = service.copy_prefix("d/", "e/", true, &cancel).await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.succeeded, ["d/1", "d/2"]);
        assert_eq!(report.failed[0].key, "d/");
        assert!(report.failed[0].reason.contains("objects remaining"));
        assert_eq!(store.keys(BUCKET), ["d/3", "d/4", "e/1", "e/2"]);

        let (_, service) = service_with(&["x/1", "x/2", "x/3"]);
        let service = service.with_walk_options(WalkOptions {
            page_size: 1,
            max_pages: Some(2),
            ..Default::default()
        });
        let report = service.delete_prefix("x/", &cancel).await.unwrap();
        assert_eq!(report.succeeded, ["x/1", "x/2"]);
        assert_eq!(report.failed[0].key, "x/");
    }

    #[tokio::test]
    async fn cancellation_mid_walk_keeps_finished_objects() {
        let cancel = CancellationToken::new();
        let (store, service) = service_cancelling_after(
            &["docs/a.txt", "docs/b.txt", "docs/c.txt"],
            "docs/a.txt",
            &cancel,
        );

        let report = service
            .copy_prefix("docs/", "archive/", true, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded, ["docs/a.txt"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.summary(), "move_prefix cancelled after 1 processed");
        assert_eq!(
            store.keys(BUCKET),
            ["archive/a.txt", "docs/b.txt", "docs/c.txt"]
        );
    }
}
