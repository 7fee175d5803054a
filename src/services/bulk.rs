//! Delete, move or copy a mixed selection of files and folders.
//!
//! Keys are handled one at a time in the order supplied. Deletes keep going
//! past a failing key; moves and copies stop at the first failure and list
//! the untouched keys as skipped. Either way nothing is rolled back.

use super::namespace_service::{NamespaceError, NamespaceResult, NamespaceService};
use crate::models::{
    BulkAction, BulkSelection, OperationReport,
    entry::{basename, is_folder_key, normalize_prefix},
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One selected key with its destination already worked out.
#[derive(Debug)]
struct PlannedKey {
    key: String,
    dest: Option<String>,
}

impl NamespaceService {
    pub async fn execute_bulk(
        &self,
        selection: BulkSelection,
        cancel: &CancellationToken,
    ) -> NamespaceResult<OperationReport> {
        let action = selection.action;
        let plan = plan_selection(selection)?;
        let mut report = OperationReport::new(action.to_string(), Some(plan.len()));

        let mut remaining = plan.into_iter();
        while let Some(planned) = remaining.next() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.skip_all(std::iter::once(planned.key).chain(remaining.map(|p| p.key)));
                break;
            }

            let result = self.apply(action, &planned, cancel).await;
            match result {
                Ok(sub) if sub.is_complete() => {
                    report.objects_processed += sub.objects_processed;
                    report.record_success(planned.key);
                }
                Ok(sub) => {
                    report.objects_processed += sub.objects_processed;
                    report.cancelled |= sub.cancelled;
                    let reason = sub
                        .first_failure()
                        .map(|f| format!("{}: {}", f.key, f.reason))
                        .unwrap_or_else(|| sub.summary());
                    warn!(
                        bucket = %self.bucket,
                        key = %planned.key,
                        %reason,
                        "bulk {} failed",
                        action
                    );
                    report.record_failure(planned.key, reason);
                    if action != BulkAction::Delete || sub.cancelled {
                        report.skip_all(remaining.map(|p| p.key));
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        bucket = %self.bucket,
                        key = %planned.key,
                        error = %err,
                        "bulk {} failed",
                        action
                    );
                    report.record_failure(planned.key, err);
                    if action != BulkAction::Delete {
                        report.skip_all(remaining.map(|p| p.key));
                        break;
                    }
                }
            }
        }

        info!(
            bucket = %self.bucket,
            action = %action,
            keys = report.total.unwrap_or_default(),
            objects = report.objects_processed,
            complete = report.is_complete(),
            "{}",
            report.summary()
        );
        Ok(report)
    }

    /// Run `action` for a single planned key.
    async fn apply(
        &self,
        action: BulkAction,
        planned: &PlannedKey,
        cancel: &CancellationToken,
    ) -> NamespaceResult<OperationReport> {
        let key = planned.key.as_str();
        let folder = is_folder_key(key);

        match (action, planned.dest.as_deref()) {
            (BulkAction::Delete, _) if folder => self.delete_prefix(key, cancel).await,
            (BulkAction::Delete, _) => {
                self.delete_object(key).await?;
                Ok(single_object_report("delete", key))
            }
            (_, Some(dest)) if dest == key => {
                debug!(bucket = %self.bucket, key, "source equals destination, skipping");
                Ok(OperationReport::new(action.to_string(), Some(1)))
            }
            (_, Some(dest)) if folder => {
                self.copy_prefix(key, dest, action.deletes_source(), cancel)
                    .await
            }
            (_, Some(dest)) => {
                self.store.copy_object(&self.bucket, key, dest).await?;
                if action.deletes_source() {
                    if let Err(err) = self.delete_object(key).await {
                        let mut report = OperationReport::new(action.to_string(), Some(1));
                        report.record_failure(
                            key,
                            format!("copied to `{}` but source delete failed: {}", dest, err),
                        );
                        return Ok(report);
                    }
                }
                debug!(bucket = %self.bucket, key, dest, "bulk {} object", action);
                Ok(single_object_report(&action.to_string(), key))
            }
            (_, None) => Err(NamespaceError::invalid("target is required")),
        }
    }
}

fn single_object_report(operation: &str, key: &str) -> OperationReport {
    let mut report = OperationReport::new(operation, Some(1));
    report.objects_processed = 1;
    report.record_success(key);
    report
}

/// Validate a selection and work out every destination before any backend
/// call, so bad input never leaves partial state behind.
fn plan_selection(selection: BulkSelection) -> NamespaceResult<Vec<PlannedKey>> {
    let BulkSelection {
        keys,
        action,
        target,
    } = selection;

    if keys.is_empty() {
        return Err(NamespaceError::invalid("no keys selected"));
    }
    if keys.iter().any(|k| k.is_empty()) {
        return Err(NamespaceError::invalid("selected keys must not be empty"));
    }

    let target = if action.needs_target() {
        let target = target.as_deref().map(str::trim).unwrap_or_default();
        if target.is_empty() {
            return Err(NamespaceError::invalid(format!(
                "{} requires a target folder",
                action
            )));
        }
        Some(normalize_prefix(target))
    } else {
        None
    };

    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(keys.len());
    for key in keys {
        if !seen.insert(key.clone()) {
            continue;
        }
        let dest = match &target {
            Some(target) if is_folder_key(&key) => {
                let dest = format!("{}{}/", target, basename(&key));
                if dest != key && dest.starts_with(&key) {
                    return Err(NamespaceError::invalid(format!(
                        "cannot {} `{}` into itself",
                        action, key
                    )));
                }
                Some(dest)
            }
            Some(target) => Some(format!("{}{}", target, basename(&key))),
            None => None,
        };
        plan.push(PlannedKey { key, dest });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::namespace_service::tests::{BUCKET, service_cancelling_after, service_with},
        store::memory::FaultOp,
    };

    fn selection(keys: &[&str], action: BulkAction, target: Option<&str>) -> BulkSelection {
        BulkSelection {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            action,
            target: target.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn move_normalizes_target_and_handles_mixed_keys() {
        let (store, service) =
            service_with(&["a.txt", "b/", "b/one.txt", "b/deep/two.txt", "c.txt"]);
        let report = service
            .execute_bulk(
                selection(&["a.txt", "b/"], BulkAction::Move, Some("x")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded, ["a.txt", "b/"]);
        assert_eq!(report.objects_processed, 4);
        assert_eq!(
            store.keys(BUCKET),
            ["c.txt", "x/a.txt", "x/b/", "x/b/deep/two.txt", "x/b/one.txt"]
        );
    }

    #[tokio::test]
    async fn copy_keeps_sources() {
        let (store, service) = service_with(&["a.txt", "b/one.txt"]);
        service
            .execute_bulk(
                selection(&["a.txt", "b/"], BulkAction::Copy, Some("dup/")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            store.keys(BUCKET),
            ["a.txt", "b/one.txt", "dup/a.txt", "dup/b/one.txt"]
        );
    }

    #[tokio::test]
    async fn delete_twice_succeeds_both_times() {
        let (store, service) = service_with(&["a.txt", "b/", "b/one.txt", "keep.txt"]);
        let keys = ["a.txt", "b/"];
        let cancel = CancellationToken::new();

        let first = service
            .execute_bulk(selection(&keys, BulkAction::Delete, None), &cancel)
            .await
            .unwrap();
        let second = service
            .execute_bulk(selection(&keys, BulkAction::Delete, None), &cancel)
            .await
            .unwrap();

        assert!(first.is_complete());
        assert!(second.is_complete());
        assert_eq!(first.objects_processed, 3);
        assert_eq!(second.objects_processed, 1);
        assert_eq!(store.keys(BUCKET), ["keep.txt"]);
    }

    #[tokio::test]
    async fn delete_continues_past_failing_key() {
        let (store, service) = service_with(&["a.txt", "b.txt", "c.txt"]);
        store.inject_fault(FaultOp::Delete, "b.txt");

        let report = service
            .execute_bulk(
                selection(&["a.txt", "b.txt", "c.txt"], BulkAction::Delete, None),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded, ["a.txt", "c.txt"]);
        assert_eq!(report.failed[0].key, "b.txt");
        assert!(report.skipped.is_empty());
        assert_eq!(store.keys(BUCKET), ["b.txt"]);
    }

    #[tokio::test]
    async fn move_stops_at_first_failure_and_skips_rest() {
        let (store, service) = service_with(&["a.txt", "b/one.txt", "b/two.txt", "c.txt"]);
        store.inject_fault(FaultOp::Copy, "b/two.txt");

        let report = service
            .execute_bulk(
                selection(&["a.txt", "b/", "c.txt"], BulkAction::Move, Some("x/")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded, ["a.txt"]);
        assert_eq!(report.failed[0].key, "b/");
        assert!(report.failed[0].reason.starts_with("b/two.txt"));
        assert_eq!(report.skipped, ["c.txt"]);
        assert_eq!(report.objects_processed, 2);
        assert_eq!(report.summary(), "move failed after 2 of 3 processed");
        assert_eq!(
            store.keys(BUCKET),
            ["b/two.txt", "c.txt", "x/a.txt", "x/b/one.txt"]
        );
    }

    #[tokio::test]
    async fn invalid_selection_touches_nothing() {
        let (store, service) = service_with(&["a.txt", "b/one.txt"]);
        let cancel = CancellationToken::new();
        let bad = [
            selection(&[], BulkAction::Delete, None),
            selection(&["a.txt", ""], BulkAction::Delete, None),
            selection(&["a.txt"], BulkAction::Move, None),
            selection(&["a.txt"], BulkAction::Copy, Some("   ")),
            selection(&["a.txt", "b/"], BulkAction::Move, Some("b/inner")),
        ];
        for sel in bad {
            let err = service.execute_bulk(sel, &cancel).await.unwrap_err();
            assert!(matches!(err, NamespaceError::InvalidInput(_)));
        }
        assert_eq!(store.keys(BUCKET), ["a.txt", "b/one.txt"]);
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn move_onto_own_location_is_noop() {
        let (store, service) = service_with(&["x/a.txt"]);
        let report = service
            .execute_bulk(
                selection(&["x/a.txt"], BulkAction::Move, Some("x")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(store.keys(BUCKET), ["x/a.txt"]);
    }

    #[tokio::test]
    async fn duplicate_keys_run_once() {
        let (store, service) = service_with(&["a.txt"]);
        let report = service
            .execute_bulk(
                selection(&["a.txt", "a.txt"], BulkAction::Copy, Some("y")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.total, Some(1));
        assert_eq!(store.keys(BUCKET), ["a.txt", "y/a.txt"]);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_keys() {
        let (store, service) = service_with(&["a.txt", "b.txt"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = service
            .execute_bulk(
                selection(&["a.txt", "b.txt"], BulkAction::Delete, None),
                &cancel,
            )
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.skipped, ["a.txt", "b.txt"]);
        assert_eq!(store.keys(BUCKET).len(), 2);
    }

    #[tokio::test]
    async fn file_move_with_failed_source_delete_names_the_copy() {
        let (store, service) = service_with(&["a.txt", "b.txt"]);
        store.inject_fault(FaultOp::Delete, "a.txt");

        let report = service
            .execute_bulk(
                selection(&["a.txt", "b.txt"], BulkAction::Move, Some("x")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.failed[0].key, "a.txt");
        assert!(
            report.failed[0]
                .reason
                .contains("copied to `x/a.txt` but source delete failed")
        );
        assert_eq!(report.skipped, ["b.txt"]);
        assert_eq!(store.keys(BUCKET), ["a.txt", "b.txt", "x/a.txt"]);
    }

    #[tokio::test]
    async fn cancellation_between_keys_splits_done_from_skipped() {
        let cancel = CancellationToken::new();
        let (store, service) =
            service_cancelling_after(&["a.txt", "b.txt", "c.txt"], "a.txt", &cancel);

        let report = service
            .execute_bulk(
                selection(&["a.txt", "b.txt", "c.txt"], BulkAction::Copy, Some("x")),
                &cancel,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded, ["a.txt"]);
        assert_eq!(report.skipped, ["b.txt", "c.txt"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.summary(), "copy cancelled after 1 of 3 processed");
        assert_eq!(store.keys(BUCKET), ["a.txt", "b.txt", "c.txt", "x/a.txt"]);
    }
}
