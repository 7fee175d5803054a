//! Rename of files and folders.
//!
//! A rename is never a backend primitive. [`resolve_rename`] works out the
//! destination key and the move itself goes through `copy_prefix` for
//! folders or a single copy+delete for files.

use super::namespace_service::{NamespaceError, NamespaceResult, NamespaceService};
use crate::models::{
    OperationReport,
    entry::{DELIMITER, is_folder_key, parent_prefix},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Destination key for renaming `old_key` to `new_name`.
///
/// A `new_name` containing `/` is taken as a full path from the bucket root;
/// otherwise it replaces the last segment of `old_key`. Folder keys always
/// resolve to folder keys.
pub fn resolve_rename(old_key: &str, new_name: &str) -> String {
    let mut new_key = if new_name.contains(DELIMITER) {
        new_name.to_string()
    } else {
        format!("{}{}", parent_prefix(old_key), new_name)
    };
    if is_folder_key(old_key) && !is_folder_key(&new_key) {
        new_key.push_str(DELIMITER);
    }
    new_key
}

#[derive(Clone, Debug, Serialize)]
pub struct RenameOutcome {
    pub old_key: String,
    pub new_key: String,
    pub report: OperationReport,
}

impl NamespaceService {
    pub async fn rename(
        &self,
        old_key: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> NamespaceResult<RenameOutcome> {
        let new_name = new_name.trim();
        if old_key.is_empty() {
            return Err(NamespaceError::invalid("key to rename is required"));
        }
        if new_name.is_empty() {
            return Err(NamespaceError::invalid("new name is required"));
        }

        let new_key = resolve_rename(old_key, new_name);
        let is_folder = is_folder_key(old_key);
        if !is_folder && is_folder_key(&new_key) {
            return Err(NamespaceError::invalid(format!(
                "cannot rename file `{}` to folder-shaped key `{}`",
                old_key, new_key
            )));
        }

        if new_key == old_key {
            let mut report = OperationReport::new("rename", Some(1));
            report.record_success(old_key);
            return Ok(RenameOutcome {
                old_key: old_key.to_string(),
                new_key,
                report,
            });
        }

        let report = if is_folder {
            self.copy_prefix(old_key, &new_key, true, cancel).await?
        } else {
            self.rename_object(old_key, &new_key).await
        };

        info!(
            bucket = %self.bucket,
            old_key,
            new_key,
            complete = report.is_complete(),
            "renamed"
        );
        Ok(RenameOutcome {
            old_key: old_key.to_string(),
            new_key,
            report,
        })
    }

    /// Copy one object to `new_key`, then delete the original.
    async fn rename_object(&self, old_key: &str, new_key: &str) -> OperationReport {
        let mut report = OperationReport::new("rename", Some(1));
        if let Err(err) = self.store.copy_object(&self.bucket, old_key, new_key).await {
            warn!(bucket = %self.bucket, old_key, new_key, error = %err, "rename copy failed");
            report.record_failure(old_key, err);
            return report;
        }
        if let Err(err) = self.delete_object(old_key).await {
            warn!(bucket = %self.bucket, old_key, error = %err, "rename delete failed");
            report.record_failure(
                old_key,
                format!("copied to `{}` but source delete failed: {}", new_key, err),
            );
            return report;
        }
        report.objects_processed = 1;
        report.record_success(old_key);
        report
    }
}
