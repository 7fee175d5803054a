//! Bulk selections and the outcome of multi-object operations.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Move,
    Copy,
    Delete,
}

impl BulkAction {
    pub fn needs_target(self) -> bool {
        matches!(self, BulkAction::Move | BulkAction::Copy)
    }

    pub fn deletes_source(self) -> bool {
        matches!(self, BulkAction::Move | BulkAction::Delete)
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BulkAction::Move => "move",
            BulkAction::Copy => "copy",
            BulkAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Keys picked by a caller plus what to do with them.
///
/// A key ending in `/` stands for every object under it; anything else is a
/// single object. Keys are processed in the order given.
#[derive(Clone, Debug, Deserialize)]
pub struct BulkSelection {
    pub keys: Vec<String>,
    pub action: BulkAction,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub reason: String,
}

/// What a multi-object operation managed to do before it stopped.
///
/// Nothing is rolled back: `succeeded` entries stay applied even when later
/// ones failed. `skipped` holds keys never attempted because the operation
/// aborted or was cancelled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: String,
    /// Number of keys the operation was asked to handle, when known up front.
    pub total: Option<usize>,
    pub succeeded: Vec<String>,
    pub failed: Vec<KeyFailure>,
    pub skipped: Vec<String>,
    /// Individual objects copied or deleted, folders expanded.
    pub objects_processed: usize,
    pub cancelled: bool,
}

impl OperationReport {
    pub fn new(operation: impl Into<String>, total: Option<usize>) -> Self {
        Self {
            operation: operation.into(),
            total,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, key: impl Into<String>) {
        self.succeeded.push(key.into());
    }

    pub fn record_failure(&mut self, key: impl Into<String>, reason: impl ToString) {
        self.failed.push(KeyFailure {
            key: key.into(),
            reason: reason.to_string(),
        });
    }

    pub fn skip_all<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped.extend(keys.into_iter().map(Into::into));
    }

    /// Every key succeeded and nothing was skipped or cancelled.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    /// Keys attempted so far, successful or not.
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// First failure reason, if any.
    pub fn first_failure(&self) -> Option<&KeyFailure> {
        self.failed.first()
    }

    pub fn summary(&self) -> String {
        if self.is_complete() {
            return format!(
                "{} completed: {} processed ({} objects)",
                self.operation,
                self.succeeded.len(),
                self.objects_processed
            );
        }
        let verb = if self.cancelled { "cancelled" } else { "failed" };
        match self.total {
            Some(total) => format!(
                "{} {} after {} of {} processed",
                self.operation,
                verb,
                self.processed(),
                total
            ),
            None => format!(
                "{} {} after {} processed",
                self.operation,
                verb,
                self.processed()
            ),
        }
    }
}
