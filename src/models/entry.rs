//! Namespace entries: files, synthesized folders and the listing that holds them.
//!
//! A folder is a key prefix ending in [`DELIMITER`]. It may be backed by an
//! empty marker object or be purely virtual; either way the suffix convention
//! lives in [`is_folder_key`] and nowhere else.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Separator between path segments of a key.
pub const DELIMITER: &str = "/";

/// True when `key` names a folder rather than a single object.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with(DELIMITER)
}

/// Append the delimiter to a non-empty prefix that lacks one.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || is_folder_key(prefix) {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, DELIMITER)
    }
}

/// Last path segment of a key, without the trailing delimiter for folders.
///
/// `reports/2023/` yields `2023`, `reports/2023/jan.csv` yields `jan.csv`.
pub fn basename(key: &str) -> &str {
    let trimmed = key.strip_suffix(DELIMITER).unwrap_or(key);
    match trimmed.rfind(DELIMITER) {
        Some(pos) => &trimmed[pos + DELIMITER.len()..],
        None => trimmed,
    }
}

/// Everything up to and including the delimiter before the last segment.
///
/// Empty for keys that sit at the bucket root.
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.strip_suffix(DELIMITER).unwrap_or(key);
    match trimmed.rfind(DELIMITER) {
        Some(pos) => &trimmed[..pos + DELIMITER.len()],
        None => "",
    }
}

/// One "file" row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    pub key: String,
    /// Key relative to the listed prefix.
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A folder synthesized from a common prefix; no single store record backs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub prefix: String,
    pub name: String,
}

/// An immediate child of a listed prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NamespaceEntry {
    File(ObjectEntry),
    Folder(FolderEntry),
}

impl NamespaceEntry {
    pub fn file(
        key: String,
        parent: &str,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let name = key.strip_prefix(parent).unwrap_or(&key).to_string();
        NamespaceEntry::File(ObjectEntry {
            key,
            name,
            size,
            last_modified,
        })
    }

    pub fn folder(prefix: String, parent: &str) -> Self {
        let name = prefix
            .strip_prefix(parent)
            .unwrap_or(&prefix)
            .trim_end_matches(DELIMITER)
            .to_string();
        NamespaceEntry::Folder(FolderEntry { prefix, name })
    }

    /// Case-insensitive substring match against the full object key, or
    /// the full prefix for a folder.
    pub fn matches(&self, needle_lower: &str) -> bool {
        let haystack = match self {
            NamespaceEntry::File(file) => &file.key,
            NamespaceEntry::Folder(folder) => &folder.prefix,
        };
        needle_lower.is_empty() || haystack.to_lowercase().contains(needle_lower)
    }
}

/// One step of the path leading to the listed prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub prefix: String,
}

impl Breadcrumb {
    /// `a/b/` becomes `Root -> a -> b`, each crumb carrying its own prefix.
    pub fn trail(prefix: &str) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            name: "Root".into(),
            prefix: String::new(),
        }];
        let mut current = String::new();
        for part in prefix.split(DELIMITER).filter(|p| !p.is_empty()) {
            current.push_str(part);
            current.push_str(DELIMITER);
            crumbs.push(Breadcrumb {
                name: part.to_string(),
                prefix: current.clone(),
            });
        }
        crumbs
    }
}

/// One page of immediate children under `prefix`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Listing {
    pub prefix: String,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<ObjectEntry>,
    pub continuation_token: Option<String>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub folder_count: usize,
    pub file_count: usize,
    /// Sum of the sizes of `files` on this page.
    pub total_size: u64,
    pub latest_modified: Option<DateTime<Utc>>,
}

impl Listing {
    /// A listing with no children, used when the backend could not be read.
    pub fn empty(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            breadcrumbs: Breadcrumb::trail(prefix),
            ..Default::default()
        }
    }

    /// Build a listing from entries already filtered for this page.
    ///
    /// The folder's own marker object (key equal to `prefix`) never shows up
    /// as a file.
    pub fn from_entries(
        prefix: &str,
        entries: impl IntoIterator<Item = NamespaceEntry>,
        continuation_token: Option<String>,
    ) -> Self {
        let mut listing = Self::empty(prefix);
        listing.continuation_token = continuation_token;

        for entry in entries {
            match entry {
                NamespaceEntry::Folder(folder) => listing.folders.push(folder),
                NamespaceEntry::File(file) if file.key == prefix => {}
                NamespaceEntry::File(file) => {
                    listing.total_size += file.size;
                    if file.last_modified > listing.latest_modified {
                        listing.latest_modified = file.last_modified;
                    }
                    listing.files.push(file);
                }
            }
        }

        listing.folder_count = listing.folders.len();
        listing.file_count = listing.files.len();
        listing
    }
}
