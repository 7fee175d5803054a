//! Core data models for the hierarchical namespace view.
//!
//! Object stores only know flat keys. These types carry the folder
//! convention (`/`-terminated prefixes) and the outcome of multi-object
//! operations. They serialize naturally as JSON via `serde`.

pub mod entry;
pub mod operation;

pub use entry::Listing;
pub use operation::{BulkAction, BulkSelection, OperationReport};
