//! The namespace layer: folder-style operations over a flat object store.
//!
//! Everything hangs off [`namespace_service::NamespaceService`], an explicit
//! context (store handle, bucket, walk pacing) handed to every call. The
//! remaining modules add its multi-object operations.

pub mod bulk;
pub mod namespace_service;
pub mod pager;
pub mod prefix_copier;
pub mod rename;
