//! Defines routes for the folder-style file manager API.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Browsing**
//!   - `GET    /api/list`           - one page of a folder (prefix, token, max, q)
//!   - `GET    /api/presign`        - presigned download URL (key, ttl)
//!   - `GET    /api/objects/{*key}` - stream an object (`?download=1` for attachment)
//!
//! - **Mutations**
//!   - `POST   /api/folders`        - create folder
//!   - `POST   /api/upload`         - multipart upload
//!   - `POST   /api/rename`         - rename file or folder
//!   - `POST   /api/bulk`           - move / copy / delete a selection
//!   - `DELETE /api/objects/{*key}` - delete a file, or a folder when `key` ends in `/`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    namespace_handlers::{
        bulk_action, create_folder, delete_entry, get_object, list_prefix, presign_object,
        rename_entry, upload_files,
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Largest multipart upload accepted in one request.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Build the router; state is supplied by the caller via `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/list", get(list_prefix))
        .route("/api/presign", get(presign_object))
        .route("/api/folders", post(create_folder))
        .route(
            "/api/upload",
            post(upload_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/rename", post(rename_entry))
        .route("/api/bulk", post(bulk_action))
        .route("/api/objects/{*key}", get(get_object).delete(delete_entry))
}
