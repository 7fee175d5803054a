//! HTTP handlers for the folder view of the bucket.
//! Object bodies are streamed straight from the store and never buffered;
//! everything else is delegated to `NamespaceService`.

use super::AppState;
use crate::{
    errors::AppError,
    models::{
        BulkAction, BulkSelection, Listing, OperationReport,
        entry::{basename, normalize_prefix},
    },
    services::{namespace_service::ListOptions, rename::RenameOutcome},
    store::ObjectBody,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query params for `GET /api/list`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub token: Option<String>,
    /// Kept as text so a non-numeric value falls back to the default.
    pub max: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
    #[serde(default)]
    pub prefix: String,
    pub folder: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameReq {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    pub key: String,
    pub ttl: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ObjectQuery {
    pub download: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub uploaded: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub key: String,
    pub url: String,
}

/// Report plus its one-line summary.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub summary: String,
    #[serde(flatten)]
    pub report: OperationReport,
}

impl From<OperationReport> for OperationResponse {
    fn from(report: OperationReport) -> Self {
        Self {
            summary: report.summary(),
            report,
        }
    }
}

/// GET `/api/list`: one page of folders and files under `?prefix=`.
pub async fn list_prefix(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<Listing> {
    let prefix = normalize_prefix(q.prefix.as_deref().unwrap_or_default().trim());
    let options = ListOptions::from_raw(q.token, q.max.as_deref(), q.q);
    Json(state.namespace.list(&prefix, options).await)
}

/// POST `/api/folders`: create an empty folder marker.
pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderReq>,
) -> Result<impl IntoResponse, AppError> {
    let key = state
        .namespace
        .create_folder(&req.prefix, &req.folder)
        .await?;
    Ok((StatusCode::CREATED, Json(KeyResponse { key })))
}

/// POST `/api/upload`: multipart form with an optional `prefix` field and
/// one or more file fields.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut prefix = String::new();
    let mut files: Vec<(String, Option<String>, Bytes)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed upload: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        match (name.as_deref(), file_name) {
            (_, Some(file_name)) => {
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("reading {}: {}", file_name, err))
                })?;
                files.push((file_name, content_type, data));
            }
            (Some("prefix"), None) => {
                prefix = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading prefix: {}", err)))?;
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AppError::bad_request("no files in upload"));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for (file_name, content_type, data) in files {
        let key = state
            .namespace
            .upload(prefix.trim(), &file_name, data, content_type)
            .await?;
        uploaded.push(key);
    }
    Ok((StatusCode::CREATED, Json(UploadResponse { uploaded })))
}

/// POST `/api/bulk`: move, copy or delete a selection.
///
/// Partial failure is still a 200; the body says which keys failed.
pub async fn bulk_action(
    State(state): State<AppState>,
    Json(selection): Json<BulkSelection>,
) -> Result<Json<OperationResponse>, AppError> {
    let cancel = state.shutdown.child_token();
    let report = state.namespace.execute_bulk(selection, &cancel).await?;
    Ok(Json(report.into()))
}

/// POST `/api/rename`: rename a file or folder.
pub async fn rename_entry(
    State(state): State<AppState>,
    Json(req): Json<RenameReq>,
) -> Result<Json<RenameOutcome>, AppError> {
    let cancel = state.shutdown.child_token();
    let outcome = state.namespace.rename(&req.old, &req.new, &cancel).await?;
    Ok(Json(outcome))
}

/// GET `/api/presign?key=&ttl=`: time-limited download URL.
pub async fn presign_object(
    State(state): State<AppState>,
    Query(q): Query<PresignQuery>,
) -> Result<Json<PresignResponse>, AppError> {
    let url = state.namespace.presign(&q.key, q.ttl).await?;
    Ok(Json(PresignResponse { key: q.key, url }))
}

/// GET `/api/objects/{*key}`: stream an object, as an attachment with
/// `?download=1`.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let body = state.namespace.stream(&key).await?;
    let download = q
        .download
        .as_deref()
        .is_some_and(|v| !matches!(v, "0" | "false"));

    let mut headers = HeaderMap::new();
    set_object_headers(&mut headers, &body, &key, download);
    debug!(key, download, "serving object");

    let mut response = Response::new(Body::from_stream(body.stream));
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    Ok(response)
}

/// DELETE `/api/objects/{*key}`: delete one file, or a whole folder when
/// the key ends in `/`.
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<OperationResponse>, AppError> {
    let selection = BulkSelection {
        keys: vec![key],
        action: BulkAction::Delete,
        target: None,
    };
    let cancel = state.shutdown.child_token();
    let report = state.namespace.execute_bulk(selection, &cancel).await?;
    Ok(Json(report.into()))
}

fn set_object_headers(headers: &mut HeaderMap, body: &ObjectBody, key: &str, download: bool) {
    // Fall back to the key's extension when the store has no content type.
    let content_type = body.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string()
    });
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    if let Some(length) = body.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    if download {
        let disposition = format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(basename(key))
        );
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
}
