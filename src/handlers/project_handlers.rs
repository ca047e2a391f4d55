//! HTTP handlers for the project catalog.
//! Thin translation between the wire and `CatalogService`; object bodies
//! are streamed on the way out to avoid buffering in memory.

use crate::{
    errors::AppError,
    models::{object::StoredObject, project::Project},
    services::catalog_service::{CatalogService, UploadRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Query params carried by a signed download link.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET `/projects` — the catalog listing as a JSON array.
pub async fn list_projects(
    State(catalog): State<CatalogService>,
) -> Result<Json<Vec<Project>>, AppError> {
    let projects = catalog.list().await?;
    Ok(Json(projects))
}

/// POST `/projects` — accept a multipart upload with fields `name`,
/// `description`, and `file` (the archive itself).
pub async fn upload_project(
    State(catalog): State<CatalogService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut name = None;
    let mut description = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "name" => name = Some(field.text().await.map_err(bad_multipart)?),
            "description" => description = Some(field.text().await.map_err(bad_multipart)?),
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::bad_request("file field is missing a filename"))?;
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file
        .ok_or_else(|| AppError::bad_request("select a zip or rar archive to upload"))?;

    let key = catalog
        .upload(
            UploadRequest {
                name,
                description,
                file_name,
                bytes,
            },
            |percent| debug!("upload progress: {:.0}%", percent),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "fileName": key }))))
}

/// POST `/projects/{file_name}/download` — count the download event and
/// redirect to a fresh signed link.
pub async fn download_project(
    State(catalog): State<CatalogService>,
    Path(file_name): Path<String>,
) -> Result<Redirect, AppError> {
    let url = catalog.download(&file_name).await?;
    Ok(Redirect::to(&url))
}

/// GET `/files/{file_name}?expires&signature` — verify the signed link and
/// stream the archive payload.
pub async fn fetch_file(
    State(catalog): State<CatalogService>,
    Path(file_name): Path<String>,
    Query(link): Query<SignedLinkQuery>,
) -> Result<Response, AppError> {
    if !catalog
        .store
        .verify_signed_link(&file_name, link.expires, &link.signature)
    {
        return Err(AppError::forbidden("download link is invalid or has expired"));
    }

    let (object, payload) = catalog.store.object_reader(&file_name).await?;
    let body = Body::from_stream(ReaderStream::new(payload));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_archive_headers(response.headers_mut(), &object);
    Ok(response)
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::bad_request(format!("invalid multipart request: {err}"))
}

fn set_archive_headers(headers: &mut HeaderMap, object: &StoredObject) {
    let content_type = if object.key.ends_with(".zip") {
        "application/zip"
    } else if object.key.ends_with(".rar") {
        "application/vnd.rar"
    } else {
        "application/octet-stream"
    };
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&object.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    // keys are validated at write time, so the quoted filename stays sane
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", object.key))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Some(etag) = object.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&object.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
