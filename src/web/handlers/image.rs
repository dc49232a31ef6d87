//! Image handlers for the HTTP API.

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::images::UploadFile;
use crate::web::dto::ImageResponse;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Multipart field carrying the uploaded files.
pub const UPLOAD_FIELD: &str = "files";

const OCTET_STREAM: &str = "application/octet-stream";

/// Build a Content-Disposition value for an attachment.
///
/// Control characters are dropped and quotes/backslashes replaced in the
/// plain `filename` parameter; non-ASCII names also get an RFC 5987
/// `filename*` parameter.
fn content_disposition_header(file_name: &str) -> String {
    let needs_escaping = |c: char| c.is_control() || c == '"' || c == '\\';

    if file_name.is_ascii() && !file_name.chars().any(needs_escaping) {
        return format!("attachment; filename=\"{file_name}\"");
    }

    let fallback: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

/// Content type to serve for a stored file.
///
/// The declared type is echoed only when it is one of the image types the
/// service accepts; anything else is served as opaque bytes.
fn served_content_type(declared: &str) -> &'static str {
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/png" => "image/png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "image/jpeg",
        "image/gif" => "image/gif",
        _ => OCTET_STREAM,
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Request body is too large")
    } else {
        tracing::warn!("Failed to read multipart data: {}", e);
        ApiError::bad_request("Invalid multipart data")
    }
}

/// POST /api/images/upload - Upload a batch of images.
///
/// Request body: multipart/form-data with one `files` part per image. The
/// batch is stored completely or not at all.
#[utoipa::path(
    post,
    path = "/api/images/upload",
    tag = "images",
    responses(
        (status = 200, description = "Images stored", body = [ImageResponse]),
        (status = 400, description = "Validation failed; the offending file is named in details.file"),
        (status = 413, description = "Request body too large"),
        (status = 500, description = "Storage failure; the batch was rolled back")
    )
)]
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut batch = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or(OCTET_STREAM).to_string();
        let content = field.bytes().await.map_err(multipart_error)?;

        batch.push(UploadFile::new(name, content.to_vec()).with_content_type(content_type));
    }

    tracing::debug!(files = batch.len(), "Upload request received");

    let records = state.service.submit(batch).await?;

    Ok(Json(records.into_iter().map(ImageResponse::from).collect()))
}

/// GET /api/images - List all images.
#[utoipa::path(
    get,
    path = "/api/images",
    tag = "images",
    responses(
        (status = 200, description = "All stored images", body = [ImageResponse])
    )
)]
pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    let records = state.service.list().await?;
    Ok(Json(records.into_iter().map(ImageResponse::from).collect()))
}

/// GET /uploads/:file_name - Download a stored image.
#[utoipa::path(
    get,
    path = "/uploads/{fileName}",
    tag = "images",
    params(
        ("fileName" = String, Path, description = "Stored file name (exact match)")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "Image not found")
    )
)]
pub async fn download_image(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let download = state.service.retrieve(&file_name).await?;
    let metadata = download.metadata;

    Response::builder()
        .header(header::CONTENT_TYPE, served_content_type(&metadata.content_type))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&metadata.file_name),
        )
        .header(header::CONTENT_LENGTH, download.content.len())
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(download.content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// DELETE /api/images/:id - Delete an image.
#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    tag = "images",
    params(
        ("id" = i64, Path, description = "Image ID")
    ),
    responses(
        (status = 204, description = "Image deleted"),
        (status = 404, description = "Image not found")
    )
)]
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
