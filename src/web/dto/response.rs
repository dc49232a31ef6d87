//! Response DTOs for the HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::images::ImageRecord;

/// A stored image as returned by the API.
///
/// Field names follow the camelCase shape the browser client expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    /// Image ID.
    pub id: i64,
    /// Stored file name.
    pub file_name: String,
    /// Path under which the file is served.
    pub file_path: String,
    /// Upload time (RFC 3339).
    pub upload_date: String,
    /// Width in pixels.
    pub width: i64,
    /// Height in pixels.
    pub height: i64,
    /// Size in bytes.
    pub file_size: i64,
    /// Content type declared at upload.
    pub content_type: String,
}

impl From<ImageRecord> for ImageResponse {
    fn from(record: ImageRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name,
            file_path: record.storage_path,
            upload_date: record.uploaded_at,
            width: record.width,
            height: record.height,
            file_size: record.size_bytes,
            content_type: record.content_type,
        }
    }
}
