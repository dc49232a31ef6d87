//! Image catalog types and repository.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::{ImageboxError, Result};

const SELECT_COLUMNS: &str =
    "id, file_name, storage_path, uploaded_at, width, height, size_bytes, content_type";

/// A stored image as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ImageRecord {
    /// Unique image ID.
    pub id: i64,
    /// Sanitized file name (unique, case-insensitive).
    pub file_name: String,
    /// Public path under which the file is served.
    pub storage_path: String,
    /// Upload time (RFC 3339, UTC).
    pub uploaded_at: String,
    /// Width in pixels.
    pub width: i64,
    /// Height in pixels.
    pub height: i64,
    /// File size in bytes.
    pub size_bytes: i64,
    /// Content type declared by the client.
    pub content_type: String,
}

/// Data for creating a new image record.
#[derive(Debug, Clone)]
pub struct NewImage {
    /// Sanitized file name.
    pub file_name: String,
    /// Public path.
    pub storage_path: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Declared content type.
    pub content_type: String,
}

impl NewImage {
    /// Create a new image record stamped with the current time.
    pub fn new(
        file_name: impl Into<String>,
        storage_path: impl Into<String>,
        width: u32,
        height: u32,
        size_bytes: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            storage_path: storage_path.into(),
            uploaded_at: Utc::now(),
            width,
            height,
            size_bytes,
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the upload time.
    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = uploaded_at;
        self
    }
}

/// Repository for image catalog operations.
pub struct ImageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ImageRepository<'a> {
    /// Create a new ImageRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a record.
    pub async fn create(&self, image: &NewImage) -> Result<ImageRecord> {
        let mut conn = self.pool.acquire().await?;
        Self::create_in(&mut conn, image).await
    }

    /// Insert a record on an existing connection, typically an open transaction.
    pub async fn create_in(conn: &mut SqliteConnection, image: &NewImage) -> Result<ImageRecord> {
        let size_bytes = i64::try_from(image.size_bytes)
            .map_err(|_| ImageboxError::Internal(format!("size of {} overflows", image.file_name)))?;

        let query = format!(
            "INSERT INTO images
                (file_name, storage_path, uploaded_at, width, height, size_bytes, content_type)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {SELECT_COLUMNS}"
        );

        let record = sqlx::query_as::<_, ImageRecord>(&query)
            .bind(&image.file_name)
            .bind(&image.storage_path)
            .bind(image.uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true))
            .bind(i64::from(image.width))
            .bind(i64::from(image.height))
            .bind(size_bytes)
            .bind(&image.content_type)
            .fetch_one(conn)
            .await?;

        Ok(record)
    }

    /// Get a record by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ImageRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM images WHERE id = ?");
        let record = sqlx::query_as::<_, ImageRecord>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// Get a record by its exact (case-sensitive) file name.
    pub async fn get_by_name(&self, file_name: &str) -> Result<Option<ImageRecord>> {
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM images WHERE file_name = ? COLLATE BINARY");
        let record = sqlx::query_as::<_, ImageRecord>(&query)
            .bind(file_name)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// List all records in upload order.
    pub async fn list_all(&self) -> Result<Vec<ImageRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM images ORDER BY id");
        let records = sqlx::query_as::<_, ImageRecord>(&query)
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    /// List all stored file names.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT file_name FROM images ORDER BY id")
            .fetch_all(self.pool)
            .await?;

        Ok(names)
    }

    /// Count records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a record by ID.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
