//! Image service for Imagebox.
//!
//! This module provides the high-level image operations:
//! - Batch upload (validate everything, then write everything or nothing)
//! - Listing and retrieval by name
//! - Deletion by ID
//! - Startup consistency audit between storage and catalog

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{LimitsConfig, StorageConfig};
use crate::db::Database;
use crate::{ImageboxError, Result};

use super::catalog::{ImageRecord, ImageRepository, NewImage};
use super::codec::{DecodeBudget, ImageCodec, ImageInfo};
use super::names::{check_safe_name, NameValidator};
use super::storage::ImageStorage;
use super::{
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_DECODE_MAX_ALLOC, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MAX_IMAGES, DEFAULT_PUBLIC_PREFIX,
};

/// One file of an upload batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name as sent by the client.
    pub name: String,
    /// File content.
    pub content: Vec<u8>,
    /// Content type as declared by the client.
    pub content_type: String,
}

impl UploadFile {
    /// Create a new upload entry with the generic binary content type.
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Set the declared content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Limits enforced on uploads.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum number of stored images.
    pub max_images: usize,
    /// Maximum size of one file in bytes.
    pub max_file_size: u64,
    /// Allowed extensions (case-insensitive, without dot).
    pub allowed_extensions: Vec<String>,
    /// Decoder memory ceiling in bytes.
    pub decode_max_alloc: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            decode_max_alloc: DEFAULT_DECODE_MAX_ALLOC,
        }
    }
}

impl From<&LimitsConfig> for UploadLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_images: config.max_images,
            max_file_size: config.max_file_size_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
            decode_max_alloc: config.decode_max_alloc_bytes(),
        }
    }
}

/// Result of a file download.
#[derive(Debug)]
pub struct DownloadResult {
    /// Image metadata.
    pub metadata: ImageRecord,
    /// File content.
    pub content: Vec<u8>,
}

/// Findings of a storage/catalog consistency audit.
#[derive(Debug, Default)]
pub struct AuditReport {
    /// Leftover temp files that were removed.
    pub removed_temp_files: usize,
    /// Stored files with no catalog record.
    pub orphan_files: Vec<String>,
    /// Catalog records whose file is missing.
    pub missing_files: Vec<ImageRecord>,
}

impl AuditReport {
    /// Whether storage and catalog agree.
    pub fn is_consistent(&self) -> bool {
        self.orphan_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Image service coordinating storage and catalog.
///
/// Cloning is cheap; clones share the same write lock.
#[derive(Clone)]
pub struct ImageService {
    db: Database,
    storage: Arc<dyn ImageStorage>,
    limits: Arc<UploadLimits>,
    codec: ImageCodec,
    decode_budget: DecodeBudget,
    public_prefix: String,
    write_lock: Arc<Mutex<()>>,
}

impl ImageService {
    /// Create a new ImageService with default limits.
    pub fn new(db: Database, storage: Arc<dyn ImageStorage>) -> Self {
        let limits = UploadLimits::default();
        Self {
            db,
            storage,
            codec: ImageCodec::new(limits.decode_max_alloc),
            decode_budget: DecodeBudget::new(limits.decode_max_alloc),
            limits: Arc::new(limits),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Set the upload limits.
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.codec = ImageCodec::new(limits.decode_max_alloc);
        self.decode_budget = DecodeBudget::new(limits.decode_max_alloc);
        self.limits = Arc::new(limits);
        self
    }

    /// Set the URL prefix used to build storage paths.
    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Apply the storage section of the configuration.
    pub fn with_storage_config(self, config: &StorageConfig) -> Self {
        self.with_public_prefix(&config.public_prefix)
    }

    /// Upload a batch of files.
    ///
    /// The batch is all-or-nothing: either every file is stored and recorded,
    /// or none is. Checks run in this order, stopping at the first failure:
    /// batch size, capacity, names, file sizes, decoding. Only then are files
    /// written.
    ///
    /// The work runs on its own task, so dropping the returned future does
    /// not interrupt a batch half way.
    ///
    /// # Returns
    /// The created records in batch order.
    pub async fn submit(&self, batch: Vec<UploadFile>) -> Result<Vec<ImageRecord>> {
        if batch.is_empty() {
            return Err(ImageboxError::EmptyBatch);
        }

        let service = self.clone();
        tokio::spawn(async move { service.submit_serialized(batch).await })
            .await
            .map_err(|e| ImageboxError::Internal(format!("upload task failed: {e}")))?
    }

    async fn submit_serialized(&self, batch: Vec<UploadFile>) -> Result<Vec<ImageRecord>> {
        let _guard = self.write_lock.lock().await;
        let repo = ImageRepository::new(self.db.pool());

        let current = usize::try_from(repo.count().await?).unwrap_or(usize::MAX);
        if current.saturating_add(batch.len()) > self.limits.max_images {
            return Err(ImageboxError::CapacityExceeded {
                current,
                incoming: batch.len(),
                max: self.limits.max_images,
            });
        }

        let existing = repo.list_names().await?;
        let candidates: Vec<&str> = batch.iter().map(|file| file.name.as_str()).collect();
        let names = NameValidator::new(&self.limits.allowed_extensions)
            .validate_batch(&candidates, &existing)?;

        for (file, name) in batch.iter().zip(&names) {
            let size = file.content.len() as u64;
            if size > self.limits.max_file_size {
                return Err(ImageboxError::FileTooLarge {
                    name: name.clone(),
                    size,
                    max: self.limits.max_file_size,
                });
            }
        }

        let batch = Arc::new(batch);
        let infos = self.decode_batch(&batch, &names).await?;

        let records = self.commit_batch(&batch, &names, &infos).await?;
        info!(
            "Stored {} image(s), catalog now holds {}",
            records.len(),
            current + records.len()
        );
        Ok(records)
    }

    /// Decode every file of the batch in parallel on the blocking pool.
    ///
    /// Each decode first reserves its pixel buffer from the shared budget, so
    /// decodes only overlap while their buffers fit under the ceiling
    /// together. All decodes run to completion; the first failure in batch
    /// order wins.
    async fn decode_batch(
        &self,
        batch: &Arc<Vec<UploadFile>>,
        names: &[String],
    ) -> Result<Vec<ImageInfo>> {
        let tasks = names.iter().enumerate().map(|(index, name)| {
            let batch = Arc::clone(batch);
            let name = name.clone();
            let codec = self.codec;
            let budget = self.decode_budget.clone();

            async move {
                let needed = codec.decoded_size(&name, &batch[index].content)?;
                let _reserved = budget.reserve(&name, needed).await?;

                tokio::task::spawn_blocking(move || codec.decode(&name, &batch[index].content))
                    .await
                    .map_err(|e| ImageboxError::Internal(format!("decode task failed: {e}")))?
            }
        });

        join_all(tasks).await.into_iter().collect()
    }

    /// Write every file and insert its record inside one transaction.
    async fn commit_batch(
        &self,
        batch: &[UploadFile],
        names: &[String],
        infos: &[ImageInfo],
    ) -> Result<Vec<ImageRecord>> {
        let mut tx = self.db.pool().begin().await?;
        let mut written: Vec<&str> = Vec::with_capacity(batch.len());
        let mut records = Vec::with_capacity(batch.len());

        for ((file, name), info) in batch.iter().zip(names).zip(infos) {
            if file.content_type != info.mime_type() {
                debug!(
                    "{} declared as {} but decoded as {}",
                    name,
                    file.content_type,
                    info.mime_type()
                );
            }

            let staged = self.stage_file(&mut tx, file, name, info, &mut written).await;
            match staged {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Failed to store {}: {}; rolling back batch", name, e);
                    let rolled_back = self.roll_back(tx, &written).await;
                    return Err(write_failure(name, &e, rolled_back));
                }
            }
        }

        if let Err(e) = tx.commit().await {
            error!("Failed to commit batch: {}", e);
            self.remove_files(&written);
            let name = names.last().cloned().unwrap_or_default();
            return Err(ImageboxError::PartialWriteFailure {
                name,
                reason: e.to_string(),
            });
        }

        Ok(records)
    }

    async fn stage_file<'b>(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        file: &UploadFile,
        name: &'b str,
        info: &ImageInfo,
        written: &mut Vec<&'b str>,
    ) -> Result<ImageRecord> {
        self.storage.write(name, &file.content)?;
        written.push(name);

        let new_image = NewImage::new(
            name,
            self.storage_path(name),
            info.width,
            info.height,
            file.content.len() as u64,
        )
        .with_content_type(&file.content_type);

        ImageRepository::create_in(tx, &new_image).await
    }

    /// Undo a failed batch: drop its records, then remove its files.
    ///
    /// If the records cannot be dropped the files stay in place and the error
    /// is returned, so no record is ever left without its file.
    async fn roll_back(&self, tx: Transaction<'static, Sqlite>, written: &[&str]) -> Result<()> {
        if let Err(e) = tx.rollback().await {
            error!("Failed to roll back catalog changes: {}", e);
            return Err(e.into());
        }

        self.remove_files(written);
        Ok(())
    }

    fn remove_files(&self, names: &[&str]) {
        for name in names {
            match self.storage.delete(name) {
                Ok(_) => debug!("Removed {} during rollback", name),
                Err(e) => error!("Failed to remove {} during rollback: {}", name, e),
            }
        }
    }

    fn storage_path(&self, name: &str) -> String {
        format!("{}/{}", self.public_prefix, name)
    }

    /// List all images.
    pub async fn list(&self) -> Result<Vec<ImageRecord>> {
        ImageRepository::new(self.db.pool()).list_all().await
    }

    /// Retrieve a stored image by its exact file name.
    ///
    /// The name is checked for traversal before anything is looked up.
    pub async fn retrieve(&self, name: &str) -> Result<DownloadResult> {
        check_safe_name(name)?;

        let metadata = ImageRepository::new(self.db.pool())
            .get_by_name(name)
            .await?
            .ok_or_else(|| ImageboxError::NotFound(format!("image {name}")))?;

        let content = self.storage.read(&metadata.file_name)?;

        Ok(DownloadResult { metadata, content })
    }

    /// Delete an image by ID.
    ///
    /// The file goes first and is best-effort; the record is removed even if
    /// the file could not be.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let service = self.clone();
        tokio::spawn(async move { service.delete_serialized(id).await })
            .await
            .map_err(|e| ImageboxError::Internal(format!("delete task failed: {e}")))?
    }

    async fn delete_serialized(&self, id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let repo = ImageRepository::new(self.db.pool());

        let record = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ImageboxError::NotFound(format!("image {id}")))?;

        match self.storage.delete(&record.file_name) {
            Ok(true) => debug!("Removed file {}", record.file_name),
            Ok(false) => warn!("File {} was already missing", record.file_name),
            Err(e) => warn!("Failed to remove file {}: {}", record.file_name, e),
        }

        if !repo.delete(id).await? {
            return Err(ImageboxError::NotFound(format!("image {id}")));
        }

        info!("Deleted image {} ({})", id, record.file_name);
        Ok(())
    }

    /// Compare storage against the catalog and log any mismatch.
    ///
    /// Leftover temp files are removed; nothing else is changed.
    pub async fn audit(&self) -> Result<AuditReport> {
        let _guard = self.write_lock.lock().await;

        let removed_temp_files = self.storage.cleanup_temp_files()?;
        if removed_temp_files > 0 {
            info!("Removed {} leftover temp file(s)", removed_temp_files);
        }

        let records = ImageRepository::new(self.db.pool()).list_all().await?;
        let recorded: HashSet<&str> = records.iter().map(|r| r.file_name.as_str()).collect();

        let orphan_files: Vec<String> = self
            .storage
            .list_names()?
            .into_iter()
            .filter(|name| !recorded.contains(name.as_str()))
            .collect();
        for name in &orphan_files {
            warn!("Stored file {} has no catalog record", name);
        }

        let missing_files: Vec<ImageRecord> = records
            .iter()
            .filter(|record| !self.storage.exists(&record.file_name))
            .cloned()
            .collect();
        for record in &missing_files {
            warn!(
                "Catalog record {} ({}) has no stored file",
                record.id, record.file_name
            );
        }

        Ok(AuditReport {
            removed_temp_files,
            orphan_files,
            missing_files,
        })
    }
}

/// Error reported for a batch whose write phase failed on `name`.
///
/// A failed catalog rollback is folded into the reason.
fn write_failure(name: &str, cause: &ImageboxError, rolled_back: Result<()>) -> ImageboxError {
    let reason = match rolled_back {
        Ok(()) => cause.to_string(),
        Err(rollback) => format!("{cause}; catalog rollback failed: {rollback}"),
    };
    ImageboxError::PartialWriteFailure {
        name: name.to_string(),
        reason,
    }
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("limits", &self.limits)
            .field("public_prefix", &self.public_prefix)
            .finish()
    }
}
