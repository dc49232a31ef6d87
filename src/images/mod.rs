//! Image management module for Imagebox.
//!
//! This module provides the upload validation and storage pipeline:
//! - File name sanitization and uniqueness checks
//! - Format-sniffing decode to extract dimensions
//! - Atomic file storage with no silent overwrites
//! - Image catalog (metadata) persistence
//! - The upload service pairing stored files with catalog records

mod catalog;
mod codec;
mod names;
mod service;
mod storage;

pub use catalog::{ImageRecord, ImageRepository, NewImage};
pub use codec::{DecodeBudget, ImageCodec, ImageInfo, SUPPORTED_FORMATS};
pub use names::{base_name, check_safe_name, NameValidator, MAX_NAME_BYTES};
pub use service::{AuditReport, DownloadResult, ImageService, UploadFile, UploadLimits};
pub use storage::{FileStorage, ImageStorage};

/// Default maximum number of stored images.
pub const DEFAULT_MAX_IMAGES: usize = 10;

/// Default maximum file size (3MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 3 * 1024 * 1024;

/// Default decoder memory ceiling (256MB).
pub const DEFAULT_DECODE_MAX_ALLOC: u64 = 256 * 1024 * 1024;

/// Extensions accepted by default (lowercase, without dot).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Default URL prefix for stored files.
pub const DEFAULT_PUBLIC_PREFIX: &str = "/uploads";
