//! Error types for Imagebox.

use thiserror::Error;

/// Common error type for Imagebox.
///
/// Per-file variants carry the offending file name so a caller submitting
/// several files can tell which one was rejected.
#[derive(Error, Debug)]
pub enum ImageboxError {
    /// An upload batch contained no files.
    #[error("no files were submitted")]
    EmptyBatch,

    /// Accepting the batch would push the catalog above its image limit.
    #[error("image limit of {max} reached: {current} stored, {incoming} submitted")]
    CapacityExceeded {
        /// Records currently in the catalog.
        current: usize,
        /// Files in the rejected batch.
        incoming: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The file name is empty, contains a traversal segment or a separator.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// The file extension is not on the allow list.
    #[error("file {0} has an unsupported extension")]
    UnsupportedExtension(String),

    /// Two files of the same batch share a name (case-insensitive).
    #[error("more than one file in the batch is named {0}")]
    DuplicateInBatch(String),

    /// A stored image already uses this name (case-insensitive).
    #[error("a file named {0} already exists")]
    NameCollision(String),

    /// The file exceeds the configured size limit.
    #[error("file {name} is {size} bytes, the limit is {max} bytes")]
    FileTooLarge {
        /// Offending file.
        name: String,
        /// Actual size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// The bytes are not a well-formed PNG, JPEG or GIF image.
    #[error("file {0} is not a supported image or is corrupt")]
    UnsupportedOrCorruptImage(String),

    /// Decoding the file would exceed the decoder memory ceiling.
    #[error("file {0} exceeds the decoder resource limits")]
    ResourceLimitExceeded(String),

    /// Writing or committing a file failed and the batch was rolled back.
    #[error("failed to store file {name}: {reason}")]
    PartialWriteFailure {
        /// File whose write or commit failed.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// The storage target already exists, meaning the unique-name invariant was
    /// broken somewhere upstream.
    #[error("storage target {0} already exists")]
    StorageConflict(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure (e.g. a worker task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ImageboxError {
    /// The file this error refers to, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ImageboxError::InvalidName(name)
            | ImageboxError::UnsupportedExtension(name)
            | ImageboxError::DuplicateInBatch(name)
            | ImageboxError::NameCollision(name)
            | ImageboxError::UnsupportedOrCorruptImage(name)
            | ImageboxError::ResourceLimitExceeded(name)
            | ImageboxError::StorageConflict(name) => Some(name),
            ImageboxError::FileTooLarge { name, .. }
            | ImageboxError::PartialWriteFailure { name, .. } => Some(name),
            _ => None,
        }
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for ImageboxError {
    fn from(e: sqlx::Error) -> Self {
        ImageboxError::Database(e.to_string())
    }
}

/// Result type alias for Imagebox operations.
pub type Result<T> = std::result::Result<T, ImageboxError>;
