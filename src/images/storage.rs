//! File storage for Imagebox.
//!
//! Files are stored flat under a single upload directory, keyed by their
//! sanitized name:
//! ```text
//! {base_path}/
//! ├── cat.png
//! ├── holiday.jpg
//! └── .imagebox-<uuid>.tmp   (in-flight write, removed on completion)
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::names::check_safe_name;
use crate::{ImageboxError, Result};

const TEMP_PREFIX: &str = ".imagebox-";
const TEMP_SUFFIX: &str = ".tmp";

/// Storage backend for image bytes.
///
/// Names passed in are already sanitized single path components.
pub trait ImageStorage: Send + Sync {
    /// Write `content` under `name` and return where it landed, failing with
    /// [`ImageboxError::StorageConflict`] if the name is taken.
    fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf>;

    /// Read the bytes stored under `name`.
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete `name`. Returns `false` if it did not exist.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Check if `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// List every stored name (temp files excluded).
    fn list_names(&self) -> Result<Vec<String>>;

    /// Remove leftovers of interrupted writes. Returns how many were removed.
    fn cleanup_temp_files(&self) -> Result<usize>;
}

/// Filesystem storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Base directory for file storage.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the full file path for a stored name.
    pub fn get_file_path(&self, name: &str) -> Result<PathBuf> {
        check_safe_name(name)?;
        Ok(self.base_path.join(name))
    }

    fn is_temp_name(name: &str) -> bool {
        name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
    }

    fn write_temp(path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = File::options().write(true).create_new(true).open(path)?;
        file.write_all(content)?;
        file.sync_all()
    }
}

impl ImageStorage for FileStorage {
    /// The content goes to a temp file first and is linked into place only
    /// once fully written, so a reader never sees a partial file. Linking
    /// fails if the target exists, which makes the no-overwrite check atomic.
    fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let target = self.get_file_path(name)?;
        let temp = self
            .base_path
            .join(format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", Uuid::new_v4()));

        let result = Self::write_temp(&temp, content).and_then(|()| fs::hard_link(&temp, &target));

        if let Err(e) = fs::remove_file(&temp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove temp file {:?}: {}", temp, e);
            }
        }

        match result {
            Ok(()) => {
                debug!("Stored {} ({} bytes)", name, content.len());
                Ok(target)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(ImageboxError::StorageConflict(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let file_path = self.get_file_path(name)?;

        match fs::read(&file_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ImageboxError::NotFound(format!("file {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let file_path = self.get_file_path(name)?;

        match fs::remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.get_file_path(name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if !Self::is_temp_name(&name) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    fn cleanup_temp_files(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.base_path)?.flatten() {
            let is_temp = entry
                .file_name()
                .to_str()
                .map(Self::is_temp_name)
                .unwrap_or(false);

            if is_temp && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("uploads")).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_new_creates_directory() {
        let (_temp_dir, storage) = setup();
        assert!(storage.base_path().is_dir());
    }

    #[test]
    fn test_write_and_read() {
        let (_temp_dir, storage) = setup();

        let path = storage.write("cat.png", b"meow").unwrap();

        assert_eq!(path, storage.base_path().join("cat.png"));
        assert!(storage.exists("cat.png"));
        assert_eq!(storage.read("cat.png").unwrap(), b"meow");
        assert_eq!(
            fs::read(storage.base_path().join("cat.png")).unwrap(),
            b"meow"
        );
    }

    #[test]
    fn test_write_never_overwrites() {
        let (_temp_dir, storage) = setup();

        storage.write("cat.png", b"first").unwrap();
        let result = storage.write("cat.png", b"second");

        assert!(matches!(result, Err(ImageboxError::StorageConflict(n)) if n == "cat.png"));
        assert_eq!(storage.read("cat.png").unwrap(), b"first");
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let (_temp_dir, storage) = setup();

        storage.write("a.png", b"a").unwrap();
        let _ = storage.write("a.png", b"again");

        let entries: Vec<_> = fs::read_dir(storage.base_path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["a.png"]);
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let (_temp_dir, storage) = setup();

        assert!(matches!(
            storage.write("../escape.png", b"x"),
            Err(ImageboxError::InvalidName(_))
        ));
        assert!(matches!(
            storage.read("..\\escape.png"),
            Err(ImageboxError::InvalidName(_))
        ));
        assert!(!storage.exists("../escape.png"));
    }

    #[test]
    fn test_read_not_found() {
        let (_temp_dir, storage) = setup();
        let result = storage.read("missing.png");
        assert!(matches!(result, Err(ImageboxError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let (_temp_dir, storage) = setup();

        storage.write("cat.png", b"meow").unwrap();

        assert!(storage.delete("cat.png").unwrap());
        assert!(!storage.exists("cat.png"));

        // Deleting again is not an error
        assert!(!storage.delete("cat.png").unwrap());
    }

    #[test]
    fn test_list_names_skips_temp_files() {
        let (_temp_dir, storage) = setup();

        storage.write("b.png", b"b").unwrap();
        storage.write("a.jpg", b"a").unwrap();
        fs::write(storage.base_path().join(".imagebox-stale.tmp"), b"partial").unwrap();
        fs::create_dir(storage.base_path().join("subdir")).unwrap();

        assert_eq!(storage.list_names().unwrap(), vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_cleanup_temp_files() {
        let (_temp_dir, storage) = setup();

        storage.write("keep.png", b"k").unwrap();
        fs::write(storage.base_path().join(".imagebox-1.tmp"), b"x").unwrap();
        fs::write(storage.base_path().join(".imagebox-2.tmp"), b"y").unwrap();

        assert_eq!(storage.cleanup_temp_files().unwrap(), 2);
        assert_eq!(storage.cleanup_temp_files().unwrap(), 0);
        assert!(storage.exists("keep.png"));
    }
}
