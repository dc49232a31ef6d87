//! File name sanitization and uniqueness checks.

use std::collections::HashSet;
use std::path::Path;

use crate::{ImageboxError, Result};

/// Longest accepted name in bytes, the usual file system component limit.
pub const MAX_NAME_BYTES: usize = 255;

/// Return the base name of a client-supplied file name.
///
/// Both `/` and `\` count as separators regardless of platform, so
/// `C:\photos\cat.png` and `../../cat.png` both yield `cat.png`.
pub fn base_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Check that a name is safe to use as a single path component.
///
/// No base-name extraction happens here; a name containing a separator is
/// rejected rather than shortened.
pub fn check_safe_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.len() > MAX_NAME_BYTES
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        return Err(ImageboxError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Batch name validator.
///
/// Pure: it never touches storage, so it runs as a gate before any I/O.
#[derive(Debug, Clone, Copy)]
pub struct NameValidator<'a> {
    allowed_extensions: &'a [String],
}

impl<'a> NameValidator<'a> {
    /// Create a validator accepting the given extensions (case-insensitive).
    pub fn new(allowed_extensions: &'a [String]) -> Self {
        Self { allowed_extensions }
    }

    /// Whether the name ends in one of the allowed extensions.
    pub fn has_allowed_extension(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Validate a batch of candidate names against the names already stored.
    ///
    /// Returns the sanitized names in batch order. Checks run in a fixed order:
    /// each candidate in turn is checked for a safe name, an allowed extension
    /// and duplicates earlier in the batch; only then is the batch compared
    /// against `existing`.
    pub fn validate_batch<S: AsRef<str>>(
        &self,
        candidates: &[&str],
        existing: &[S],
    ) -> Result<Vec<String>> {
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut seen = HashSet::with_capacity(candidates.len());

        for raw in candidates {
            let name = base_name(raw);
            if check_safe_name(name).is_err() {
                return Err(ImageboxError::InvalidName((*raw).to_string()));
            }

            if !self.has_allowed_extension(name) {
                return Err(ImageboxError::UnsupportedExtension(name.to_string()));
            }

            if !seen.insert(name.to_lowercase()) {
                return Err(ImageboxError::DuplicateInBatch(name.to_string()));
            }

            accepted.push(name.to_string());
        }

        let existing: HashSet<String> = existing
            .iter()
            .map(|name| name.as_ref().to_lowercase())
            .collect();

        if let Some(name) = accepted
            .iter()
            .find(|name| existing.contains(&name.to_lowercase()))
        {
            return Err(ImageboxError::NameCollision(name.clone()));
        }

        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        ["jpg", "jpeg", "png", "gif"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    const NONE: &[&str] = &[];

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("cat.png"), "cat.png");
        assert_eq!(base_name("photos/cat.png"), "cat.png");
        assert_eq!(base_name("../../etc/cat.png"), "cat.png");
        assert_eq!(base_name("C:\\Users\\me\\cat.png"), "cat.png");
        assert_eq!(base_name("dir/"), "");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn test_check_safe_name() {
        assert!(check_safe_name("cat.png").is_ok());
        assert!(check_safe_name("my photo (1).jpg").is_ok());
        assert!(check_safe_name("日本語.gif").is_ok());

        assert!(check_safe_name("").is_err());
        assert!(check_safe_name("   ").is_err());
        assert!(check_safe_name(".").is_err());
        assert!(check_safe_name("..").is_err());
        assert!(check_safe_name("a..b.png").is_err());
        assert!(check_safe_name("../cat.png").is_err());
        assert!(check_safe_name("dir/cat.png").is_err());
        assert!(check_safe_name("dir\\cat.png").is_err());
        assert!(check_safe_name("cat\0.png").is_err());
        assert!(check_safe_name("cat\n.png").is_err());
    }

    #[test]
    fn test_check_safe_name_length() {
        let longest = format!("{}.png", "a".repeat(MAX_NAME_BYTES - 4));
        assert!(check_safe_name(&longest).is_ok());

        let too_long = format!("{}.png", "a".repeat(300));
        assert!(matches!(
            check_safe_name(&too_long),
            Err(ImageboxError::InvalidName(_))
        ));

        // Multi-byte characters count by encoded length
        let wide = format!("{}.png", "猫".repeat(85));
        assert!(wide.chars().count() < MAX_NAME_BYTES);
        assert!(check_safe_name(&wide).is_err());
    }

    #[test]
    fn test_has_allowed_extension() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        assert!(validator.has_allowed_extension("a.jpg"));
        assert!(validator.has_allowed_extension("a.JPEG"));
        assert!(validator.has_allowed_extension("a.Png"));
        assert!(validator.has_allowed_extension("archive.tar.gif"));
        assert!(!validator.has_allowed_extension("a.webp"));
        assert!(!validator.has_allowed_extension("a"));
        assert!(!validator.has_allowed_extension(".png"));
    }

    #[test]
    fn test_validate_batch_strips_directories() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let names = validator
            .validate_batch(&["photos/a.jpg", "..\\b.png"], NONE)
            .unwrap();

        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_validate_batch_keeps_order() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let names = validator
            .validate_batch(&["c.gif", "a.jpg", "b.png"], &["z.png"])
            .unwrap();

        assert_eq!(names, vec!["c.gif", "a.jpg", "b.png"]);
    }

    #[test]
    fn test_validate_batch_invalid_name() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let result = validator.validate_batch(&["ok.png", "dir/"], NONE);
        assert!(matches!(result, Err(ImageboxError::InvalidName(n)) if n == "dir/"));

        let result = validator.validate_batch(&["a..b.png"], NONE);
        assert!(matches!(result, Err(ImageboxError::InvalidName(_))));
    }

    #[test]
    fn test_validate_batch_unsupported_extension() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let result = validator.validate_batch(&["a.png", "notes.txt"], NONE);
        assert!(matches!(result, Err(ImageboxError::UnsupportedExtension(n)) if n == "notes.txt"));
    }

    #[test]
    fn test_validate_batch_duplicate_case_insensitive() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let result = validator.validate_batch(&["a.jpg", "A.JPG"], NONE);
        assert!(matches!(result, Err(ImageboxError::DuplicateInBatch(n)) if n == "A.JPG"));
    }

    #[test]
    fn test_validate_batch_duplicate_after_stripping() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let result = validator.validate_batch(&["x/a.jpg", "y/a.jpg"], NONE);
        assert!(matches!(result, Err(ImageboxError::DuplicateInBatch(n)) if n == "a.jpg"));
    }

    #[test]
    fn test_validate_batch_collision_case_insensitive() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        let result = validator.validate_batch(&["new.png", "Cat.PNG"], &["cat.png"]);
        assert!(matches!(result, Err(ImageboxError::NameCollision(n)) if n == "Cat.PNG"));
    }

    #[test]
    fn test_duplicates_reported_before_collisions() {
        let exts = extensions();
        let validator = NameValidator::new(&exts);

        // "cat.png" collides with storage, but the later in-batch duplicate wins
        let result = validator.validate_batch(&["cat.png", "dog.png", "DOG.png"], &["cat.png"]);
        assert!(matches!(result, Err(ImageboxError::DuplicateInBatch(_))));
    }
}
