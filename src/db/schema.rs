//! Database schema and migrations for Imagebox.
//!
//! Migrations are applied sequentially when the catalog is first opened or
//! upgraded.

/// Database migrations.
///
/// Each migration is a SQL script executed in order. The schema_version table
/// tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Image catalog
    r#"
CREATE TABLE images (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name       TEXT NOT NULL UNIQUE COLLATE NOCASE,
    storage_path    TEXT NOT NULL,
    uploaded_at     TEXT NOT NULL,
    width           INTEGER NOT NULL CHECK (width > 0),
    height          INTEGER NOT NULL CHECK (height > 0),
    size_bytes      INTEGER NOT NULL CHECK (size_bytes >= 0),
    content_type    TEXT NOT NULL
);

CREATE INDEX idx_images_uploaded_at ON images(uploaded_at);
"#,
];
