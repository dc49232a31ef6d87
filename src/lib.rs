//! Imagebox - a small image hosting service.
//!
//! Clients upload batches of PNG, JPEG or GIF images. Every batch is
//! validated as a whole (capacity, names, sizes, decodability) before a
//! single byte is written, then stored all-or-nothing so that every catalog
//! record always has its file and every file its record.

pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{ImageboxError, Result};
pub use images::{
    FileStorage, ImageCodec, ImageRecord, ImageRepository, ImageService, ImageStorage,
    NameValidator, UploadFile, UploadLimits,
};
pub use web::WebServer;
