//! API handlers.

pub mod image;

pub use image::*;

use crate::images::ImageService;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Image service.
    pub service: ImageService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: ImageService) -> Self {
        Self { service }
    }
}
