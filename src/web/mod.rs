//! HTTP API module for Imagebox.
//!
//! This module exposes the image service over a JSON/multipart REST API,
//! plus a health check and Swagger UI.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
