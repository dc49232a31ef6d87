//! Web server for Imagebox.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::images::ImageService;
use crate::{ImageboxError, Result};

use super::handlers::AppState;
use super::router::create_router;

/// HTTP server for the image API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// CORS allowed origins.
    cors_origins: Vec<String>,
    /// URL prefix stored files are served under.
    public_prefix: String,
    /// Request body limit in bytes.
    max_request_size: usize,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, service: ImageService) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| {
                ImageboxError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.server.host, config.server.port
                ))
            })?;

        let max_request_size = usize::try_from(config.server.max_request_size_bytes())
            .unwrap_or(usize::MAX);

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(service)),
            cors_origins: config.server.cors_origins.clone(),
            public_prefix: config.storage.public_prefix.clone(),
            max_request_size,
        })
    }

    /// Build the router this server serves.
    pub fn router(&self) -> Router {
        create_router(
            Arc::clone(&self.app_state),
            &self.cors_origins,
            &self.public_prefix,
            self.max_request_size,
        )
    }

    /// Run the web server until it fails.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
