//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::dto::ImageResponse;
use super::handlers::{self, delete_image, download_image, list_images, upload_images, AppState};
use super::middleware::create_cors_layer;

/// OpenAPI document for the HTTP API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::image::upload_images,
        handlers::image::list_images,
        handlers::image::download_image,
        handlers::image::delete_image,
    ),
    components(schemas(ImageResponse)),
    tags((name = "images", description = "Image upload, listing, download and deletion"))
)]
pub struct ApiDoc;

/// Create the main router.
///
/// `public_prefix` is the URL path stored files are served under and
/// `max_request_size` caps the request body in bytes.
pub fn create_router(
    app_state: Arc<AppState>,
    cors_origins: &[String],
    public_prefix: &str,
    max_request_size: usize,
) -> Router {
    let api_routes = Router::new()
        .route("/images", get(list_images))
        .route("/images/upload", post(upload_images))
        .route("/images/:id", delete(delete_image));

    let file_route = format!("{}/:file_name", public_prefix.trim_end_matches('/'));

    Router::new()
        .nest("/api", api_routes)
        .route(&file_route, get(download_image))
        .merge(create_health_router())
        .merge(create_swagger_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(max_request_size)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health_check))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
