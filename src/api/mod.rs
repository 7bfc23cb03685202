pub mod auth;
pub mod bulk_upload;
pub mod cart;
pub mod categories;
pub mod extractors;
pub mod merchants;
pub mod orders;
pub mod products;
pub mod users;

use axum::Router;

use crate::config::CONFIG;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new().nest("/api", api_routes(state))
}

/// API routes under /api/*
fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/version", axum::routing::get(get_version))
        .nest("/auth", auth::auth_routes(state.clone()))
        .nest("/users", users::users_routes(state.clone()))
        .nest("/categories", categories::categories_routes(state.clone()))
        .nest("/products", products::products_routes(state.clone()))
        .nest("/merchants", merchants::merchants_routes(state.clone()))
        .nest("/cart", cart::cart_routes(state.clone()))
        .nest("/orders", orders::orders_routes(state.clone()))
        .nest("/bulk-upload", bulk_upload::bulk_upload_routes(state))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "version": CONFIG.version,
        "backend": "rust"
    }))
}
