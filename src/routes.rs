use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/joke", get(handlers::get_joke))
        .route("/joke/add", post(handlers::add_joke))
        .route("/joke/update", put(handlers::update_joke))
        .route("/joke/upsert", put(handlers::upsert_joke))
        .route("/joke/delete/{id}", delete(handlers::delete_joke))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
