//! Route modules for the OCR server

pub mod cleanup;
pub mod health;
pub mod model;
pub mod ocr;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Headroom above the upload limit for multipart framing and text fields.
/// Oversized files must reach the pipeline to be rejected with a proper error.
const BODY_LIMIT_HEADROOM: usize = 1024 * 1024;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_file_size = usize::try_from(state.config().limits.max_file_size).unwrap_or(usize::MAX);
    let body_limit = max_file_size
        .saturating_mul(2)
        .saturating_add(BODY_LIMIT_HEADROOM);

    let api = Router::new()
        .merge(model::router())
        .merge(ocr::router())
        .merge(cleanup::router());

    Router::new()
        .merge(health::router())
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
