//! Axum router construction.

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// The callback endpoint is mounted at `callback_path` for both GET
/// (verification) and POST (messages).
pub fn build(state: AppState, callback_path: &str) -> Router {
    Router::new()
        .route(
            callback_path,
            get(handlers::callback_get).post(handlers::callback_post),
        )
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}
