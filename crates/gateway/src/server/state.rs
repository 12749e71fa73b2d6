//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::credentials::Credentials;
use crate::message::MessageHandler;
use crate::render::Renderer;
use crate::verifier::Verifier;

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-backed so that Axum can clone the state for each
/// request without copying key material.
#[derive(Clone)]
pub struct AppState {
    /// Callback verifier bound to the account credentials.
    pub verifier: Verifier,
    /// Credentials used to seal replies.
    pub credentials: Arc<Credentials>,
    /// Reply markup renderer.
    pub renderer: Arc<dyn Renderer>,
    /// Application logic deciding replies.
    pub handler: Arc<dyn MessageHandler>,
}

impl AppState {
    /// Create a new [`AppState`] around one account's credentials.
    pub fn new(
        credentials: Arc<Credentials>,
        renderer: Arc<dyn Renderer>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            verifier: Verifier::new(Arc::clone(&credentials)),
            credentials,
            renderer,
            handler,
        }
    }
}
