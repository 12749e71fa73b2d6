//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with the callback route, health check and middleware.
//! - Translate HTTP requests into [`common::RawRequest`]s for the verifier.
//! - Answer every callback with 200, whatever the verification outcome.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
