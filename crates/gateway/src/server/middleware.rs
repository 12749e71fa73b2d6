//! Axum middleware settings applied to the router.
//!
//! Includes request tracing, timeout enforcement, and response compression.

use std::time::Duration;

/// Per-request timeout applied to all routes. The platform gives up on a
/// callback after five seconds and retries.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
