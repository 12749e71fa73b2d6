//! WeChat callback gateway.
//!
//! Verifies inbound platform callbacks, decrypts and parses their messages,
//! and renders (and seals, on encrypted channels) the replies.

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod message;
pub mod render;
pub mod server;
pub mod telemetry;
pub mod verifier;
