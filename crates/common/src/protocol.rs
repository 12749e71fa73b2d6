//! Wire-level names and request/response types of the platform callback protocol.
//!
//! The platform calls back with query parameters for the signature material and
//! a markup body for POSTs. Responses are plain markup (or the acknowledgment
//! literal) with a 200 status, whatever the outcome.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Unix timestamp supplied by the platform.
pub const PARAM_TIMESTAMP: &str = "timestamp";
/// Random nonce supplied by the platform.
pub const PARAM_NONCE: &str = "nonce";
/// Signature used on plaintext channels.
pub const PARAM_SIGNATURE: &str = "signature";
/// Signature used on encrypted channels. Its presence selects encrypted mode.
pub const PARAM_MSG_SIGNATURE: &str = "msg_signature";
/// Challenge string sent on URL verification.
pub const PARAM_ECHOSTR: &str = "echostr";
/// Informational encryption marker (`aes`). Does not select the mode by itself.
pub const PARAM_ENCRYPT_TYPE: &str = "encrypt_type";

/// Body tag carrying the base64 ciphertext of an encrypted POST.
pub const TAG_ENCRYPT: &str = "Encrypt";

/// Body returned for every acknowledged or rejected callback that has no reply.
pub const ACKNOWLEDGMENT: &str = "success";

// ---------------------------------------------------------------------------
// Inbound request
// ---------------------------------------------------------------------------

/// HTTP methods the callback endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An inbound callback as seen by the verifier, detached from any web framework.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Raw body. Empty for GET.
    pub body: Bytes,
}

impl RawRequest {
    /// A GET request with the given query parameters.
    pub fn get(query: HashMap<String, String>) -> Self {
        Self {
            method: HttpMethod::Get,
            query,
            body: Bytes::new(),
        }
    }

    /// A POST request with the given query parameters and body.
    pub fn post(query: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: HttpMethod::Post,
            query,
            body: body.into(),
        }
    }

    /// Look up a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Whether the request is on an encrypted channel.
    ///
    /// Decided solely by the presence of `msg_signature`.
    pub fn is_encrypted(&self) -> bool {
        self.query.contains_key(PARAM_MSG_SIGNATURE)
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` once the process is serving.
    pub status: String,
}
