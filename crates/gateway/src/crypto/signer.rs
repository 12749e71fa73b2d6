//! SHA-1 signatures over an unordered set of strings.
//!
//! The platform signs `sha1(sorted(token, timestamp, nonce[, ciphertext]).join(""))`
//! and sends the lowercase hex digest. Sorting makes the digest independent of
//! the order the parts are supplied in.

use std::time::{SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Compute the lowercase hex signature of `parts`.
pub fn signature<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parts: Vec<S> = parts.into_iter().collect();
    parts.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

    let mut hasher = Sha1::new();
    for part in &parts {
        hasher.update(part.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The set of strings a callback signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInputs {
    parts: Vec<String>,
}

impl SignatureInputs {
    /// Inputs for a plaintext channel: `{token, timestamp, nonce}`.
    pub fn new(token: &str, timestamp: &str, nonce: &str) -> Self {
        Self {
            parts: vec![token.to_owned(), timestamp.to_owned(), nonce.to_owned()],
        }
    }

    /// Add the ciphertext (or encrypted challenge) covered on encrypted channels.
    pub fn with_ciphertext(mut self, ciphertext: &str) -> Self {
        self.parts.push(ciphertext.to_owned());
        self
    }

    /// Hex digest of these inputs.
    pub fn digest(&self) -> String {
        signature(&self.parts)
    }

    /// Compare `supplied` against the digest in constant time.
    pub fn verify(self, supplied: &str) -> bool {
        let computed = self.digest();
        computed.as_bytes().ct_eq(supplied.as_bytes()).into()
    }
}

/// A fresh nonce for outbound responses: 32 lowercase hex characters.
pub fn fresh_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
