//! Rejection taxonomy shared across crates.

use thiserror::Error;

/// Why an inbound callback was rejected.
///
/// Every variant is answered with the same acknowledgment body
/// ([`crate::protocol::ACKNOWLEDGMENT`]); the variant only reaches local logs.
/// [`RejectReason::code`] gives a stable label for log fields:
/// - [`RejectReason::MissingField`] → `missing_field`
/// - [`RejectReason::SignatureMismatch`] → `signature_mismatch`
/// - [`RejectReason::Framing`] → `framing_error`
/// - [`RejectReason::MalformedPayload`] → `malformed_payload`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// A required query parameter or body element was absent. No signature
    /// comparison was attempted.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The computed signature differs from the one the caller supplied.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The signature matched but the ciphertext failed padding, length-prefix,
    /// or account-id validation.
    #[error("framing error: {0}")]
    Framing(String),

    /// The payload was authentic but is not well-formed markup.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl RejectReason {
    /// Returns the short label recorded with this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingField(_) => "missing_field",
            RejectReason::SignatureMismatch => "signature_mismatch",
            RejectReason::Framing(_) => "framing_error",
            RejectReason::MalformedPayload(_) => "malformed_payload",
        }
    }

    /// Structural detail safe to log next to [`RejectReason::code`].
    ///
    /// Parser messages from [`RejectReason::MalformedPayload`] may quote the
    /// payload and are left out.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RejectReason::MissingField(name) => Some(*name),
            RejectReason::Framing(detail) => Some(detail.as_str()),
            RejectReason::SignatureMismatch | RejectReason::MalformedPayload(_) => None,
        }
    }
}
