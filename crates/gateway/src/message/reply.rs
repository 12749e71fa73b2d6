//! Outbound replies: render, then seal for encrypted channels.
//!
//! A sealed reply is the plaintext markup encrypted with the account's key and
//! wrapped in the `encrypt` template together with a signature over
//! `{token, timestamp, nonce, ciphertext}`. The timestamp and nonce are fresh
//! for every reply.

use thiserror::Error;

use super::{EnvelopeError, InboundMessage};
use crate::credentials::Credentials;
use crate::crypto::signer::{fresh_nonce, unix_timestamp};
use crate::crypto::{cipher, FramingError, SignatureInputs};
use crate::render::{Fields, RenderError, Renderer, ENCRYPT_TEMPLATE};

/// Errors produced while building a reply.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The inbound message lacks the addressing fields a reply needs.
    #[error("cannot address reply: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("encryption failed: {0}")]
    Framing(#[from] FramingError),
}

/// A reply message: a platform message type plus its type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    msg_type: String,
    fields: Fields,
}

impl Reply {
    /// A reply of the given message type with no fields yet.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: Fields::new(),
        }
    }

    /// A text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text").with_field("content", content)
    }

    /// Add or replace a field, keyed by logical name.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

/// Render `reply` back to the sender of `inbound`.
///
/// The reply is addressed from the inbound recipient to the inbound sender and
/// stamped with the current time. It is sealed when `inbound` was encrypted.
///
/// # Errors
///
/// Returns [`ReplyError`] if the inbound message lacks addressing fields, the
/// renderer fails, or encryption fails.
pub fn respond(
    creds: &Credentials,
    renderer: &dyn Renderer,
    inbound: &InboundMessage,
    reply: &Reply,
) -> Result<String, ReplyError> {
    let timestamp = unix_timestamp();

    let mut fields = reply.fields.clone();
    fields.insert("to_user_name".into(), inbound.envelope.from_user_name()?);
    fields.insert("from_user_name".into(), inbound.envelope.to_user_name()?);
    fields.insert("create_time".into(), timestamp.to_string());

    let plaintext = renderer.render(&reply.msg_type, &fields)?;
    if !inbound.encrypted {
        return Ok(plaintext);
    }
    seal(creds, renderer, &plaintext, timestamp, &fresh_nonce())
}

/// Encrypt `plaintext` and wrap it in the signed `encrypt` envelope.
///
/// # Errors
///
/// Returns [`ReplyError`] if encryption or rendering fails.
pub fn seal(
    creds: &Credentials,
    renderer: &dyn Renderer,
    plaintext: &str,
    timestamp: u64,
    nonce: &str,
) -> Result<String, ReplyError> {
    let ciphertext = cipher::encrypt(creds, plaintext.as_bytes())?;
    let timestamp = timestamp.to_string();
    let msg_signature = SignatureInputs::new(creds.token(), &timestamp, nonce)
        .with_ciphertext(&ciphertext)
        .digest();

    let mut fields = Fields::new();
    fields.insert("encrypt".into(), ciphertext);
    fields.insert("msg_signature".into(), msg_signature);
    fields.insert("time_stamp".into(), timestamp);
    fields.insert("nonce".into(), nonce.to_owned());
    Ok(renderer.render(ENCRYPT_TEMPLATE, &fields)?)
}
