//! Decoded callback messages and the replies sent back for them.
//!
//! - [`Envelope`] parses a verified payload once and serves memoised field reads.
//! - [`naming`] maps logical snake-case names to platform tag names.
//! - [`reply`] renders a [`Reply`] and seals it when the channel is encrypted.
//! - [`MessageHandler`] is where application logic plugs in.

pub mod envelope;
pub mod naming;
pub mod reply;

pub use envelope::{Envelope, EnvelopeError, MessageNode};
pub use reply::{respond, seal, Reply, ReplyError};

/// A verified message together with the channel it arrived on.
#[derive(Debug)]
pub struct InboundMessage {
    /// The parsed payload.
    pub envelope: Envelope,
    /// Whether the request was encrypted. Replies are sealed exactly when this is set.
    pub encrypted: bool,
}

/// Decides what, if anything, to answer a verified message with.
///
/// Returning `None` acknowledges the message with the platform's `success` body.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &InboundMessage) -> Option<Reply>;
}

/// Acknowledges every message without replying.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckHandler;

impl MessageHandler for AckHandler {
    fn handle(&self, _message: &InboundMessage) -> Option<Reply> {
        None
    }
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) -> Option<Reply> + Send + Sync,
{
    fn handle(&self, message: &InboundMessage) -> Option<Reply> {
        self(message)
    }
}
