//! Callback protocol definitions and the rejection taxonomy shared by the gateway crates.

pub mod error;
pub mod protocol;

pub use error::RejectReason;
pub use protocol::{HttpMethod, RawRequest};
