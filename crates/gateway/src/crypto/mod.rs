//! Message codec and signature primitives.
//!
//! This module is intentionally free of HTTP dependencies. It provides the
//! low-level operations used by the verifier and the reply path.
//!
//! # Ciphertext format
//!
//! ```text
//! base64( AES-256-CBC( prefix[16] ‖ be32(len) ‖ payload ‖ account_id ‖ pad[k] ) )
//! ```
//!
//! The IV is the first 16 bytes of the key, and `pad` is `k` bytes of value `k`
//! aligning the frame to 32 bytes (`k` is 32 when already aligned). Both quirks
//! are fixed by the platform and must not change.

pub mod cipher;
pub mod signer;

pub use cipher::{decrypt, encrypt, FramingError};
pub use signer::SignatureInputs;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the CBC initialisation vector taken from the key.
pub const IV_LEN: usize = 16;
