//! AES-256-CBC encryption and decryption of callback message bodies.
//!
//! The platform frames every message before encryption:
//!
//! | bytes            | content                                   |
//! |------------------|-------------------------------------------|
//! | 16               | random printable prefix                   |
//! | 4                | payload length, big-endian                |
//! | n                | payload                                   |
//! | m                | account id (app id or corp id)            |
//! | k (1..=32)       | padding, every byte equal to `k`          |
//!
//! The trailing account id is the authenticity gate: a frame that decrypts
//! cleanly but names another account is rejected.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, Rng};
use thiserror::Error;

use crate::credentials::Credentials;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the random prefix at the start of every frame.
pub const PREFIX_LEN: usize = 16;

/// Length of the big-endian payload length field.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Block size the padding aligns frames to. Twice the AES block size.
pub const PAD_BLOCK: usize = 32;

const AES_BLOCK: usize = 16;

/// Smallest frame that can hold a prefix, a length field and one padding byte.
const MIN_FRAME_LEN: usize = PREFIX_LEN + LENGTH_FIELD_LEN + 1;

/// Characters the random prefix is drawn from: ASCII letters, punctuation, digits.
const PREFIX_POOL: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~0123456789";

/// Errors produced by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The ciphertext is not valid base64.
    #[error("ciphertext is not valid base64")]
    InvalidBase64,

    /// The ciphertext is empty or not a whole number of AES blocks.
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertextLength(usize),

    /// The decrypted frame cannot hold a prefix, length field and payload.
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// The trailing padding byte is out of range or the padding run is inconsistent.
    #[error("invalid padding byte {0}")]
    InvalidPadding(u8),

    /// The declared payload length runs past the end of the frame.
    #[error("declared length {declared} exceeds the {available} bytes available")]
    LengthOverflow { declared: usize, available: usize },

    /// The frame was encrypted for a different account.
    #[error("account id mismatch")]
    AccountMismatch,

    /// The payload is too large for the 32-bit length field.
    #[error("payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
}

/// Frame, pad, encrypt and base64-encode `plaintext` for the credentials' account.
///
/// A fresh random prefix is drawn from the OS CSPRNG on every call, so
/// encrypting the same message twice yields different ciphertexts.
///
/// # Errors
///
/// Returns [`FramingError::PayloadTooLarge`] if `plaintext` is longer than
/// `u32::MAX` bytes.
pub fn encrypt(creds: &Credentials, plaintext: &[u8]) -> Result<String, FramingError> {
    encrypt_with_prefix(creds, &random_prefix(), plaintext)
}

/// Decrypt a base64 ciphertext and return the payload it frames.
///
/// # Errors
///
/// Returns a [`FramingError`] describing the first check that failed: base64,
/// block alignment, frame length, padding, declared length, or account id.
pub fn decrypt(creds: &Credentials, ciphertext_b64: &str) -> Result<Vec<u8>, FramingError> {
    let ciphertext = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|_| FramingError::InvalidBase64)?;
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK != 0 {
        return Err(FramingError::InvalidCiphertextLength(ciphertext.len()));
    }

    let key = creds.key();
    let frame = Aes256CbcDec::new(&(*key.as_bytes()).into(), &key.iv().into())
        .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
        .map_err(|_| FramingError::InvalidCiphertextLength(ciphertext.len()))?;

    open_frame(creds.account_id().as_bytes(), &frame).map(<[u8]>::to_vec)
}

pub(crate) fn encrypt_with_prefix(
    creds: &Credentials,
    prefix: &[u8; PREFIX_LEN],
    plaintext: &[u8],
) -> Result<String, FramingError> {
    let declared =
        u32::try_from(plaintext.len()).map_err(|_| FramingError::PayloadTooLarge(plaintext.len()))?;
    let account_id = creds.account_id().as_bytes();

    let mut frame = Vec::with_capacity(
        PREFIX_LEN + LENGTH_FIELD_LEN + plaintext.len() + account_id.len() + PAD_BLOCK,
    );
    frame.extend_from_slice(prefix);
    frame.extend_from_slice(&declared.to_be_bytes());
    frame.extend_from_slice(plaintext);
    frame.extend_from_slice(account_id);
    pad(&mut frame);

    let key = creds.key();
    let ciphertext = Aes256CbcEnc::new(&(*key.as_bytes()).into(), &key.iv().into())
        .encrypt_padded_vec_mut::<NoPadding>(&frame);
    Ok(STANDARD.encode(ciphertext))
}

fn random_prefix() -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    for b in prefix.iter_mut() {
        *b = PREFIX_POOL[OsRng.gen_range(0..PREFIX_POOL.len())];
    }
    prefix
}

/// Append `k` bytes of value `k`, where `k = 32 - len % 32` (never 0).
fn pad(frame: &mut Vec<u8>) {
    let amount = PAD_BLOCK - frame.len() % PAD_BLOCK;
    // amount is in 1..=32
    frame.resize(frame.len() + amount, amount as u8);
}

/// Validate padding, length prefix and account suffix; return the payload slice.
fn open_frame<'a>(account_id: &[u8], frame: &'a [u8]) -> Result<&'a [u8], FramingError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FramingError::FrameTooShort(frame.len()));
    }

    let last = frame[frame.len() - 1];
    let amount = usize::from(last);
    if amount == 0 || amount > PAD_BLOCK {
        return Err(FramingError::InvalidPadding(last));
    }
    if frame[frame.len() - amount..].iter().any(|&b| b != last) {
        return Err(FramingError::InvalidPadding(last));
    }

    let body_end = frame.len() - amount;
    if body_end < PREFIX_LEN + LENGTH_FIELD_LEN {
        return Err(FramingError::FrameTooShort(frame.len()));
    }
    let content = &frame[PREFIX_LEN..body_end];

    let mut length_field = [0u8; LENGTH_FIELD_LEN];
    length_field.copy_from_slice(&content[..LENGTH_FIELD_LEN]);
    let declared = u32::from_be_bytes(length_field) as usize;

    let rest = &content[LENGTH_FIELD_LEN..];
    if declared > rest.len() {
        return Err(FramingError::LengthOverflow {
            declared,
            available: rest.len(),
        });
    }

    let (payload, suffix) = rest.split_at(declared);
    if suffix != account_id {
        return Err(FramingError::AccountMismatch);
    }
    Ok(payload)
}
