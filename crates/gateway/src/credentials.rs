//! [`Credentials`]: the immutable key material every callback is checked against.
//!
//! Loaded once from [`Config`] at startup and shared behind an `Arc` for the
//! lifetime of the process. Nothing mutates it afterwards, so request handlers
//! read it without locking.

use base64::{
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use thiserror::Error;

use crate::config::Config;
use crate::crypto::{IV_LEN, KEY_LEN};

/// Standard alphabet, tolerant of non-zero trailing bits.
///
/// Platform-issued keys are 43 characters whose final symbol routinely carries
/// stray low bits; a strict decoder would refuse them.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Errors produced while loading credentials. All of them are startup-fatal.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The AES key is not valid base64.
    #[error("AES key is not valid base64: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),

    /// The decoded AES key has an unexpected length.
    #[error("AES key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A required credential is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Fixed-size AES-256 key buffer.
///
/// When this type is dropped the memory is overwritten with zeroes.
pub struct AesKey(Box<[u8; KEY_LEN]>);

impl AesKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The CBC initialisation vector: the first [`IV_LEN`] bytes of the key.
    pub fn iv(&self) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&self.0[..IV_LEN]);
        iv
    }
}

impl Drop for AesKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey([REDACTED])")
    }
}

/// Key material and identity for one platform account.
pub struct Credentials {
    key: AesKey,
    account_id: String,
    token: String,
}

impl Credentials {
    /// Build credentials from raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::InvalidKeyLength`] if `key` is not
    /// [`KEY_LEN`] bytes, or [`CredentialsError::Empty`] for a blank account id
    /// or token.
    pub fn new(
        key: &[u8],
        account_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        if key.len() != KEY_LEN {
            return Err(CredentialsError::InvalidKeyLength(key.len()));
        }
        let account_id = account_id.into();
        let token = token.into();
        if account_id.is_empty() {
            return Err(CredentialsError::Empty("account id"));
        }
        if token.is_empty() {
            return Err(CredentialsError::Empty("token"));
        }

        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key);
        Ok(Self {
            key: AesKey(buf),
            account_id,
            token,
        })
    }

    /// Decode the platform's unpadded base64 key and build credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not decode to exactly [`KEY_LEN`] bytes.
    pub fn from_encoded(
        encoded_key: &str,
        account_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let key = KEY_ENGINE.decode(format!("{}=", encoded_key.trim()))?;
        Self::new(&key, account_id, token)
    }

    /// Load credentials from validated configuration.
    ///
    /// # Errors
    ///
    /// See [`Credentials::from_encoded`].
    pub fn from_config(cfg: &Config) -> Result<Self, CredentialsError> {
        Self::from_encoded(&cfg.wechat_aeskey, &cfg.wechat_appid, &cfg.wechat_token)
    }

    /// The AES-256 key.
    pub fn key(&self) -> &AesKey {
        &self.key
    }

    /// App id or corp id this gateway accepts frames for.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Shared signature token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("account_id", &self.account_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
