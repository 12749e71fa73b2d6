//! Configuration loading and validation for the callback gateway.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Length of the platform's base64 AES key as issued (unpadded).
pub const AES_KEY_ENCODED_LEN: usize = 43;

/// Validated gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base64 EncodingAESKey from the platform console, without the trailing
    /// `=`. **Required.**
    pub wechat_aeskey: String,

    /// App id (official accounts) or corp id (WeChat Work) appended to every
    /// encrypted frame. **Required.**
    pub wechat_appid: String,

    /// Shared token mixed into every signature. **Required.**
    pub wechat_token: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Path the platform calls back on.
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// OTLP endpoint for span export. Spans are not exported when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_callback_path() -> String {
    "/wechat".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.wechat_aeskey, "WECHAT_AESKEY")?;
        ensure_non_empty(&self.wechat_appid, "WECHAT_APPID")?;
        ensure_non_empty(&self.wechat_token, "WECHAT_TOKEN")?;

        if self.wechat_aeskey.len() != AES_KEY_ENCODED_LEN {
            anyhow::bail!(
                "WECHAT_AESKEY must be {AES_KEY_ENCODED_LEN} characters, got {}",
                self.wechat_aeskey.len()
            );
        }
        if !self.callback_path.starts_with('/') {
            anyhow::bail!("CALLBACK_PATH must start with '/'");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
