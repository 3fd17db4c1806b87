use std::time::Duration;

use examsplit_core::env::{self, EnvLookup};
use examsplit_core::error::CoreError;

use crate::payload::{CredentialBundle, DEFAULT_INSTANCE_TYPE};

/// Converter dispatcher settings.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Base URL of the dispatcher.
    pub url: String,
    /// Sizing hint forwarded with every batch (default: `m3.medium`).
    pub instance_type: String,
    /// Timeout of one submission request (default: `30` s).
    pub request_timeout: Duration,
    /// Storage credentials forwarded to the fleet.
    pub credentials: CredentialBundle,
}

impl ConverterConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default     |
    /// |---------------------------|-------------|
    /// | `CONVERTER_URL`           | required    |
    /// | `CONVERTER_INSTANCE_TYPE` | `m3.medium` |
    /// | `CONVERTER_TIMEOUT_SECS`  | `30`        |
    /// | `S3_BUCKET`               | required    |
    /// | `S3_ACCESS_KEY_ID`        | required    |
    /// | `S3_SECRET_ACCESS_KEY`    | required    |
    pub fn from_env(env: &impl EnvLookup) -> Result<Self, CoreError> {
        let url = env::required(env, "CONVERTER_URL")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "CONVERTER_URL must be an http(s) URL, got {url:?}"
            )));
        }

        let instance_type = env::optional(env, "CONVERTER_INSTANCE_TYPE")
            .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string());

        let timeout_secs: u64 = env::parse_or(env, "CONVERTER_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(CoreError::Validation(
                "CONVERTER_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        let credentials = CredentialBundle {
            token: env::required(env, "S3_ACCESS_KEY_ID")?,
            secret: env::required(env, "S3_SECRET_ACCESS_KEY")?,
            bucket: env::required(env, "S3_BUCKET")?,
        };

        Ok(Self {
            url,
            instance_type,
            request_timeout: Duration::from_secs(timeout_secs),
            credentials,
        })
    }
}
