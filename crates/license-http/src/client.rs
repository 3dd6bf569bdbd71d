//! License Validation HTTP Client
//!
//! `POST {base_url}/api/licenses/validate` with a bounded timeout.
//! Every transport-level problem (connect failure, timeout, non-2xx,
//! unparseable body) maps to `LicenseError::Communication`, which the
//! core treats as "keep the cached record" (fail open). Only a parsed
//! `{ "valid": false }` body counts as a rejection, and that verdict
//! is the core's to apply.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use license_core::{
    LicenseError, LicenseKey, LicenseValidator, Result, ValidationResponse,
};

/// Validation endpoint path on the subscription API
const VALIDATE_PATH: &str = "/api/licenses/validate";

/// HTTP validator configuration
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Subscription API base URL, e.g. "https://api.example.com"
    pub base_url: String,

    /// Request timeout in seconds; a slow server is a communication
    /// failure, never a hung client
    pub timeout_secs: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            timeout_secs: 10,
        }
    }
}

impl ValidatorConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let base_url = std::env::var("LICENSE_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let timeout_secs = std::env::var("LICENSE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(10);

        Self {
            base_url,
            timeout_secs,
        }
    }
}

/// Request body for the validation endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    license_key: &'a str,
}

/// `reqwest`-backed license validator
pub struct HttpValidator {
    client: reqwest::Client,
    config: ValidatorConfig,
}

impl HttpValidator {
    /// Create a new validator for the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ValidatorConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: ValidatorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(ValidatorConfig::from_env())
    }

    /// The endpoint URL this validator posts to
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            VALIDATE_PATH
        )
    }
}

#[async_trait]
impl LicenseValidator for HttpValidator {
    async fn validate(&self, key: &LicenseKey) -> Result<ValidationResponse> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "Validating license key");

        let response = self
            .client
            .post(&endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&ValidateRequest {
                license_key: key.as_str(),
            })
            .send()
            .await
            .map_err(|e| LicenseError::Communication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LicenseError::Communication(format!(
                "validation endpoint returned {status}"
            )));
        }

        response
            .json::<ValidationResponse>()
            .await
            .map_err(|e| LicenseError::Communication(e.to_string()))
    }
}
