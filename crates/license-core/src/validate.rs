//! License Validation Strategy
//!
//! Defines the one remote contract the component depends on, as a
//! trait so `LicenseState` works against any backend (the production
//! HTTP client lives in `license-http`; tests use a mock).
//!
//! The error split carries the whole policy: `Ok` with `valid: false`
//! is an explicit rejection and may downgrade a cached record to
//! invalid; `Err` is a communication failure and must leave the cached
//! record untouched (fail open).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::record::LicenseKey;

/// Remote validation backend
#[async_trait]
pub trait LicenseValidator: Send + Sync {
    /// Ask the server whether `key` is currently valid
    async fn validate(&self, key: &LicenseKey) -> Result<ValidationResponse>;
}

#[async_trait]
impl<V: LicenseValidator + ?Sized> LicenseValidator for std::sync::Arc<V> {
    async fn validate(&self, key: &LicenseKey) -> Result<ValidationResponse> {
        (**self).validate(key).await
    }
}

/// Response from the validation endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    /// Verdict
    pub valid: bool,

    /// Tier name, e.g. "professional"
    #[serde(default)]
    pub tier: Option<String>,

    /// Feature entitlement flags
    #[serde(default)]
    pub features: Option<HashMap<String, bool>>,

    /// Server-side status string (informational)
    #[serde(default)]
    pub status: Option<String>,
}

impl ValidationResponse {
    /// A rejection with no entitlement data
    pub fn rejected() -> Self {
        Self {
            valid: false,
            tier: None,
            features: None,
            status: None,
        }
    }
}
