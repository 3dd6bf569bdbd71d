//! License Record Model
//!
//! The cached entitlement snapshot for one installation, plus the
//! expiry/staleness policy constants that govern it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{LicenseError, Result};

/// Days a locally confirmed record stays fresh before a background
/// re-check is triggered. Also the "expiring soon" threshold reported
/// by [`TrialStatus`]; the two share one constant on purpose.
pub const REVALIDATION_INTERVAL_DAYS: i64 = 7;

/// Client-side validity window granted on activation or successful
/// revalidation. This caps the gap between server contacts; it is NOT
/// the subscription term, which the server tracks.
pub const ACTIVATION_WINDOW_DAYS: i64 = 30;

/// License key (opaque, e.g. MK-XXXX-XXXX-XXXX-XXXX)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parse from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Get the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entitlement tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Starter,
    Professional,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &str {
        match self {
            Tier::Starter => "starter",
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "professional" => Tier::Professional,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Starter,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Starter
    }
}

/// Stored license status
///
/// `Expired` exists in the persisted encoding for completeness, but
/// expiry is normally a derived condition: a record keeps `Active`
/// past its `expires_at` until a revalidation explicitly overwrites
/// the status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Invalid,
}

/// A cached license record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// License key
    pub key: LicenseKey,

    /// Purchaser email (informational only, not used in validation)
    pub owner_email: String,

    /// Entitlement tier
    pub tier: Tier,

    /// Stored status; authoritative only together with `expires_at`
    pub status: LicenseStatus,

    /// Usable strictly before this instant
    pub expires_at: DateTime<Utc>,

    /// Last successful server confirmation; drives staleness
    pub last_validated_at: DateTime<Utc>,

    /// Feature entitlement flags, always replaced as a whole map
    pub features: HashMap<String, bool>,
}

impl LicenseRecord {
    /// Create a freshly activated record
    pub fn activated(
        key: LicenseKey,
        owner_email: String,
        tier: Tier,
        features: HashMap<String, bool>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            owner_email,
            tier,
            status: LicenseStatus::Active,
            expires_at: now + Duration::days(ACTIVATION_WINDOW_DAYS),
            last_validated_at: now,
            features,
        }
    }

    /// Check if the record is usable right now (active and unexpired)
    pub fn is_locally_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == LicenseStatus::Active && now < self.expires_at
    }

    /// Check if the last server confirmation is older than the
    /// revalidation interval
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_validated_at > Duration::days(REVALIDATION_INTERVAL_DAYS)
    }

    /// Trial/expiry countdown as shown in the UI
    pub fn trial_status(&self, now: DateTime<Utc>) -> TrialStatus {
        let secs = (self.expires_at - now).num_seconds();
        let days_remaining = if secs <= 0 {
            0
        } else {
            // Ceiling: a partial day still counts as a remaining day
            (secs + 86_399) / 86_400
        };

        TrialStatus {
            days_remaining,
            is_trial_phase: days_remaining <= REVALIDATION_INTERVAL_DAYS,
        }
    }

    /// Encode for the persistent store (human-inspectable JSON)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| LicenseError::StorageWrite(e.to_string()))
    }

    /// Decode from the persistent store. A record that fails to parse
    /// is reported as a read error, which callers treat as absent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::StorageRead(e.to_string()))
    }
}

/// Trial/expiry countdown
///
/// Note: this reports "license expiring soon" and "on a trial" through
/// the same threshold, so a paid license near its renewal boundary
/// looks identical to a trial near expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStatus {
    /// Whole days until expiry (ceiling), clamped to zero
    pub days_remaining: i64,

    /// True when at most the revalidation interval remains
    pub is_trial_phase: bool,
}

impl TrialStatus {
    /// The conservative default when no license is held
    pub fn unlicensed() -> Self {
        Self {
            days_remaining: 0,
            is_trial_phase: true,
        }
    }
}
