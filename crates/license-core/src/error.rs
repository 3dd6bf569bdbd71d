//! License Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, LicenseError>;

/// License-related errors
#[derive(Error, Debug)]
pub enum LicenseError {
    /// Network, timeout, non-2xx or malformed response from the
    /// validation service
    #[error("Validation service unreachable: {0}")]
    Communication(String),

    /// Server explicitly rejected the license key
    #[error("License rejected: {0}")]
    Rejected(String),

    /// Persisted record missing, corrupt, or unreadable
    #[error("License storage read error: {0}")]
    StorageRead(String),

    /// Persisting a new/updated record failed
    #[error("License storage write error: {0}")]
    StorageWrite(String),
}

impl LicenseError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LicenseError::Communication(_)
                | LicenseError::StorageRead(_)
                | LicenseError::StorageWrite(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            LicenseError::Communication(_) => {
                "Could not reach the license server. Your cached license remains in effect."
            }
            LicenseError::Rejected(_) => "Your license key is no longer valid.",
            LicenseError::StorageRead(_) => "No license found on this installation.",
            LicenseError::StorageWrite(_) => "Could not save your license locally.",
        }
    }
}
