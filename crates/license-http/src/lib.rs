//! # license-http
//!
//! HTTP client for the MK license validation endpoint.
//!
//! Implements `license_core::LicenseValidator` over `reqwest`, so the
//! desktop app's `LicenseState` can re-check cached licenses against
//! the subscription API. This is the only remote contract the client
//! depends on; checkout, webhooks, and tier listing live entirely on
//! the server side.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use license_core::{FileRecordStore, LicenseState};
//! use license_http::HttpValidator;
//!
//! let validator = HttpValidator::new("https://api.example.com");
//! let state = LicenseState::new(validator, FileRecordStore::new(path));
//! ```

pub mod client;

pub use client::{HttpValidator, ValidatorConfig};

// Re-export core types for convenience
pub use license_core::{
    LicenseError, LicenseKey, LicenseRecord, LicenseState, LicenseValidator, Result,
    ValidationResponse,
};
