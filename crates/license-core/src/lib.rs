//! # license-core
//!
//! Client-side license caching and validation policy for the MK
//! desktop diagnostic app.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       LicenseState                           │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────────┐  │
//! │  │  in-memory   │  │  RecordStore  │  │  LicenseValidator │  │
//! │  │LicenseRecord │──│  (file/mem)   │  │  (Strategy)       │  │
//! │  └──────────────┘  └───────────────┘  └───────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The application constructs one [`LicenseState`] at startup and
//! routes every feature-gate decision through it. The two
//! collaborators are traits: `RecordStore` abstracts the durable copy
//! of the record (a JSON file in production), and `LicenseValidator`
//! abstracts the remote re-check (the `license-http` crate provides
//! the `reqwest`-backed implementation).
//!
//! The policy in one paragraph: a record activated against the server
//! is usable for a 30-day client-side grace window; once its last
//! server confirmation is more than 7 days old it is revalidated in
//! the background without blocking the caller; a confirmation renews
//! the window, an explicit rejection permanently invalidates the
//! record, and an unreachable server changes nothing: the product
//! keeps working offline once licensed.

pub mod error;
pub mod record;
pub mod state;
pub mod store;
pub mod validate;

pub use error::{LicenseError, Result};
pub use record::{
    ACTIVATION_WINDOW_DAYS, LicenseKey, LicenseRecord, LicenseStatus,
    REVALIDATION_INTERVAL_DAYS, Tier, TrialStatus,
};
pub use state::LicenseState;
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};
pub use validate::{LicenseValidator, ValidationResponse};
