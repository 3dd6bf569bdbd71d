//! License State
//!
//! Single source of truth for "is this installation licensed, and for
//! which features". Owns the one in-memory [`LicenseRecord`], keeps it
//! in sync with the persistent store by writing through on every
//! mutation, and decides when a cached record needs a background
//! re-check against the validation service.
//!
//! ## Policy
//!
//! - A record is usable while `status == active` and unexpired.
//! - A usable record older than the revalidation interval is returned
//!   immediately and re-checked in the background; the re-check never
//!   blocks the caller.
//! - A re-check that cannot reach the server changes nothing: once
//!   licensed, the product keeps working offline (fail open). Only an
//!   explicit server rejection downgrades the record to invalid.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use license_core::{FileRecordStore, LicenseState};
//! use license_http::HttpValidator;
//!
//! let state = LicenseState::new(
//!     HttpValidator::from_env()?,
//!     FileRecordStore::new(config_dir.join("license.json")),
//! );
//!
//! match state.load_current().await {
//!     Some(record) => tracing::info!(tier = record.tier.as_str(), "Licensed"),
//!     None => show_activation_screen(),
//! }
//!
//! if state.is_feature_enabled("advancedDiagnostics") {
//!     // unlock the pro diagnostics panel
//! }
//! ```

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::{LicenseError, Result};
use crate::record::{
    ACTIVATION_WINDOW_DAYS, LicenseKey, LicenseRecord, LicenseStatus, Tier, TrialStatus,
};
use crate::store::RecordStore;
use crate::validate::{LicenseValidator, ValidationResponse};

/// The license cache/validator component
///
/// Constructed once at application startup with its two collaborators
/// and passed by reference to whoever gates features. Queries
/// (`is_feature_enabled`, `current_tier`, `trial_status`) are pure
/// synchronous reads of the in-memory snapshot and never touch the
/// network, so an in-flight revalidation can never hang the UI.
pub struct LicenseState<V: LicenseValidator, S: RecordStore> {
    inner: Arc<StateInner<V, S>>,

    /// Most recent background revalidation, kept so tests (or a
    /// shutdown path) can await settlement; production startup
    /// ignores it.
    revalidation: Mutex<Option<JoinHandle<()>>>,
}

/// Shared with the background revalidation task. Single-writer
/// discipline: only methods on this struct mutate the record slot.
struct StateInner<V, S> {
    validator: V,
    store: S,
    record: RwLock<Option<LicenseRecord>>,
}

impl<V, S> LicenseState<V, S>
where
    V: LicenseValidator + 'static,
    S: RecordStore + 'static,
{
    /// Create a new license state with no record held
    pub fn new(validator: V, store: S) -> Self {
        Self {
            inner: Arc::new(StateInner {
                validator,
                store,
                record: RwLock::new(None),
            }),
            revalidation: Mutex::new(None),
        }
    }

    /// Activate a license key for this installation
    ///
    /// On success the new record replaces both the in-memory and the
    /// persisted copy. On rejection or communication failure any
    /// previously cached record is left untouched.
    pub async fn activate(&self, key: &str, email: &str) -> Result<LicenseRecord> {
        let key = LicenseKey::from_string(key);
        let email = email.trim();
        if key.is_empty() || email.is_empty() {
            return Err(LicenseError::Rejected(
                "license key and email are required".into(),
            ));
        }

        let response = self.inner.validator.validate(&key).await?;
        if !response.valid {
            return Err(LicenseError::Rejected(
                response.status.unwrap_or_else(|| "key not accepted".into()),
            ));
        }

        let record = LicenseRecord::activated(
            key,
            email.to_string(),
            response.tier.as_deref().map(Tier::from_str).unwrap_or_default(),
            response.features.unwrap_or_default(),
            Utc::now(),
        );

        *self.inner.record.write().unwrap() = Some(record.clone());
        self.inner.persist(&record).await;

        tracing::info!(key = %record.key, tier = record.tier.as_str(), "License activated");
        Ok(record)
    }

    /// Load the cached record and return it if usable
    ///
    /// Fails gracefully to `None` on an absent, unreadable, or corrupt
    /// persisted record. A usable-but-stale record is returned
    /// immediately; the re-check runs as a fire-and-forget task whose
    /// effect lands before the next query at the latest.
    pub async fn load_current(&self) -> Option<LicenseRecord> {
        let bytes = match self.inner.store.read().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read persisted license record");
                return None;
            }
        };

        let record = match LicenseRecord::from_bytes(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparseable license record");
                return None;
            }
        };

        // Held even when unusable, for trial/diagnostics surfaces
        *self.inner.record.write().unwrap() = Some(record.clone());

        let now = Utc::now();
        if !record.is_locally_valid(now) {
            return None;
        }

        if record.is_stale(now) {
            tracing::debug!(key = %record.key, "Cached license is stale; revalidating in background");
            let inner = Arc::clone(&self.inner);
            let snapshot = record.clone();
            let handle = tokio::spawn(async move { inner.revalidate(snapshot).await });
            *self.revalidation.lock().unwrap() = Some(handle);
        }

        Some(record)
    }

    /// Check a feature gate against the in-memory snapshot
    ///
    /// Synchronous and network-free. Unknown feature names and
    /// unusable or absent records all read as disabled.
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        let slot = self.inner.record.read().unwrap();
        match slot.as_ref() {
            Some(record) if record.is_locally_valid(Utc::now()) => {
                record.features.get(name).copied().unwrap_or(false)
            }
            _ => false,
        }
    }

    /// The tier of the currently usable license, if any
    pub fn current_tier(&self) -> Option<Tier> {
        let slot = self.inner.record.read().unwrap();
        slot.as_ref()
            .filter(|record| record.is_locally_valid(Utc::now()))
            .map(|record| record.tier)
    }

    /// The full feature map of the currently usable license
    pub fn current_features(&self) -> HashMap<String, bool> {
        let slot = self.inner.record.read().unwrap();
        slot.as_ref()
            .filter(|record| record.is_locally_valid(Utc::now()))
            .map(|record| record.features.clone())
            .unwrap_or_default()
    }

    /// Snapshot of whatever record is held, usable or not
    ///
    /// For diagnostics and UI messaging; never use this for gating.
    pub fn current_record(&self) -> Option<LicenseRecord> {
        self.inner.record.read().unwrap().clone()
    }

    /// Trial/expiry countdown for the UI
    pub fn trial_status(&self) -> TrialStatus {
        let slot = self.inner.record.read().unwrap();
        slot.as_ref()
            .map_or_else(TrialStatus::unlicensed, |record| {
                record.trial_status(Utc::now())
            })
    }

    /// Remove the license from this installation
    ///
    /// Clears the in-memory record and deletes the persisted copy.
    /// Idempotent: deactivating when nothing is active is a no-op.
    pub async fn deactivate(&self) {
        let had_record = self.inner.record.write().unwrap().take().is_some();

        if let Err(e) = self.inner.store.delete().await {
            tracing::warn!(error = %e, "Could not delete persisted license record");
        }

        if had_record {
            tracing::info!("License deactivated");
        }
    }

    /// Wait for the most recent background revalidation to settle
    ///
    /// No-op when none is in flight. Production code does not need
    /// this; it exists so tests and shutdown paths can observe the
    /// revalidation's effect deterministically.
    pub async fn await_revalidation(&self) {
        let handle = self.revalidation.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl<V, S> StateInner<V, S>
where
    V: LicenseValidator,
    S: RecordStore,
{
    /// Re-check a cached record against the server
    ///
    /// Success refreshes the confirmation timestamp, renews the grace
    /// window, and replaces the feature map as a whole. An explicit
    /// rejection marks the record invalid, which is terminal until a
    /// fresh activation. A communication failure changes nothing: the
    /// cached record stays authoritative (fail open).
    async fn revalidate(&self, snapshot: LicenseRecord) {
        match self.validator.validate(&snapshot.key).await {
            Ok(response) if response.valid => {
                if let Some(record) = self.apply_confirmation(&snapshot.key, &response) {
                    tracing::info!(key = %record.key, "License revalidated");
                    self.persist(&record).await;
                }
            }
            Ok(_) => {
                if let Some(record) = self.apply_rejection(&snapshot.key) {
                    tracing::info!(key = %record.key, "License rejected by server; marking invalid");
                    self.persist(&record).await;
                }
            }
            Err(e) => {
                tracing::debug!(key = %snapshot.key, error = %e, "Revalidation failed; keeping cached record");
            }
        }
    }

    /// Apply a successful server confirmation to the held record.
    /// Returns `None` when the record was deactivated or replaced
    /// while the check was in flight.
    fn apply_confirmation(
        &self,
        key: &LicenseKey,
        response: &ValidationResponse,
    ) -> Option<LicenseRecord> {
        let now = Utc::now();
        let mut slot = self.record.write().unwrap();
        let record = slot.as_mut().filter(|record| record.key == *key)?;

        record.last_validated_at = now;
        record.expires_at = now + Duration::days(ACTIVATION_WINDOW_DAYS);
        if let Some(tier) = response.tier.as_deref() {
            record.tier = Tier::from_str(tier);
        }
        if let Some(features) = &response.features {
            record.features = features.clone();
        }

        Some(record.clone())
    }

    /// Mark the held record invalid after an explicit rejection
    fn apply_rejection(&self, key: &LicenseKey) -> Option<LicenseRecord> {
        let mut slot = self.record.write().unwrap();
        let record = slot.as_mut().filter(|record| record.key == *key)?;

        record.status = LicenseStatus::Invalid;
        Some(record.clone())
    }

    /// Write-through to the persistent store
    ///
    /// A write failure is logged and swallowed: the in-memory state
    /// keeps the update and the running session behaves as licensed.
    async fn persist(&self, record: &LicenseRecord) {
        let bytes = match record.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode license record");
                return;
            }
        };

        if let Err(e) = self.store.write(&bytes).await {
            tracing::warn!(error = %e, "Could not persist license record; in-memory state keeps the update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Valid(ValidationResponse),
        Unreachable,
    }

    /// Programmable validation service double
    #[derive(Clone)]
    struct MockValidator {
        reply: Arc<Mutex<Reply>>,
        calls: Arc<AtomicUsize>,
    }

    impl MockValidator {
        fn accepting(response: ValidationResponse) -> Self {
            Self {
                reply: Arc::new(Mutex::new(Reply::Valid(response))),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn rejecting() -> Self {
            Self::accepting(ValidationResponse::rejected())
        }

        fn unreachable() -> Self {
            Self {
                reply: Arc::new(Mutex::new(Reply::Unreachable)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn set_unreachable(&self) {
            *self.reply.lock().unwrap() = Reply::Unreachable;
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LicenseValidator for MockValidator {
        async fn validate(&self, _key: &LicenseKey) -> Result<ValidationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.reply.lock().unwrap() {
                Reply::Valid(response) => Ok(response.clone()),
                Reply::Unreachable => {
                    Err(LicenseError::Communication("connection refused".into()))
                }
            }
        }
    }

    fn professional_response() -> ValidationResponse {
        ValidationResponse {
            valid: true,
            tier: Some("professional".into()),
            features: Some(HashMap::from([
                ("advancedDiagnostics".to_string(), true),
                ("export".to_string(), false),
            ])),
            status: Some("active".into()),
        }
    }

    fn seeded_record(last_validated_days_ago: i64) -> LicenseRecord {
        let now = Utc::now();
        let mut record = LicenseRecord::activated(
            LicenseKey::from_string("MK-AAAA-BBBB-CCCC-DDDD"),
            "shop@example.com".into(),
            Tier::Professional,
            HashMap::from([("advancedDiagnostics".to_string(), true)]),
            now - Duration::days(last_validated_days_ago),
        );
        // Keep the record unexpired regardless of how long ago it was
        // last confirmed
        record.expires_at = now + Duration::days(10);
        record
    }

    async fn seed(store: &MemoryRecordStore, record: &LicenseRecord) {
        store.write(&record.to_bytes().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_activation_scenario() {
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator, MemoryRecordStore::new());

        let record = state
            .activate("MK-AAAA-BBBB-CCCC-DDDD", "shop@example.com")
            .await
            .unwrap();
        assert_eq!(record.tier, Tier::Professional);
        assert_eq!(record.status, LicenseStatus::Active);

        assert!(state.is_feature_enabled("advancedDiagnostics"));
        assert!(!state.is_feature_enabled("export"));
        assert!(!state.is_feature_enabled("unknownFeature"));
        assert_eq!(state.current_tier(), Some(Tier::Professional));
    }

    #[tokio::test]
    async fn test_activation_persists_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator, Arc::clone(&store));

        state.activate("MK-1111", "shop@example.com").await.unwrap();

        let bytes = store.read().await.unwrap().unwrap();
        let persisted = LicenseRecord::from_bytes(&bytes).unwrap();
        assert_eq!(persisted.key.as_str(), "MK-1111");
        assert_eq!(persisted.tier, Tier::Professional);
    }

    #[tokio::test]
    async fn test_activate_rejects_empty_inputs_without_network() {
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator.clone(), MemoryRecordStore::new());

        assert!(matches!(
            state.activate("", "shop@example.com").await,
            Err(LicenseError::Rejected(_))
        ));
        assert!(matches!(
            state.activate("MK-1111", "  ").await,
            Err(LicenseError::Rejected(_))
        ));
        assert_eq!(validator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_existing_record() {
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator.clone(), MemoryRecordStore::new());
        state.activate("MK-1111", "shop@example.com").await.unwrap();

        validator.set_unreachable();
        let err = state.activate("MK-2222", "other@example.com").await.unwrap_err();
        assert!(matches!(err, LicenseError::Communication(_)));

        // Still licensed under the original key
        assert!(state.is_feature_enabled("advancedDiagnostics"));
        assert_eq!(state.current_record().unwrap().key.as_str(), "MK-1111");
    }

    #[tokio::test]
    async fn test_activate_rejection_is_distinct_from_unreachable() {
        let state = LicenseState::new(MockValidator::rejecting(), MemoryRecordStore::new());
        let err = state.activate("MK-1111", "shop@example.com").await.unwrap_err();
        assert!(matches!(err, LicenseError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_load_with_empty_store() {
        let state = LicenseState::new(MockValidator::rejecting(), MemoryRecordStore::new());
        assert!(state.load_current().await.is_none());
        assert!(!state.is_feature_enabled("advancedDiagnostics"));
        assert_eq!(state.trial_status(), TrialStatus::unlicensed());
    }

    #[tokio::test]
    async fn test_load_with_corrupt_store() {
        let store = MemoryRecordStore::with_bytes(b"{ truncated".to_vec());
        let state = LicenseState::new(MockValidator::rejecting(), store);
        assert!(state.load_current().await.is_none());
        assert!(state.current_record().is_none());
    }

    #[tokio::test]
    async fn test_load_fresh_record_skips_network() {
        let store = Arc::new(MemoryRecordStore::new());
        let record = seeded_record(1);
        seed(&store, &record).await;

        let validator = MockValidator::unreachable();
        let state = LicenseState::new(validator.clone(), Arc::clone(&store));

        let loaded = state.load_current().await.unwrap();
        assert_eq!(loaded, record);
        assert_eq!(validator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_load_expired_record_returns_none_but_keeps_diagnostics() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut record = seeded_record(1);
        record.expires_at = Utc::now() - Duration::days(1);
        seed(&store, &record).await;

        let state = LicenseState::new(MockValidator::rejecting(), Arc::clone(&store));
        assert!(state.load_current().await.is_none());
        assert!(!state.is_feature_enabled("advancedDiagnostics"));
        assert_eq!(state.current_tier(), None);

        // The record stays visible for UI messaging
        assert!(state.current_record().is_some());
        assert_eq!(state.trial_status(), TrialStatus::unlicensed());

        // And stays on disk for diagnostics
        assert!(store.read().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_record_triggers_background_revalidation() {
        let store = Arc::new(MemoryRecordStore::new());
        seed(&store, &seeded_record(8)).await;

        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator.clone(), Arc::clone(&store));

        // Caller gets the cached record immediately
        assert!(state.load_current().await.is_some());
        state.await_revalidation().await;
        assert_eq!(validator.call_count(), 1);

        let refreshed = state.current_record().unwrap();
        let age = Utc::now() - refreshed.last_validated_at;
        assert!(age < Duration::seconds(5));

        // Confirmation also renews the grace window and lands on disk
        assert!(refreshed.expires_at > Utc::now() + Duration::days(29));
        let persisted =
            LicenseRecord::from_bytes(&store.read().await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted.last_validated_at, refreshed.last_validated_at);
    }

    #[tokio::test]
    async fn test_fail_open_on_unreachable_service() {
        let store = Arc::new(MemoryRecordStore::new());
        let record = seeded_record(8);
        seed(&store, &record).await;

        let state = LicenseState::new(MockValidator::unreachable(), Arc::clone(&store));

        let loaded = state.load_current().await.unwrap();
        assert_eq!(loaded, record);
        state.await_revalidation().await;

        // Nothing changed: the cached record is still authoritative
        assert_eq!(state.current_record().unwrap(), record);
        assert!(state.is_feature_enabled("advancedDiagnostics"));
    }

    #[tokio::test]
    async fn test_server_rejection_locks_out_features() {
        let store = Arc::new(MemoryRecordStore::new());
        seed(&store, &seeded_record(8)).await;

        let state = LicenseState::new(MockValidator::rejecting(), Arc::clone(&store));

        // The stale-but-valid record is served one last time
        assert!(state.load_current().await.is_some());
        state.await_revalidation().await;

        assert!(!state.is_feature_enabled("advancedDiagnostics"));
        assert!(state.load_current().await.is_none());

        let persisted =
            LicenseRecord::from_bytes(&store.read().await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted.status, LicenseStatus::Invalid);
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let store = Arc::new(MemoryRecordStore::new());
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator, Arc::clone(&store));
        state.activate("MK-1111", "shop@example.com").await.unwrap();
        assert!(state.is_feature_enabled("advancedDiagnostics"));

        state.deactivate().await;
        assert!(!state.is_feature_enabled("advancedDiagnostics"));
        assert!(state.current_record().is_none());
        assert!(store.read().await.unwrap().is_none());

        // Second call is a no-op, never an error
        state.deactivate().await;
        assert!(state.current_record().is_none());
    }

    #[tokio::test]
    async fn test_trial_status_scenarios() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut record = seeded_record(1);
        record.expires_at = Utc::now() + Duration::days(3);
        seed(&store, &record).await;

        let state = LicenseState::new(MockValidator::rejecting(), Arc::clone(&store));
        let _ = state.load_current().await;
        let status = state.trial_status();
        assert_eq!(status.days_remaining, 3);
        assert!(status.is_trial_phase);

        record.expires_at = Utc::now() + Duration::days(30);
        seed(&store, &record).await;
        let _ = state.load_current().await;
        let status = state.trial_status();
        assert_eq!(status.days_remaining, 30);
        assert!(!status.is_trial_phase);
    }

    /// Store whose writes always fail, for the write-through policy
    struct BrokenWriteStore;

    #[async_trait::async_trait]
    impl RecordStore for BrokenWriteStore {
        async fn read(&self) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn write(&self, _bytes: &[u8]) -> Result<()> {
            Err(LicenseError::StorageWrite("disk full".into()))
        }

        async fn delete(&self) -> Result<()> {
            Err(LicenseError::StorageWrite("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_keeps_in_memory_update() {
        let validator = MockValidator::accepting(professional_response());
        let state = LicenseState::new(validator, BrokenWriteStore);

        // Activation still succeeds; the session behaves as licensed
        state.activate("MK-1111", "shop@example.com").await.unwrap();
        assert!(state.is_feature_enabled("advancedDiagnostics"));

        // Delete failure is swallowed too
        state.deactivate().await;
        assert!(state.current_record().is_none());
    }
}
