//! Session management: identity key → (assistant, thread).
//!
//! [`SessionMap`] is the shared store.  Each identity owns a
//! [`OnceCell`] slot, so the first caller for a key provisions while
//! concurrent callers for the same key wait on that cell instead of
//! provisioning again.  The map's mutex only guards slot lookup and is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::models::{AssistantRef, ModelService, ThreadRef};

/// Identity used when the caller supplies none.
pub const DEFAULT_IDENTITY: &str = "default";

// ── SessionRecord ────────────────────────────────────────────

/// The assistant/thread pair bound to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub assistant_ref: AssistantRef,
    pub thread_ref: ThreadRef,
}

// ── SessionMap ───────────────────────────────────────────────

type Slot = Arc<OnceCell<SessionRecord>>;

/// Concurrency-safe identity → session store with insert-if-absent
/// semantics per key.
///
/// Entries live until the map is dropped; there is no eviction.
#[derive(Debug, Default)]
pub struct SessionMap {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for `key`, inserting an empty one if absent.
    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// The stored record for `key`, if provisioning has completed.
    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of identities with a provisioned session.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── AssistantProfile ─────────────────────────────────────────

/// What every newly provisioned assistant is created with.
#[derive(Debug, Clone)]
pub struct AssistantProfile {
    /// System instructions (the analysis prompt).
    pub instructions: String,
    /// Model name, e.g. `gpt-4o-mini`.
    pub model: String,
}

impl AssistantProfile {
    /// Display name given to the assistant created for `identity`.
    pub fn assistant_name(identity: &str) -> String {
        format!("Diary Assistant for {identity}")
    }
}

// ── SessionManager ───────────────────────────────────────────

/// Resolves identities to sessions, provisioning lazily.
pub struct SessionManager {
    store: Arc<SessionMap>,
    service: Arc<dyn ModelService>,
    profile: AssistantProfile,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionMap>,
        service: Arc<dyn ModelService>,
        profile: AssistantProfile,
    ) -> Self {
        Self {
            store,
            service,
            profile,
        }
    }

    pub fn store(&self) -> &Arc<SessionMap> {
        &self.store
    }

    /// Look up `identity` without provisioning.
    pub fn lookup(&self, identity: Option<&str>) -> Option<SessionRecord> {
        self.store.get(normalize_identity(identity))
    }

    /// Return the session for `identity`, creating assistant and thread
    /// on first use.
    ///
    /// Idempotent per identity: later calls return the stored record and
    /// make no remote calls.  On failure nothing is stored, so a retry
    /// provisions again.
    pub async fn resolve_or_create(
        &self,
        identity: Option<&str>,
    ) -> Result<SessionRecord, AnalysisError> {
        let key = normalize_identity(identity);
        let slot = self.store.slot(key);

        if let Some(record) = slot.get() {
            debug!(identity = key, thread = %record.thread_ref, "session hit");
            return Ok(record.clone());
        }

        let record = slot
            .get_or_try_init(|| self.provision(key))
            .await
            .inspect_err(|e| warn!(identity = key, error = %e, "session provisioning failed"))?;
        Ok(record.clone())
    }

    async fn provision(&self, identity: &str) -> Result<SessionRecord, AnalysisError> {
        debug!(identity, model = %self.profile.model, "provisioning session");

        let assistant_ref = self
            .service
            .create_assistant(
                &AssistantProfile::assistant_name(identity),
                &self.profile.instructions,
                &self.profile.model,
            )
            .await
            .map_err(AnalysisError::Provisioning)?;

        let thread_ref = self
            .service
            .create_thread()
            .await
            .map_err(AnalysisError::Provisioning)?;

        info!(
            identity,
            assistant = %assistant_ref,
            thread = %thread_ref,
            "session provisioned"
        );
        Ok(SessionRecord {
            assistant_ref,
            thread_ref,
        })
    }
}

/// Absent or blank identities map to [`DEFAULT_IDENTITY`].
pub fn normalize_identity(identity: Option<&str>) -> &str {
    match identity.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_IDENTITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_maps_to_default() {
        assert_eq!(normalize_identity(None), "default");
        assert_eq!(normalize_identity(Some("   ")), "default");
        assert_eq!(normalize_identity(Some(" user-7 ")), "user-7");
    }

    #[test]
    fn empty_slots_are_not_counted() {
        let map = SessionMap::new();
        let _ = map.slot("pending");
        assert_eq!(map.len(), 0);
        assert!(map.get("pending").is_none());
    }

    #[test]
    fn assistant_name_embeds_identity() {
        assert_eq!(
            AssistantProfile::assistant_name("minji"),
            "Diary Assistant for minji"
        );
    }
}
