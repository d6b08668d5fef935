//! Session and one-shot approval tracking.
//!
//! Approvals are keyed by `(scope, integration, capability)` where the scope
//! is a chat id or the `__global__` sentinel. Session approvals are
//! idempotent within their chat; one-shot approvals are counters consumed on
//! use.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use meridian_core::{Capability, IntegrationId};

/// Scope used for one-shot approvals granted outside any chat.
pub const GLOBAL_SCOPE: &str = "__global__";

fn approval_key(scope: &str, integration_id: IntegrationId, capability: &Capability) -> String {
    format!("{scope}:{integration_id}:{capability}")
}

/// In-memory store of session and one-shot approvals.
///
/// One instance per process; test harnesses instantiate their own.
#[derive(Default)]
pub struct ApprovalStore {
    sessions: Mutex<HashSet<String>>,
    one_shot: Mutex<HashMap<String, u32>>,
}

impl ApprovalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a session approval. No-op when `chat_id` is empty or
    /// whitespace.
    pub fn grant_session(
        &self,
        chat_id: &str,
        integration_id: IntegrationId,
        capability: &Capability,
    ) {
        if chat_id.trim().is_empty() {
            return;
        }
        let key = approval_key(chat_id, integration_id, capability);
        tracing::debug!(key = %key, "granting session approval");
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key);
    }

    /// Whether a session approval covers the key. Does not consume.
    #[must_use]
    pub fn has_session(
        &self,
        chat_id: &str,
        integration_id: IntegrationId,
        capability: &Capability,
    ) -> bool {
        let key = approval_key(chat_id, integration_id, capability);
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&key)
    }

    /// Grant one one-shot approval, scoped to the chat when given.
    pub fn grant_one_time(
        &self,
        chat_id: Option<&str>,
        integration_id: IntegrationId,
        capability: &Capability,
    ) {
        let scope = chat_scope(chat_id);
        let key = approval_key(scope, integration_id, capability);
        tracing::debug!(key = %key, "granting one-shot approval");
        let mut one_shot = self
            .one_shot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let counter = one_shot.entry(key).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    /// Consume one one-shot approval if present. Decrementing to zero
    /// removes the entry.
    #[must_use]
    pub fn consume_one_time(
        &self,
        chat_id: Option<&str>,
        integration_id: IntegrationId,
        capability: &Capability,
    ) -> bool {
        let scope = chat_scope(chat_id);
        let key = approval_key(scope, integration_id, capability);
        let mut one_shot = self
            .one_shot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match one_shot.get_mut(&key) {
            Some(counter) if *counter > 0 => {
                *counter = counter.saturating_sub(1);
                if *counter == 0 {
                    one_shot.remove(&key);
                }
                true
            },
            _ => {
                one_shot.remove(&key);
                false
            },
        }
    }

    /// Clear approvals.
    ///
    /// Without a `chat_id`, every session and one-shot approval is dropped.
    /// With one, only keys under that chat's prefix are removed from both
    /// maps.
    pub fn clear(&self, chat_id: Option<&str>) {
        match chat_id {
            None => {
                self.sessions
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clear();
                self.one_shot
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clear();
            },
            Some(chat_id) => {
                let prefix = format!("{chat_id}:");
                self.sessions
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .retain(|key| !key.starts_with(&prefix));
                self.one_shot
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .retain(|key, _| !key.starts_with(&prefix));
            },
        }
    }
}

fn chat_scope(chat_id: Option<&str>) -> &str {
    match chat_id {
        Some(chat_id) if !chat_id.trim().is_empty() => chat_id,
        _ => GLOBAL_SCOPE,
    }
}

impl std::fmt::Debug for ApprovalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalStore").finish_non_exhaustive()
    }
}
