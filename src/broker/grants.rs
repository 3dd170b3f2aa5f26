use crate::broker::request::{Scope, now_ms};
use crate::store::{StateStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A materialized approval: `identity` may use `capability` without
/// re-prompting until `expires_at`. `None` means "never expires" and is
/// only produced by `persistent` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGrant {
    pub identity: String,
    pub capability: String,
    pub scope: Scope,
    /// Wall-clock milliseconds at the approving resolution.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl DeviceGrant {
    #[must_use]
    pub fn is_live_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_none_or(|deadline| now_ms <= deadline)
    }
}

/// `(identity, capability)`-keyed grant store. Grants are upserted (latest
/// approval wins) and die by expiry, checked at read time — there is no
/// background sweep. Persistent-scope grants survive restarts through the
/// state store; bounded scopes stay volatile, which is inside their
/// validity windows anyway.
pub struct GrantLedger {
    store: Arc<dyn StateStore>,
    inner: RwLock<HashMap<(String, String), DeviceGrant>>,
}

impl GrantLedger {
    /// Load persisted grants, starting empty if the backend is unreadable.
    pub fn load(store: Arc<dyn StateStore>) -> Self {
        let grants = store.load_grants().unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to load grant ledger; starting empty");
            Vec::new()
        });
        let inner = grants
            .into_iter()
            .map(|grant| ((grant.identity.clone(), grant.capability.clone()), grant))
            .collect();

        Self {
            store,
            inner: RwLock::new(inner),
        }
    }

    pub fn upsert(&self, grant: DeviceGrant) -> Result<(), StoreError> {
        let key = (grant.identity.clone(), grant.capability.clone());
        let mut grants = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if grant.scope == Scope::Persistent {
            let mut next = grants.clone();
            next.insert(key, grant.clone());
            self.store.save_grants(&persistent_only(&next))?;
            *grants = next;
        } else {
            grants.insert(key, grant.clone());
        }

        tracing::info!(
            identity = %grant.identity,
            capability = %grant.capability,
            scope = grant.scope.as_str(),
            "device grant upserted"
        );
        Ok(())
    }

    pub fn lookup(&self, identity: &str, capability: &str) -> Option<DeviceGrant> {
        self.lookup_at(identity, capability, now_ms())
    }

    /// Expiry-aware lookup at an explicit instant. The wall-clock variant
    /// above is the production path; this one keeps expiry behavior
    /// deterministic under test.
    pub fn lookup_at(&self, identity: &str, capability: &str, now_ms: u64) -> Option<DeviceGrant> {
        let grants = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        grants
            .get(&(identity.to_string(), capability.to_string()))
            .filter(|grant| grant.is_live_at(now_ms))
            .cloned()
    }

    /// Explicit revocation, the only way a persistent grant dies. Returns
    /// whether a grant was actually removed.
    pub fn revoke(&self, identity: &str, capability: &str) -> Result<bool, StoreError> {
        let key = (identity.to_string(), capability.to_string());
        let mut grants = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match grants.get(&key).map(|grant| grant.scope) {
            None => Ok(false),
            Some(Scope::Persistent) => {
                let mut next = grants.clone();
                next.remove(&key);
                self.store.save_grants(&persistent_only(&next))?;
                *grants = next;
                tracing::info!(identity, capability, "persistent device grant revoked");
                Ok(true)
            }
            Some(_) => {
                grants.remove(&key);
                tracing::info!(identity, capability, "device grant revoked");
                Ok(true)
            }
        }
    }

    /// Live grants, expired entries filtered out.
    pub fn active_grants(&self) -> Vec<DeviceGrant> {
        let now = now_ms();
        let grants = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut active: Vec<DeviceGrant> = grants
            .values()
            .filter(|grant| grant.is_live_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            (&a.identity, &a.capability).cmp(&(&b.identity, &b.capability))
        });
        active
    }
}

fn persistent_only(grants: &HashMap<(String, String), DeviceGrant>) -> Vec<DeviceGrant> {
    grants
        .values()
        .filter(|grant| grant.scope == Scope::Persistent)
        .cloned()
        .collect()
}
