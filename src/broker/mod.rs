pub mod grants;
pub mod request;
pub mod requests;
pub mod reuse;
pub mod sequencer;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::events::{BrokerEvent, EventReceiver, EventSender, event_bus};
use crate::store::{MemoryStore, StateStore};
use grants::{DeviceGrant, GrantLedger};
use request::{PermissionRequest, RequestStatus, Scope, now_ms};
use requests::{RequestLedger, StatusChange};
use sequencer::{PromptEntry, PromptSequencer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// The single public surface every resource-owning collaborator calls
/// before performing a sensitive action.
///
/// One broker instance owns its ledgers, sequencer, and event bus; pass it
/// (in an `Arc`) to collaborators rather than going through a global.
pub struct PermissionBroker {
    config: BrokerConfig,
    requests: RequestLedger,
    grants: GrantLedger,
    sequencer: PromptSequencer,
    events: EventSender,
}

impl PermissionBroker {
    pub fn new(config: BrokerConfig, store: Arc<dyn StateStore>) -> Self {
        let (events, _initial_rx) = event_bus(config.event_capacity);
        let sequencer = PromptSequencer::new(
            events.clone(),
            Duration::from_millis(config.prompt_debounce_ms),
        );

        Self {
            requests: RequestLedger::load(Arc::clone(&store)),
            grants: GrantLedger::load(store),
            sequencer,
            events,
            config,
        }
    }

    /// Broker with default config and no persistence.
    pub fn in_memory() -> Self {
        Self::new(BrokerConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Ask whether an action may proceed, creating and surfacing a prompt
    /// when no existing decision covers it.
    ///
    /// A still-pending request for the same (tool, identity, capability)
    /// is returned instead of a duplicate, and its prompt is re-surfaced.
    /// A fresh-enough approval at **exactly** the requested scope is
    /// returned without prompting at all. `once`-scope and anonymous calls
    /// always produce a new request.
    pub fn request_permission(
        &self,
        tool: &str,
        detail: &str,
        scope: Scope,
        identity: &str,
        capability: &str,
    ) -> Result<PermissionRequest> {
        let tool = tool.trim();
        if tool.is_empty() {
            tracing::warn!("permission request rejected: blank tool");
            return Err(BrokerError::Validation("tool must not be blank".into()));
        }
        if detail.chars().count() > self.config.max_detail_len {
            tracing::warn!(tool, "permission request rejected: oversized detail");
            return Err(BrokerError::Validation(format!(
                "detail exceeds {} characters",
                self.config.max_detail_len
            )));
        }

        if let Some(pending) = self.requests.with_snapshot(|snapshot| {
            reuse::find_recent_pending(snapshot, tool, identity, capability).cloned()
        }) {
            tracing::debug!(id = %pending.id, tool, "reusing pending permission request");
            self.sequencer
                .enqueue(prompt_entry(&pending), self.config.is_biometric(tool));
            return Ok(pending);
        }

        if scope != Scope::Once {
            let validity = self.config.scope_ttl_ms(scope);
            if let Some(approved) = self.requests.with_snapshot(|snapshot| {
                reuse::find_reusable_approved(
                    snapshot,
                    tool,
                    scope,
                    identity,
                    capability,
                    validity,
                    now_ms(),
                )
                .cloned()
            }) {
                tracing::debug!(id = %approved.id, tool, "reusing approved permission request");
                return Ok(approved);
            }
        }

        let request = self
            .requests
            .create(tool, detail, scope, identity, capability)?;
        self.sequencer
            .enqueue(prompt_entry(&request), self.config.is_biometric(tool));
        Ok(request)
    }

    /// Apply the user's decision.
    ///
    /// Unknown ids resolve to `Ok(None)`; repeating a decision is a no-op;
    /// flipping one is a `ConflictingResolution` error. A fresh approval of
    /// a device-scoped tool materializes a grant whose expiry is computed
    /// from the scope at *resolution* time.
    pub fn resolve(&self, id: &str, approved: bool) -> Result<Option<PermissionRequest>> {
        let status = if approved {
            RequestStatus::Approved
        } else {
            RequestStatus::Denied
        };

        let request = match self.requests.update_status(id, status)? {
            StatusChange::Unknown => {
                tracing::debug!(id, "resolve on unknown request id");
                return Ok(None);
            }
            StatusChange::Unchanged(request) => {
                self.sequencer.resolve(id);
                return Ok(Some(request));
            }
            StatusChange::Applied(request) => request,
        };

        self.sequencer.resolve(id);

        if approved
            && request.scope != Scope::Once
            && self.config.is_device_tool(&request.tool)
            && !request.identity.trim().is_empty()
        {
            let granted_at = now_ms();
            self.grants.upsert(DeviceGrant {
                identity: request.identity.clone(),
                capability: request.capability.clone(),
                scope: request.scope,
                created_at: granted_at,
                expires_at: self
                    .config
                    .scope_ttl_ms(request.scope)
                    .map(|ttl| granted_at.saturating_add(ttl)),
            })?;
        }

        let _ = self.events.send(BrokerEvent::PromptResolved {
            id: request.id.clone(),
            status,
        });
        Ok(Some(request))
    }

    /// Admission probe; applies the consumption policy for `once` scope.
    pub fn is_approved(&self, id: &str, consume: bool) -> bool {
        self.requests.admit(id, consume)
    }

    pub fn has_grant(&self, identity: &str, capability: &str) -> bool {
        self.grants.lookup(identity, capability).is_some()
    }

    /// Expiry probe at an explicit instant, for audit surfaces and tests.
    pub fn has_grant_at(&self, identity: &str, capability: &str, now_ms: u64) -> bool {
        self.grants.lookup_at(identity, capability, now_ms).is_some()
    }

    pub fn revoke_grant(&self, identity: &str, capability: &str) -> Result<bool> {
        Ok(self.grants.revoke(identity, capability)?)
    }

    /// Wipe all permission requests and the prompt queue. Grants persist
    /// independently once materialized — durable until revoked.
    pub fn clear_all(&self) -> Result<()> {
        self.requests.clear_all()?;
        self.sequencer.clear();
        Ok(())
    }

    pub fn get_request(&self, id: &str) -> Option<PermissionRequest> {
        self.requests.get(id)
    }

    pub fn pending_requests(&self) -> Vec<PermissionRequest> {
        self.requests.list_pending()
    }

    pub fn active_grants(&self) -> Vec<DeviceGrant> {
        self.grants.active_grants()
    }

    pub fn active_prompt(&self) -> Option<PromptEntry> {
        self.sequencer.active_prompt()
    }

    pub fn prompts_waiting(&self) -> usize {
        self.sequencer.waiting()
    }

    /// Subscribe to prompt and resolution events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Block until `id` reaches a terminal status or the timeout elapses.
    ///
    /// Timing out is the caller giving up: the request stays pending and a
    /// later decision still lands. Unknown ids return `None` immediately.
    pub async fn wait_for_resolution(
        &self,
        id: &str,
        timeout: Duration,
    ) -> Option<RequestStatus> {
        // Subscribe before reading so a resolution between the two can't
        // be missed.
        let mut rx = self.events.subscribe();

        let current = self.requests.get(id)?;
        if current.status.is_terminal() {
            return Some(current.status);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(BrokerEvent::PromptResolved { id: resolved, status })) if resolved == id => {
                    return Some(status);
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(_))) => {
                    // Dropped events may have included ours; re-check.
                    let request = self.requests.get(id)?;
                    if request.status.is_terminal() {
                        return Some(request.status);
                    }
                }
                Ok(Err(RecvError::Closed)) => return None,
                Err(_elapsed) => return None,
            }
        }
    }
}

fn prompt_entry(request: &PermissionRequest) -> PromptEntry {
    PromptEntry {
        id: request.id.clone(),
        tool: request.tool.clone(),
        detail: request.detail.clone(),
    }
}
