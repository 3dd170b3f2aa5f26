//! Reuse resolution: return an existing request instead of re-prompting,
//! without ever letting one approval cover an unrelated action.
//!
//! Both lookups are pure scans over the ledger's insertion-ordered
//! snapshot, newest first, so `created_at` ties break by insertion order.

use crate::broker::request::{PermissionRequest, RequestStatus, Scope};

/// Most recent still-pending request for the same (tool, identity,
/// capability), so near-simultaneous callers share one prompt. Blank
/// identity never matches: anonymous calls always prompt.
pub(crate) fn find_recent_pending<'a>(
    requests: &'a [PermissionRequest],
    tool: &str,
    identity: &str,
    capability: &str,
) -> Option<&'a PermissionRequest> {
    if identity.trim().is_empty() {
        return None;
    }

    requests.iter().rev().find(|request| {
        request.status == RequestStatus::Pending
            && request.tool == tool
            && request.identity == identity
            && request.capability == capability
    })
}

/// Most recent approved request matching the tuple at **exactly** the
/// requested scope and still inside that scope's validity window, measured
/// from `created_at`. Reuse never escalates scope, never matches `once`
/// (single use), and never matches consumed or anonymous requests.
pub(crate) fn find_reusable_approved<'a>(
    requests: &'a [PermissionRequest],
    tool: &str,
    scope: Scope,
    identity: &str,
    capability: &str,
    validity_ms: Option<u64>,
    now_ms: u64,
) -> Option<&'a PermissionRequest> {
    if identity.trim().is_empty() || scope == Scope::Once {
        return None;
    }

    requests.iter().rev().find(|request| {
        request.status == RequestStatus::Approved
            && !request.used
            && request.tool == tool
            && request.scope == scope
            && request.identity == identity
            && request.capability == capability
            && validity_ms.is_none_or(|window| now_ms <= request.created_at.saturating_add(window))
    })
}
