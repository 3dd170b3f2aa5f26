use serde::{Deserialize, Serialize};

/// Durability class of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Single use; consumed on first successful admission check.
    Once,
    /// Valid for the lifetime of one externally-defined run.
    Program,
    /// Valid until the user session ends.
    Session,
    /// Valid until explicitly revoked.
    Persistent,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Program => "program",
            Self::Session => "session",
            Self::Persistent => "persistent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// One permission decision in flight or settled.
///
/// `status` transitions only `pending → approved` or `pending → denied` and
/// never reverses. `used` is the one-shot consumption marker, kept separate
/// from `status` so an admitted `once`-scope request stays auditable as
/// approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    /// Feature class requesting access, e.g. `"device.camera"`, `"pip"`.
    pub tool: String,
    /// User-facing description of the specific action, bounded length.
    pub detail: String,
    /// Normalized token used as the reuse/grant key together with identity.
    pub capability: String,
    pub scope: Scope,
    /// Caller-supplied identity; blank means never reusable and never
    /// grant-eligible.
    pub identity: String,
    pub status: RequestStatus,
    /// Wall-clock milliseconds at creation.
    pub created_at: u64,
    #[serde(default)]
    pub used: bool,
}

impl PermissionRequest {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Wall-clock milliseconds since the unix epoch.
pub(crate) fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
