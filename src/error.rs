use crate::broker::request::RequestStatus;
use crate::store::StoreError;
use thiserror::Error;

/// Structured error hierarchy for the permission broker.
///
/// Library callers can match on these to decide recovery strategy; internal
/// code continues to use `anyhow::Result` for ad-hoc context chains. Absence
/// (an unknown request id, identity, or capability) is never an error — those
/// paths return `None`/`false` instead.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed input rejected at the facade boundary. No request was
    /// created.
    #[error("validation: {0}")]
    Validation(String),

    /// A terminal request was asked to flip to the other terminal status.
    /// Repeating the *same* terminal status is a no-op, not this error.
    #[error("request {id} already resolved as {current}")]
    ConflictingResolution { id: String, current: RequestStatus },

    /// The persistence layer failed. Collaborators should treat this as
    /// "broker unavailable" and fail closed.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, BrokerError>;
