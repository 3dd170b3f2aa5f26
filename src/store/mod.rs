pub mod file;

pub use file::TomlStore;

use crate::broker::grants::DeviceGrant;
use crate::broker::request::PermissionRequest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode: {0}")]
    Encode(String),
}

/// Persistence boundary for broker state.
///
/// The broker is storage-agnostic: ledgers write through whatever backend
/// the embedder supplies. Load failures at startup are tolerated (the
/// ledgers start empty); save failures during operation propagate so
/// callers can fail closed.
pub trait StateStore: Send + Sync {
    fn load_requests(&self) -> Result<Vec<PermissionRequest>, StoreError>;
    fn save_requests(&self, requests: &[PermissionRequest]) -> Result<(), StoreError>;
    fn load_grants(&self) -> Result<Vec<DeviceGrant>, StoreError>;
    fn save_grants(&self, grants: &[DeviceGrant]) -> Result<(), StoreError>;
}

/// Volatile backend for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore;

impl MemoryStore {
    pub fn new() -> Self {
        Self
    }
}

impl StateStore for MemoryStore {
    fn load_requests(&self) -> Result<Vec<PermissionRequest>, StoreError> {
        Ok(Vec::new())
    }

    fn save_requests(&self, _requests: &[PermissionRequest]) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_grants(&self) -> Result<Vec<DeviceGrant>, StoreError> {
        Ok(Vec::new())
    }

    fn save_grants(&self, _grants: &[DeviceGrant]) -> Result<(), StoreError> {
        Ok(())
    }
}
