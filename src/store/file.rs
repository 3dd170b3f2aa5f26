use super::{StateStore, StoreError};
use crate::broker::grants::DeviceGrant;
use crate::broker::request::PermissionRequest;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default)]
struct RequestFile {
    #[serde(default)]
    requests: Vec<PermissionRequest>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GrantFile {
    #[serde(default)]
    grants: Vec<DeviceGrant>,
}

/// TOML-file backend: `requests.toml` and `grants.toml` under one directory.
///
/// Unparseable files are logged and treated as empty rather than bricking
/// the broker; missing files mean a fresh install. Written files are
/// chmod 0600 on unix.
#[derive(Debug, Clone)]
pub struct TomlStore {
    requests_path: PathBuf,
    grants_path: PathBuf,
}

impl TomlStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            requests_path: dir.join("requests.toml"),
            grants_path: dir.join("grants.toml"),
        }
    }

    fn read<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(T::default());
            }
            Err(error) => return Err(error.into()),
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        match toml::from_str(&content) {
            Ok(parsed) => Ok(parsed),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "failed to parse broker state file; starting empty"
                );
                Ok(T::default())
            }
        }
    }

    fn write<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
        let content = toml::to_string(data).map_err(|error| StoreError::Encode(error.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl StateStore for TomlStore {
    fn load_requests(&self) -> Result<Vec<PermissionRequest>, StoreError> {
        Self::read::<RequestFile>(&self.requests_path).map(|file| file.requests)
    }

    fn save_requests(&self, requests: &[PermissionRequest]) -> Result<(), StoreError> {
        Self::write(
            &self.requests_path,
            &RequestFile {
                requests: requests.to_vec(),
            },
        )
    }

    fn load_grants(&self) -> Result<Vec<DeviceGrant>, StoreError> {
        Self::read::<GrantFile>(&self.grants_path).map(|file| file.grants)
    }

    fn save_grants(&self, grants: &[DeviceGrant]) -> Result<(), StoreError> {
        Self::write(
            &self.grants_path,
            &GrantFile {
                grants: grants.to_vec(),
            },
        )
    }
}
