use crate::broker::request::Scope;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

// ── Broker configuration ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Upper bound on the user-facing `detail` string (default: 240)
    #[serde(default = "default_max_detail_len")]
    pub max_detail_len: usize,
    /// Validity window for `program`-scope approvals, seconds (default: 600)
    #[serde(default = "default_program_ttl_secs")]
    pub program_ttl_secs: u64,
    /// Validity window for `session`-scope approvals, seconds (default: 3600)
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Suppression window for re-showing the same prompt (default: 1500 ms)
    #[serde(default = "default_prompt_debounce_ms")]
    pub prompt_debounce_ms: u64,
    /// Broadcast event bus capacity (default: 64)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Tools whose prompts require an individual strong-auth ceremony and
    /// bypass the shared queue
    #[serde(default = "default_biometric_tools")]
    pub biometric_tools: HashSet<String>,
    /// Tools whose approvals materialize a device grant (default: "device.")
    #[serde(default = "default_device_tool_prefix")]
    pub device_tool_prefix: String,
}

fn default_max_detail_len() -> usize {
    240
}

fn default_program_ttl_secs() -> u64 {
    600
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_prompt_debounce_ms() -> u64 {
    1500
}

fn default_event_capacity() -> usize {
    64
}

fn default_biometric_tools() -> HashSet<String> {
    ["credentials", "ssh_keys", "ssh_pin"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_device_tool_prefix() -> String {
    "device.".into()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_detail_len: default_max_detail_len(),
            program_ttl_secs: default_program_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            prompt_debounce_ms: default_prompt_debounce_ms(),
            event_capacity: default_event_capacity(),
            biometric_tools: default_biometric_tools(),
            device_tool_prefix: default_device_tool_prefix(),
        }
    }
}

impl BrokerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read broker config '{}'", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse broker config '{}'", path.display()))
    }

    /// Validity window for a scope in milliseconds. `None` means unbounded
    /// (`once` is bounded by consumption, `persistent` by revocation).
    #[must_use]
    pub fn scope_ttl_ms(&self, scope: Scope) -> Option<u64> {
        match scope {
            Scope::Once | Scope::Persistent => None,
            Scope::Program => Some(self.program_ttl_secs.saturating_mul(1000)),
            Scope::Session => Some(self.session_ttl_secs.saturating_mul(1000)),
        }
    }

    #[must_use]
    pub fn is_biometric(&self, tool: &str) -> bool {
        self.biometric_tools.contains(tool)
    }

    #[must_use]
    pub fn is_device_tool(&self, tool: &str) -> bool {
        tool.starts_with(&self.device_tool_prefix)
    }
}
