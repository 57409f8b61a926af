//! Runtime configuration.
//!
//! Everything external the pipeline needs (model endpoint, credentials,
//! timeouts, turn budget, capability launch parameters) lives in one
//! explicit object constructed at process start and passed to the
//! coordinator. There is no import-time or global configuration state.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::{default_capability_sets, CapabilityRegistry, CapabilitySet};

/// Complete runtime configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Model identifier sent to the reasoning API.
    pub model: String,
    /// Base URL of the reasoning API.
    pub api_endpoint: String,
    /// API key for the reasoning API. Loaded from config or environment,
    /// never hardcoded.
    pub api_key: Option<String>,
    /// Ceiling on tool-call/result cycles within one worker turn.
    pub max_tool_cycles: u32,
    /// How long to wait for each reasoner decision, in seconds.
    pub reasoner_timeout_secs: u64,
    /// How long to wait for a tool-server handshake at open, in seconds.
    pub connect_timeout_secs: u64,
    /// Grace period before a closing tool server is force-killed, in seconds.
    pub shutdown_grace_secs: u64,
    /// Capability sets available to workers. Defaults cover search, browser
    /// automation, and sequential thinking.
    pub capabilities: Vec<CapabilitySet>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            max_tool_cycles: 12,
            reasoner_timeout_secs: 120,
            connect_timeout_secs: 30,
            shutdown_grace_secs: 5,
            capabilities: default_capability_sets(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        let config: RuntimeConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;
        log::info!(
            "[Config] Loaded {} ({} capability sets, model {})",
            path.display(),
            config.capabilities.len(),
            config.model
        );
        Ok(config)
    }

    /// Build the read-only capability registry from this config.
    pub fn capability_registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(self.capabilities.clone())
    }

    pub fn reasoner_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoner_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
