//! Capability sets: named, versionless bundles of tools a worker may invoke,
//! with the launch parameters for the subprocess that serves them.
//!
//! Pure configuration with no runtime state. Default sets are defined as
//! data, not enum variants, so they can be overridden from the runtime
//! config without touching code.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DealdeskError, DealdeskResult};

/// Launch and call parameters for one tool-server subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySet {
    /// Unique capability name workers reference (e.g. "browser").
    pub name: String,
    /// Executable to spawn (resolved through PATH at open time).
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the spawned process, if any.
    pub working_dir: Option<PathBuf>,
    /// Tool names this server exposes. Advisory; the server is the source
    /// of truth at runtime.
    pub tools: Vec<String>,
    /// Per-call timeout in seconds. Tool actions like page navigation can
    /// be slow, so the defaults are minutes-scale.
    pub call_timeout_secs: u64,
    /// Whether a worker bound to this set must abort its stage when the
    /// server cannot be started.
    pub required: bool,
}

impl CapabilitySet {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            working_dir: None,
            tools: Vec::new(),
            call_timeout_secs: 300,
            required: true,
        }
    }

    /// Declare the tools this server exposes.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Override the per-call timeout.
    pub fn with_call_timeout(mut self, secs: u64) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// Mark this set as optional: a start failure degrades the worker
    /// instead of failing its stage.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Resolve the launch command to an absolute path through PATH.
    ///
    /// Returns the command unresolved (and logs a warning) when the
    /// executable cannot be found; the spawn itself will then surface the
    /// start error with the real OS diagnostic.
    pub fn resolved_command(&self) -> PathBuf {
        match which::which(&self.command) {
            Ok(path) => path,
            Err(_) => {
                log::warn!(
                    "[Capability {}] executable '{}' not found on PATH",
                    self.name,
                    self.command
                );
                PathBuf::from(&self.command)
            }
        }
    }
}

/// Process-wide read-only registry of capability sets.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    sets: Vec<CapabilitySet>,
}

impl CapabilityRegistry {
    pub fn new(sets: Vec<CapabilitySet>) -> Self {
        Self { sets }
    }

    /// Look up a capability set by name.
    pub fn resolve(&self, name: &str) -> DealdeskResult<&CapabilitySet> {
        self.sets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DealdeskError::UnknownCapability(name.to_string()))
    }

    /// All registered set names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(default_capability_sets())
    }
}

/// The default capability sets:
/// - `search`: web search and URL fetch for the research specialists
/// - `browser`: Playwright-backed page automation for deep product dives
/// - `sequential_thinking`: scratchpad tool for structured reasoning
pub fn default_capability_sets() -> Vec<CapabilitySet> {
    vec![
        CapabilitySet::new(
            "search",
            "npx",
            vec!["-y".to_string(), "@dealdesk/search-server@latest".to_string()],
        )
        .with_tools(vec!["web_search".to_string(), "fetch_url".to_string()]),
        CapabilitySet::new(
            "browser",
            "npx",
            vec![
                "-y".to_string(),
                "@playwright/mcp@latest".to_string(),
                "--timeout-action".to_string(),
                "300000".to_string(),
                "--timeout-navigation".to_string(),
                "300000".to_string(),
            ],
        )
        .with_tools(vec![
            "browser_navigate".to_string(),
            "browser_snapshot".to_string(),
            "browser_click".to_string(),
        ]),
        CapabilitySet::new(
            "sequential_thinking",
            "npx",
            vec!["-y".to_string(), "mcp-sequential-thinking@latest".to_string()],
        )
        .with_tools(vec!["sequentialthinking".to_string()])
        .optional(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sets() {
        let sets = default_capability_sets();
        assert_eq!(sets.len(), 3);

        let browser = sets.iter().find(|s| s.name == "browser").unwrap();
        assert_eq!(browser.command, "npx");
        assert!(browser.required);
        assert_eq!(browser.call_timeout_secs, 300);

        let thinking = sets.iter().find(|s| s.name == "sequential_thinking").unwrap();
        assert!(!thinking.required);
    }

    #[test]
    fn test_registry_resolve() {
        let registry = CapabilityRegistry::default();
        assert!(registry.resolve("search").is_ok());

        let err = registry.resolve("telepathy").unwrap_err();
        assert!(matches!(err, DealdeskError::UnknownCapability(_)));
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn test_resolved_command_falls_back_when_missing() {
        let set = CapabilitySet::new("fake", "definitely-not-a-real-binary-xyz", vec![]);
        // Unresolvable commands pass through unchanged so the spawn error
        // carries the OS diagnostic.
        assert_eq!(
            set.resolved_command(),
            PathBuf::from("definitely-not-a-real-binary-xyz")
        );
    }
}
