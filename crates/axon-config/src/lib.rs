//! Configuration for the axon proxy and agent loop
//!
//! Loaded from TOML with `{{ env.VAR }}` expansion; validated before use.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod env;
mod loader;

pub use env::expand_env;

use axon_core::Dialect;
use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Registered models keyed by the name clients use
    #[serde(default)]
    pub models: IndexMap<String, ModelEndpointConfig>,
    /// Agent loop options
    #[serde(default)]
    pub agent: AgentOptions,
    /// Audit sink settings
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Endpoint record for a single registered model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEndpointConfig {
    /// Base URL of the provider API
    pub endpoint: Url,
    /// Wire dialect the provider speaks
    pub dialect: Dialect,
    /// Name of the credential handed to the secret resolver
    pub credential: String,
    /// Extra headers sent with every request to this endpoint
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Options recognized at agent loop construction
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentOptions {
    /// Agent display name recorded in audit rows
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// System prompt prepended to every interaction
    #[serde(default)]
    pub system_prompt: String,
    /// Upper bound on submit-dispatch cycles per interaction
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Deadline for a single upstream turn, in seconds
    #[serde(default = "default_per_turn_deadline")]
    pub per_turn_deadline_seconds: u64,
    /// Forward raw tool-call argument deltas to the caller sink
    #[serde(default)]
    pub relay_tool_use_events: bool,
    /// Forward intermediate usage chunks to the caller sink
    #[serde(default)]
    pub relay_usage_events: bool,
    /// Emit one `event: function_call` frame per buffered tool call
    #[serde(default = "default_true")]
    pub emit_function_announcements: bool,
    /// Request streaming responses from the upstream
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Sampling temperature passed through to the upstream
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Completion token cap passed through to the upstream
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: String::new(),
            max_turns: default_max_turns(),
            per_turn_deadline_seconds: default_per_turn_deadline(),
            relay_tool_use_events: false,
            relay_usage_events: false,
            emit_function_announcements: true,
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Audit sink settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Path of the JSONL audit log
    #[serde(default = "default_audit_path")]
    pub path: std::path::PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
        }
    }
}

fn default_agent_name() -> String {
    "assistant".to_owned()
}

const fn default_max_turns() -> u32 {
    4
}

const fn default_per_turn_deadline() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

fn default_audit_path() -> std::path::PathBuf {
    std::path::PathBuf::from("axon-audit.jsonl")
}
