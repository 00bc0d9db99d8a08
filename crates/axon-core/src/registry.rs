//! Model registry and credential resolution

use std::collections::HashMap;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Wire dialect spoken by an upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// OpenAI chat completions API (also the canonical internal shape)
    Openai,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
}

impl Dialect {
    /// Short name as used in configuration and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record describing where and how to reach a registered model
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    /// Base URL of the provider API
    pub endpoint: Url,
    /// Wire dialect the provider speaks
    pub dialect: Dialect,
    /// Key handed to the `SecretResolver` for the API credential
    pub credential_key: String,
    /// Extra headers sent with every request to this endpoint
    pub default_headers: Vec<(String, String)>,
}

/// Lookup of model names to endpoint records
///
/// Immutable after startup; lookups may happen concurrently without locking.
pub trait LanguageModelRegistry: Send + Sync {
    /// Resolve a model name to its endpoint record
    fn lookup(&self, model: &str) -> Option<ModelEndpoint>;

    /// All registered model names, in registration order
    fn models(&self) -> Vec<String>;
}

/// Registry backed by a fixed table built at startup
pub struct StaticModelRegistry {
    entries: IndexMap<String, ModelEndpoint>,
}

impl StaticModelRegistry {
    /// Build from an ordered table of model name -> endpoint
    pub fn new(entries: IndexMap<String, ModelEndpoint>) -> Self {
        Self { entries }
    }
}

impl LanguageModelRegistry for StaticModelRegistry {
    fn lookup(&self, model: &str) -> Option<ModelEndpoint> {
        self.entries.get(model).cloned()
    }

    fn models(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Resolution of credential keys to secret values
pub trait SecretResolver: Send + Sync {
    /// Resolve a credential key to its secret, if known
    fn resolve(&self, credential_key: &str) -> Option<SecretString>;
}

/// Resolver that reads credentials from process environment variables
///
/// The credential key is the environment variable name. An optional static
/// override table takes precedence, which keeps tests hermetic.
#[derive(Default)]
pub struct EnvSecretResolver {
    overrides: HashMap<String, SecretString>,
}

impl EnvSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static credential that shadows the environment
    #[must_use]
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), SecretString::from(value.into()));
        self
    }
}

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, credential_key: &str) -> Option<SecretString> {
        if let Some(secret) = self.overrides.get(credential_key) {
            return Some(secret.clone());
        }
        std::env::var(credential_key).ok().map(SecretString::from)
    }
}
