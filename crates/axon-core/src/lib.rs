//! Shared interfaces consumed by the axon core
//!
//! The streaming proxy and agent loop are written against these traits;
//! concrete registries and stores are built once at startup and injected,
//! never mutated afterwards.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod function;
pub mod registry;
pub mod store;

pub use function::{
    FunctionRegistry, StaticFunctionRegistry, ToolDescriptor, ToolError, ToolFunction,
};
pub use registry::{
    Dialect, EnvSecretResolver, LanguageModelRegistry, ModelEndpoint, SecretResolver,
    StaticModelRegistry,
};
pub use store::{AuditEntry, JsonlSessionStore, MemorySessionStore, SessionStore, TurnRecord};
