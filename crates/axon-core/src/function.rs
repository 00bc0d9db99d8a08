//! Function registry: declarative tool descriptors plus invocation closures
//!
//! Entries are constructed at startup; no runtime type introspection happens
//! at call time. Tool implementations never see agent objects, only the
//! opaque registry handle, which keeps agent-calls-agent wiring acyclic.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by tool resolution and invocation
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under the requested name
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Arguments decoded as JSON but did not match the expected shape
    #[error("type mismatch for tool {name}: {detail}")]
    TypeMismatch { name: String, detail: String },

    /// Tool body failed at runtime
    #[error("tool {name} failed: {detail}")]
    Runtime { name: String, detail: String },

    /// Invocation was cancelled
    #[error("tool invocation cancelled")]
    Cancelled,
}

/// Declarative description of a callable tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name as the model sees it
    pub name: String,
    /// Human-readable description given to the model
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters_schema: serde_json::Value,
    /// Whether concurrent invocation is safe
    #[serde(default)]
    pub side_effect_free: bool,
}

/// An invokable tool
#[async_trait]
pub trait ToolFunction: Send + Sync {
    /// Invoke with decoded JSON arguments
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>;

/// Tool built from a plain async closure
struct ClosureTool {
    invoke: Box<dyn Fn(serde_json::Value) -> BoxedToolFuture + Send + Sync>,
}

#[async_trait]
impl ToolFunction for ClosureTool {
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        (self.invoke)(arguments).await
    }
}

/// Resolution of tool names to descriptors and invokables
///
/// Read-only after startup; lookups are lock-free.
pub trait FunctionRegistry: Send + Sync {
    /// Resolve a tool name to its invokable
    fn lookup(&self, name: &str) -> Option<Arc<dyn ToolFunction>>;

    /// Descriptor for a registered tool
    fn descriptor(&self, name: &str) -> Option<&ToolDescriptor>;

    /// All registered descriptors, in registration order
    fn list(&self) -> Vec<&ToolDescriptor>;
}

/// Registry backed by a fixed table built at startup
#[derive(Default)]
pub struct StaticFunctionRegistry {
    order: Vec<String>,
    descriptors: HashMap<String, ToolDescriptor>,
    tools: HashMap<String, Arc<dyn ToolFunction>>,
}

impl StaticFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor with its invokable
    #[must_use]
    pub fn with_tool(mut self, descriptor: ToolDescriptor, tool: Arc<dyn ToolFunction>) -> Self {
        self.order.push(descriptor.name.clone());
        self.tools.insert(descriptor.name.clone(), tool);
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self
    }

    /// Register a descriptor with an async closure body
    #[must_use]
    pub fn with_fn<F, Fut>(self, descriptor: ToolDescriptor, body: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        let tool = ClosureTool {
            invoke: Box::new(move |args| Box::pin(body(args))),
        };
        self.with_tool(descriptor, Arc::new(tool))
    }
}

impl FunctionRegistry for StaticFunctionRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ToolFunction>> {
        self.tools.get(name).map(Arc::clone)
    }

    fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    fn list(&self) -> Vec<&ToolDescriptor> {
        self.order.iter().filter_map(|n| self.descriptors.get(n)).collect()
    }
}
