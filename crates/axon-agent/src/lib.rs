//! Agent execution loop over the unified streaming layer
//!
//! [`AgentLoop`] drives multi-turn interactions: it submits the message
//! stack upstream, streams the response to the caller, routes buffered tool
//! calls through [`FunctionDispatcher`], and flushes one audit entry per
//! interaction via [`AuditSink`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod audit;
pub mod dispatch;
pub mod runner;

pub use audit::AuditSink;
pub use dispatch::FunctionDispatcher;
pub use runner::{AgentLoop, RunContext};
