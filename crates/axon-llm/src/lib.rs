//! Unified streaming layer over heterogeneous LLM provider APIs
//!
//! Canonical request/response types live in [`types`]; per-provider wire
//! structs in [`protocol`]; conversions between the two in [`convert`].
//! [`ProviderRequest`] binds a canonical request to one dialect,
//! [`UpstreamClient`] opens the HTTP stream, and [`StreamAdapter`] turns
//! provider bytes into caller-facing SSE frames plus a buffered turn outcome.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod client;
pub mod convert;
pub mod error;
pub mod protocol;
pub mod request;
pub mod types;

pub use adapter::{AdapterOptions, StreamAdapter, TurnOutcome, error_frame, DONE_FRAME};
pub use client::{ByteStream, HttpProviderClient, UpstreamClient};
pub use error::LlmError;
pub use request::ProviderRequest;
