//! Error taxonomy for provider requests, streaming, and tool dispatch

use http::StatusCode;
use thiserror::Error;

/// Errors raised while talking to providers and adapting their streams
#[derive(Debug, Error)]
pub enum LlmError {
    /// Requested model is not in the registry
    #[error("model not found: {model}")]
    ModelNotFound {
        /// Model name the caller asked for
        model: String,
    },

    /// Credential key resolved to nothing
    #[error("missing credential: {key}")]
    MissingCredential {
        /// Key handed to the secret resolver
        key: String,
    },

    /// Operation is not defined for the requested dialect
    #[error("unsupported dialect: {dialect}")]
    UnsupportedDialect {
        /// Dialect name
        dialect: String,
    },

    /// Upstream could not be reached at all
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream answered with a non-2xx status
    #[error("upstream returned {status}: {message}")]
    UpstreamHttp {
        /// HTTP status from the provider
        status: StatusCode,
        /// Error message extracted from the response body
        message: String,
    },

    /// Per-turn deadline expired before the stream completed
    #[error("upstream deadline exceeded")]
    UpstreamTimeout,

    /// Stream bytes could not be framed or decoded
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// Buffered tool-call arguments did not decode as a JSON object
    #[error("tool call '{name}' has malformed arguments: {detail}")]
    MalformedToolArguments {
        /// Tool name the model asked for
        name: String,
        /// Decode failure detail
        detail: String,
    },

    /// Interaction was cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Stable type string used in caller-facing error chunks
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "model_not_found",
            Self::MissingCredential { .. } => "missing_credential",
            Self::UnsupportedDialect { .. } => "unsupported_dialect",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamHttp { .. } => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::MalformedStream(_) => "malformed_stream",
            Self::MalformedToolArguments { .. } => "malformed_tool_arguments",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the agent loop may continue after reporting this error to the model
    ///
    /// Malformed tool arguments are fed back as a corrective tool message so
    /// the model can retry; everything else tears the interaction down.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedToolArguments { .. })
    }
}
