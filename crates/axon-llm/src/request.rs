//! Dialect-bound provider request

use axon_core::Dialect;

use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::google::GoogleRequest;
use crate::protocol::openai::OpenAiRequest;
use crate::types::CompletionRequest;

/// A canonical request rendered into one provider's wire format
///
/// Construction is total: every registered dialect has a request mapping.
#[derive(Debug, Clone)]
pub enum ProviderRequest {
    /// `OpenAI` chat completions payload
    OpenAi(OpenAiRequest),
    /// Anthropic messages payload
    Anthropic(AnthropicRequest),
    /// Google `generateContent` payload
    Google(GoogleRequest),
}

impl ProviderRequest {
    /// Render a canonical request for the given dialect
    pub fn from_canonical(request: &CompletionRequest, dialect: Dialect) -> Self {
        match dialect {
            Dialect::Openai => Self::OpenAi(request.into()),
            Dialect::Anthropic => Self::Anthropic(request.into()),
            Dialect::Google => Self::Google(request.into()),
        }
    }

    /// Dialect this request is bound to
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::OpenAi(_) => Dialect::Openai,
            Self::Anthropic(_) => Dialect::Anthropic,
            Self::Google(_) => Dialect::Google,
        }
    }

    /// Serialize to the JSON body sent upstream
    pub fn to_wire(&self) -> Result<Vec<u8>, LlmError> {
        let bytes = match self {
            Self::OpenAi(req) => serde_json::to_vec(req),
            Self::Anthropic(req) => serde_json::to_vec(req),
            Self::Google(req) => serde_json::to_vec(req),
        };
        bytes.map_err(|e| LlmError::Internal(e.into()))
    }
}
