use serde::{Deserialize, Serialize};

use super::message::ToolCall;

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of turn
    Stop,
    /// Token limit reached (also used for budget truncation)
    Length,
    /// Model requested tool invocations
    ToolCalls,
    /// Provider safety filter intervened
    ContentFilter,
}

impl FinishReason {
    /// Wire string as it appears in `OpenAI`-shaped chunks
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Fold another usage report into this one
    ///
    /// Providers disagree on whether usage arrives once at stream end or
    /// cumulatively along the way, so aggregation takes the element-wise
    /// maximum and never loses a reported count. The total is recomputed
    /// when the provider's own total falls short of the component sum.
    pub fn absorb(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.max(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(other.completion_tokens);
        self.total_tokens = self
            .total_tokens
            .max(other.total_tokens)
            .max(self.prompt_tokens + self.completion_tokens);
    }
}

/// Canonical non-streaming completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response identifier
    pub id: String,
    /// Object type (always "chat.completion")
    pub object: String,
    /// Creation timestamp (unix seconds)
    pub created: u64,
    /// Model that produced the response
    pub model: String,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One generated choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: ChoiceMessage,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Message within a response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Role (always "assistant")
    pub role: String,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_absorb_takes_element_wise_max() {
        let mut usage = Usage {
            prompt_tokens: 25,
            completion_tokens: 0,
            total_tokens: 0,
        };
        usage.absorb(Usage {
            prompt_tokens: 0,
            completion_tokens: 20,
            total_tokens: 0,
        });
        assert_eq!(usage.prompt_tokens, 25);
        assert_eq!(usage.completion_tokens, 20);
        assert_eq!(usage.total_tokens, 45);
    }

    #[test]
    fn usage_absorb_keeps_larger_provider_total() {
        let mut usage = Usage::default();
        usage.absorb(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 18,
        });
        assert_eq!(usage.total_tokens, 18);
    }
}
