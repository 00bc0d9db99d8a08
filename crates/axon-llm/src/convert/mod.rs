//! Conversions between canonical types and provider wire formats
//!
//! Request conversion is lossless for the supported feature set: converting
//! a canonical request to a dialect and back preserves every semantically
//! significant field. Stream conversion turns each dialect's SSE events into
//! canonical [`crate::types::StreamEvent`]s.

pub mod anthropic;
pub mod google;
pub mod openai;

use crate::types::FinishReason;

/// Parse a finish reason string from any dialect
pub(crate) fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" | "end_turn" | "STOP" => Some(FinishReason::Stop),
        "length" | "max_tokens" | "MAX_TOKENS" => Some(FinishReason::Length),
        "tool_calls" | "tool_use" => Some(FinishReason::ToolCalls),
        "content_filter" | "SAFETY" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}
