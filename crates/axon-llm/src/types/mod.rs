//! Canonical request, response, and stream types
//!
//! The canonical shape follows the `OpenAI` chat completions layout; the
//! other dialects convert to and from it in [`crate::convert`].

mod message;
mod request;
mod response;
mod stream;
mod tool;

pub use message::{FunctionCall, Message, Role, ToolCall};
pub use request::CompletionRequest;
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall};
pub use tool::{FunctionDefinition, ToolDefinition};
