//! Tool dispatch: buffered tool calls in, tool messages out
//!
//! Resolution and argument failures never abort the interaction; they are
//! rendered as instructive tool messages the model reads and corrects on the
//! next turn. Only cancellation crosses the dispatch boundary as an error.

use std::sync::Arc;

use axon_core::{FunctionRegistry, ToolError};
use axon_llm::types::{Message, ToolCall};
use tokio_util::sync::CancellationToken;

/// Resolves and invokes one tool call at a time
pub struct FunctionDispatcher {
    registry: Arc<dyn FunctionRegistry>,
}

impl FunctionDispatcher {
    pub fn new(registry: Arc<dyn FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// Turn one tool call into the tool message fed back to the model
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Cancelled` when the token fires mid-invocation;
    /// every other failure is folded into the returned message.
    pub async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<Message, ToolError> {
        let name = call.function.name.as_str();

        let Some(tool) = self.registry.lookup(name) else {
            let available: Vec<&str> = self.registry.list().iter().map(|d| d.name.as_str()).collect();
            tracing::warn!(tool = name, "model requested an unregistered tool");
            return Ok(Message::tool(
                &call.id,
                format!(
                    "Error: unknown tool '{name}'. Available tools: {}.",
                    available.join(", ")
                ),
            ));
        };

        let arguments = match parse_arguments(name, &call.function.arguments) {
            Ok(arguments) => arguments,
            Err(correction) => return Ok(Message::tool(&call.id, correction)),
        };

        tracing::debug!(tool = name, "invoking tool");

        let result = tokio::select! {
            () = cancel.cancelled() => return Err(ToolError::Cancelled),
            result = tool.invoke(arguments) => result,
        };

        match result {
            Ok(value) => Ok(Message::tool(&call.id, render_value(&value))),
            Err(ToolError::Cancelled) => Err(ToolError::Cancelled),
            Err(ToolError::TypeMismatch { name, detail }) => {
                let schema = self
                    .registry
                    .descriptor(&name)
                    .map(|d| d.parameters_schema.to_string())
                    .unwrap_or_default();
                Ok(Message::tool(
                    &call.id,
                    format!(
                        "Error: arguments for tool '{name}' did not match the expected shape: {detail}. Expected schema: {schema}"
                    ),
                ))
            }
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool invocation failed");
                Ok(Message::tool(&call.id, format!("Error: {err}")))
            }
        }
    }
}

/// Decode the argument buffer, insisting on a JSON object
fn parse_arguments(name: &str, raw: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(format!(
            "Error: arguments for tool '{name}' must be a JSON object. Resend the call with an object."
        )),
        Err(e) => Err(format!(
            "Error: arguments were not valid JSON for tool '{name}': {e}. Resend the call with valid JSON."
        )),
    }
}

/// Tool output as message content; bare strings lose their quotes
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use axon_core::{StaticFunctionRegistry, ToolDescriptor};
    use axon_llm::types::FunctionCall;

    use super::*;

    fn weather_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_weather".to_owned(),
            description: "Current weather for a location".to_owned(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
            side_effect_free: true,
        }
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_owned(),
            function: FunctionCall {
                name: name.to_owned(),
                arguments: arguments.to_owned(),
            },
        }
    }

    fn dispatcher() -> FunctionDispatcher {
        let registry = StaticFunctionRegistry::new().with_fn(weather_descriptor(), |args| async move {
            let location = args["location"]
                .as_str()
                .ok_or_else(|| ToolError::TypeMismatch {
                    name: "get_weather".to_owned(),
                    detail: "location must be a string".to_owned(),
                })?
                .to_owned();
            Ok(serde_json::json!(format!("18°C in {location}")))
        });
        FunctionDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn successful_invocation_returns_bare_text() {
        let message = dispatcher()
            .dispatch(&call("get_weather", r#"{"location": "Paris"}"#), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content, "18°C in Paris");
    }

    #[tokio::test]
    async fn unknown_tool_lists_what_is_registered() {
        let message = dispatcher()
            .dispatch(&call("get_wether", "{}"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(message.content.contains("unknown tool 'get_wether'"));
        assert!(message.content.contains("get_weather"));
    }

    #[tokio::test]
    async fn invalid_json_arguments_produce_a_correction() {
        let message = dispatcher()
            .dispatch(&call("get_weather", r#"{"location": "#), &CancellationToken::new())
            .await
            .unwrap();

        assert!(message.content.contains("not valid JSON"));
        assert!(message.content.contains("get_weather"));
    }

    #[tokio::test]
    async fn non_object_arguments_produce_a_correction() {
        let message = dispatcher()
            .dispatch(&call("get_weather", r#""Paris""#), &CancellationToken::new())
            .await
            .unwrap();

        assert!(message.content.contains("must be a JSON object"));
    }

    #[tokio::test]
    async fn type_mismatch_includes_the_schema() {
        let message = dispatcher()
            .dispatch(&call("get_weather", r#"{"location": 42}"#), &CancellationToken::new())
            .await
            .unwrap();

        assert!(message.content.contains("did not match the expected shape"));
        assert!(message.content.contains("\"required\""));
    }

    #[tokio::test]
    async fn runtime_errors_are_recorded_verbatim() {
        let descriptor = ToolDescriptor {
            name: "flaky".to_owned(),
            description: "Always fails".to_owned(),
            parameters_schema: serde_json::json!({"type": "object"}),
            side_effect_free: true,
        };
        let registry = StaticFunctionRegistry::new().with_fn(descriptor, |_| async move {
            Err(ToolError::Runtime {
                name: "flaky".to_owned(),
                detail: "disk on fire".to_owned(),
            })
        });

        let message = FunctionDispatcher::new(Arc::new(registry))
            .dispatch(&call("flaky", "{}"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(message.content.contains("disk on fire"));
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let descriptor = ToolDescriptor {
            name: "slow".to_owned(),
            description: "Never finishes".to_owned(),
            parameters_schema: serde_json::json!({"type": "object"}),
            side_effect_free: true,
        };
        let registry = StaticFunctionRegistry::new().with_fn(descriptor, |_| async move {
            std::future::pending::<()>().await;
            Ok(serde_json::Value::Null)
        });

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = FunctionDispatcher::new(Arc::new(registry))
            .dispatch(&call("slow", "{}"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }
}
