//! Conversion between canonical types and `OpenAI` wire format
//!
//! The canonical shape mirrors this dialect, so conversion here is mostly
//! field-for-field.

use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiStreamChoice, OpenAiStreamChunk,
    OpenAiStreamDelta, OpenAiStreamFunctionCall, OpenAiStreamToolCall, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall,
    OpenAiUsage,
};
use crate::types::{
    CompletionRequest, FinishReason, FunctionCall, FunctionDefinition, Message, Role, StreamDelta, StreamEvent,
    StreamFunctionCall, StreamToolCall, ToolCall, ToolDefinition, Usage,
};

use super::parse_finish_reason;

// -- Outbound: canonical request -> OpenAI wire request --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream: if req.stream { Some(true) } else { None },
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| OpenAiTool {
                        tool_type: t.tool_type.clone(),
                        function: OpenAiFunction {
                            name: t.function.name.clone(),
                            description: t.function.description.clone(),
                            parameters: t.function.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            stream_options: if req.stream {
                Some(OpenAiStreamOptions { include_usage: true })
            } else {
                None
            },
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        });

        Self {
            role: role.to_owned(),
            content: if msg.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(msg.content.clone())
            },
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

// -- Inbound: OpenAI wire request -> canonical --

impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            tools: req.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|t| ToolDefinition {
                        tool_type: t.tool_type,
                        function: FunctionDefinition {
                            name: t.function.name,
                            description: t.function.description,
                            parameters: t.function.parameters,
                        },
                    })
                    .collect()
            }),
            stream: req.stream.unwrap_or(false),
        }
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        };

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    function: FunctionCall {
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    },
                })
                .collect()
        });

        Self {
            role,
            content: msg.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: msg.tool_call_id,
        }
    }
}

// -- Stream conversion --

/// Convert an `OpenAI` stream chunk into canonical stream events
pub fn openai_chunk_to_events(chunk: &OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for choice in &chunk.choices {
        events.push(StreamEvent::Delta(openai_stream_choice_to_delta(choice)));
    }

    if let Some(usage) = &chunk.usage {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }));
    }

    events
}

/// Convert an `OpenAI` stream choice to a canonical stream delta
fn openai_stream_choice_to_delta(choice: &OpenAiStreamChoice) -> StreamDelta {
    let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);

    let tool_call = choice
        .delta
        .tool_calls
        .as_ref()
        .and_then(|calls| calls.first())
        .map(|tc| StreamToolCall {
            index: tc.index,
            id: tc.id.clone(),
            function: tc.function.as_ref().map(|f| StreamFunctionCall {
                name: f.name.clone(),
                arguments: f.arguments.clone(),
            }),
        });

    StreamDelta {
        index: choice.index,
        content: choice.delta.content.clone(),
        tool_call,
        finish_reason,
    }
}

/// Render a canonical stream delta as an `OpenAI` stream chunk
pub fn delta_to_openai_chunk(delta: &StreamDelta, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    let tool_calls = delta.tool_call.as_ref().map(|tc| {
        vec![OpenAiStreamToolCall {
            index: tc.index,
            id: tc.id.clone(),
            tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
            function: tc.function.as_ref().map(|f| OpenAiStreamFunctionCall {
                name: f.name.clone(),
                arguments: f.arguments.clone(),
            }),
        }]
    });

    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![OpenAiStreamChoice {
            index: delta.index,
            delta: OpenAiStreamDelta {
                role: None,
                content: delta.content.clone(),
                tool_calls,
            },
            finish_reason: delta.finish_reason.map(|fr| fr.as_str().to_owned()),
        }],
        usage: None,
    }
}

/// Render fully buffered tool calls as a single `OpenAI` stream chunk
///
/// Emitted once per turn at tool-call completion with complete argument
/// strings and `finish_reason: "tool_calls"`.
pub fn tool_calls_to_openai_chunk(calls: &[ToolCall], id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    #[allow(clippy::cast_possible_truncation)]
    let tool_calls = calls
        .iter()
        .enumerate()
        .map(|(i, tc)| OpenAiStreamToolCall {
            index: i as u32,
            id: Some(tc.id.clone()),
            tool_type: Some("function".to_owned()),
            function: Some(OpenAiStreamFunctionCall {
                name: Some(tc.function.name.clone()),
                arguments: Some(tc.function.arguments.clone()),
            }),
        })
        .collect();

    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta: OpenAiStreamDelta {
                role: None,
                content: None,
                tool_calls: Some(tool_calls),
            },
            finish_reason: Some(FinishReason::ToolCalls.as_str().to_owned()),
        }],
        usage: None,
    }
}

/// Render canonical usage as an `OpenAI` stream chunk with no choices
pub fn usage_to_openai_chunk(usage: &Usage, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![],
        usage: Some(OpenAiUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request_with_tools() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_owned(),
            messages: vec![
                Message::system("Be terse."),
                Message::user("What is the weather in Berlin?"),
                Message::assistant(
                    "",
                    vec![ToolCall {
                        id: "call_1".to_owned(),
                        function: FunctionCall {
                            name: "get_weather".to_owned(),
                            arguments: r#"{"location":"Berlin"}"#.to_owned(),
                        },
                    }],
                ),
                Message::tool("call_1", "12C, overcast"),
            ],
            temperature: Some(0.2),
            max_tokens: Some(512),
            tools: Some(vec![ToolDefinition {
                tool_type: "function".to_owned(),
                function: FunctionDefinition {
                    name: "get_weather".to_owned(),
                    description: Some("Current weather".to_owned()),
                    parameters: Some(serde_json::json!({"type": "object"})),
                },
            }]),
            stream: true,
        }
    }

    #[test]
    fn request_round_trips() {
        let original = request_with_tools();
        let wire = OpenAiRequest::from(&original);
        let back = CompletionRequest::from(wire);

        assert_eq!(back.model, original.model);
        assert_eq!(back.messages.len(), original.messages.len());
        assert_eq!(back.temperature, original.temperature);
        assert_eq!(back.max_tokens, original.max_tokens);
        assert!(back.stream);

        let assistant = &back.messages[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].id, "call_1");

        let tool = &back.messages[3];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool.content, "12C, overcast");
    }

    #[test]
    fn streaming_request_asks_for_usage() {
        let wire = OpenAiRequest::from(&request_with_tools());
        assert!(wire.stream_options.unwrap().include_usage);
    }

    #[test]
    fn chunk_decodes_to_content_delta() {
        let chunk: OpenAiStreamChunk = serde_json::from_str(
            r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4o",
                "choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
        )
        .unwrap();

        let events = openai_chunk_to_events(&chunk);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Delta(delta) => assert_eq!(delta.content.as_deref(), Some("Hello")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn consolidated_tool_chunk_carries_complete_arguments() {
        let calls = vec![ToolCall {
            id: "call_9".to_owned(),
            function: FunctionCall {
                name: "get_weather".to_owned(),
                arguments: r#"{"location":"SF"}"#.to_owned(),
            },
        }];

        let chunk = tool_calls_to_openai_chunk(&calls, "c1", "gpt-4o", 1);
        let choice = &chunk.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));

        let wire_calls = choice.delta.tool_calls.as_ref().unwrap();
        let args = wire_calls[0].function.as_ref().unwrap().arguments.as_ref().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(args).unwrap();
        assert!(parsed.is_object());
    }
}
