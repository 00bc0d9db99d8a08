//! Conversion between canonical types and Google Generative Language wire format

use crate::protocol::google::{
    GoogleContent, GoogleFunctionCall, GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleGenerationConfig,
    GooglePart, GoogleRequest, GoogleStreamChunk, GoogleTool,
};
use crate::types::{
    CompletionRequest, FunctionCall, FunctionDefinition, Message, Role, StreamDelta, StreamEvent, StreamFunctionCall,
    StreamToolCall, ToolCall, ToolDefinition, Usage,
};

use super::parse_finish_reason;

// -- Outbound: canonical request -> Google wire request --

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(GoogleContent {
                        role: None,
                        parts: vec![GooglePart::Text(msg.content.clone())],
                    });
                }
                Role::User => {
                    contents.push(canonical_message_to_google(msg, "user"));
                }
                Role::Assistant => {
                    contents.push(canonical_message_to_google(msg, "model"));
                }
                Role::Tool => {
                    // Google matches results to calls by function name; the
                    // synthesized call id `call_{name}` makes the name
                    // recoverable from the tool_call_id alone.
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        let name = tool_call_id.strip_prefix("call_").unwrap_or(tool_call_id);
                        let response = serde_json::from_str(&msg.content)
                            .unwrap_or_else(|_| serde_json::json!({"result": msg.content}));
                        contents.push(GoogleContent {
                            role: Some("function".to_owned()),
                            parts: vec![GooglePart::FunctionResponse(GoogleFunctionResponse {
                                name: name.to_owned(),
                                response,
                            })],
                        });
                    }
                }
            }
        }

        let generation_config = Some(GoogleGenerationConfig {
            temperature: req.temperature,
            max_output_tokens: req.max_tokens,
        });

        let tools = req.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        Self {
            contents,
            system_instruction,
            generation_config,
            tools,
        }
    }
}

/// Convert a canonical message to a Google content object
fn canonical_message_to_google(msg: &Message, role: &str) -> GoogleContent {
    let mut parts = Vec::new();

    if !msg.content.is_empty() {
        parts.push(GooglePart::Text(msg.content.clone()));
    }

    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            let args = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            parts.push(GooglePart::FunctionCall(GoogleFunctionCall {
                name: tc.function.name.clone(),
                args,
            }));
        }
    }

    // Google rejects content objects with no parts
    if parts.is_empty() {
        parts.push(GooglePart::Text(String::new()));
    }

    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

// -- Inbound: Google wire request -> canonical --

impl From<GoogleRequest> for CompletionRequest {
    fn from(req: GoogleRequest) -> Self {
        let mut messages = Vec::new();

        if let Some(system) = req.system_instruction {
            messages.push(Message::system(google_parts_to_text(&system.parts)));
        }

        for content in req.contents {
            messages.extend(google_content_to_canonical(content));
        }

        let (temperature, max_tokens) = req
            .generation_config
            .map_or((None, None), |gc| (gc.temperature, gc.max_output_tokens));

        let tools: Vec<ToolDefinition> = req
            .tools
            .into_iter()
            .flatten()
            .flat_map(|t| t.function_declarations)
            .map(|decl| ToolDefinition {
                tool_type: "function".to_owned(),
                function: FunctionDefinition {
                    name: decl.name,
                    description: decl.description,
                    parameters: decl.parameters,
                },
            })
            .collect();

        Self {
            model: String::new(),
            messages,
            temperature,
            max_tokens,
            tools: if tools.is_empty() { None } else { Some(tools) },
            stream: false,
        }
    }
}

fn google_parts_to_text(parts: &[GooglePart]) -> String {
    let mut text = String::new();
    for part in parts {
        if let GooglePart::Text(t) = part {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }
    }
    text
}

/// Convert one Google content object into canonical messages
fn google_content_to_canonical(content: GoogleContent) -> Vec<Message> {
    let role = match content.role.as_deref() {
        Some("model") => Role::Assistant,
        Some("function") => Role::Tool,
        _ => Role::User,
    };

    let mut out = Vec::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in content.parts {
        match part {
            GooglePart::Text(t) => {
                if t.is_empty() {
                    continue;
                }
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            GooglePart::FunctionCall(fc) => {
                let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall {
                    id: format!("call_{}", fc.name),
                    function: FunctionCall {
                        name: fc.name,
                        arguments,
                    },
                });
            }
            GooglePart::FunctionResponse(fr) => {
                let content = fr
                    .response
                    .get("result")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(
                        || serde_json::to_string(&fr.response).unwrap_or_default(),
                        ToOwned::to_owned,
                    );
                out.push(Message::tool(format!("call_{}", fr.name), content));
            }
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        out.push(Message {
            role,
            content: text,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        });
    }

    out
}

// -- Stream conversion --

/// State tracker for decoding a Google event stream
///
/// Google delivers function calls whole, one complete call per part, so the
/// only state needed is the running tool-call index.
#[derive(Debug, Default)]
pub struct GoogleStreamState {
    next_tool_call_index: u32,
    saw_function_call: bool,
}

impl GoogleStreamState {
    /// Create a new stream state tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a Google streaming chunk to canonical stream events
    pub fn convert_chunk(&mut self, chunk: &GoogleStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        for candidate in &chunk.candidates {
            for part in &candidate.content.parts {
                match part {
                    GooglePart::Text(text) => {
                        events.push(StreamEvent::Delta(StreamDelta {
                            index: 0,
                            content: Some(text.clone()),
                            tool_call: None,
                            finish_reason: None,
                        }));
                    }
                    GooglePart::FunctionCall(fc) => {
                        self.saw_function_call = true;
                        let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                        let index = self.next_tool_call_index;
                        self.next_tool_call_index += 1;
                        events.push(StreamEvent::Delta(StreamDelta {
                            index: 0,
                            content: None,
                            tool_call: Some(StreamToolCall {
                                index,
                                id: Some(format!("call_{}", fc.name)),
                                function: Some(StreamFunctionCall {
                                    name: Some(fc.name.clone()),
                                    arguments: Some(arguments),
                                }),
                            }),
                            finish_reason: None,
                        }));
                    }
                    GooglePart::FunctionResponse(_) => {}
                }
            }

            // Google reports STOP even when the turn ended on function calls
            let finish_reason = candidate.finish_reason.as_deref().and_then(parse_finish_reason).map(|fr| {
                if self.saw_function_call && fr == crate::types::FinishReason::Stop {
                    crate::types::FinishReason::ToolCalls
                } else {
                    fr
                }
            });

            if finish_reason.is_some() {
                events.push(StreamEvent::Delta(StreamDelta {
                    index: 0,
                    content: None,
                    tool_call: None,
                    finish_reason,
                }));
            }
        }

        if let Some(usage) = &chunk.usage_metadata {
            events.push(StreamEvent::Usage(Usage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            }));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FinishReason;

    #[test]
    fn request_round_trips_through_wire_format() {
        let original = CompletionRequest {
            model: String::new(),
            messages: vec![
                Message::system("Be terse."),
                Message::user("Weather in SF?"),
                Message::assistant(
                    "",
                    vec![ToolCall {
                        id: "call_get_weather".to_owned(),
                        function: FunctionCall {
                            name: "get_weather".to_owned(),
                            arguments: r#"{"location":"SF"}"#.to_owned(),
                        },
                    }],
                ),
                Message::tool("call_get_weather", "18C"),
            ],
            temperature: Some(0.7),
            max_tokens: Some(256),
            tools: Some(vec![ToolDefinition {
                tool_type: "function".to_owned(),
                function: FunctionDefinition {
                    name: "get_weather".to_owned(),
                    description: None,
                    parameters: Some(serde_json::json!({"type": "object"})),
                },
            }]),
            stream: false,
        };

        let back = CompletionRequest::from(GoogleRequest::from(&original));

        assert_eq!(back.messages.len(), original.messages.len());
        assert_eq!(back.messages[0].content, "Be terse.");
        assert_eq!(back.temperature, Some(0.7));
        assert_eq!(back.max_tokens, Some(256));

        let assistant = &back.messages[2];
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_get_weather");
        assert_eq!(calls[0].function.name, "get_weather");

        let tool = &back.messages[3];
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_get_weather"));
        assert_eq!(tool.content, "18C");
    }

    #[test]
    fn function_call_chunk_decodes_with_complete_arguments() {
        let chunk: GoogleStreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"functionCall":{"name":"get_weather","args":{"location":"SF"}}}]},
                "finishReason":"STOP"}]}"#,
        )
        .unwrap();

        let mut state = GoogleStreamState::new();
        let events = state.convert_chunk(&chunk);
        assert_eq!(events.len(), 2);

        match &events[0] {
            StreamEvent::Delta(delta) => {
                let tc = delta.tool_call.as_ref().unwrap();
                assert_eq!(tc.index, 0);
                assert_eq!(tc.id.as_deref(), Some("call_get_weather"));
                let args = tc.function.as_ref().unwrap().arguments.as_ref().unwrap();
                let parsed: serde_json::Value = serde_json::from_str(args).unwrap();
                assert_eq!(parsed["location"], "SF");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // STOP after a function call maps to tool_calls
        match &events[1] {
            StreamEvent::Delta(delta) => assert_eq!(delta.finish_reason, Some(FinishReason::ToolCalls)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn usage_metadata_becomes_usage_event() {
        let chunk: GoogleStreamChunk = serde_json::from_str(
            r#"{"candidates":[],"usageMetadata":{"promptTokenCount":10,
                "candidatesTokenCount":4,"totalTokenCount":14}}"#,
        )
        .unwrap();

        let mut state = GoogleStreamState::new();
        let events = state.convert_chunk(&chunk);
        match &events[0] {
            StreamEvent::Usage(usage) => assert_eq!(usage.total_tokens, 14),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
