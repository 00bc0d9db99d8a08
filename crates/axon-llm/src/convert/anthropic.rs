//! Conversion between canonical types and Anthropic wire format

use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicMessageDelta, AnthropicRequest,
    AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicTool, AnthropicUsage,
};
use crate::types::{
    CompletionRequest, FinishReason, FunctionCall, FunctionDefinition, Message, Role, StreamDelta, StreamEvent,
    StreamFunctionCall, StreamToolCall, ToolCall, ToolDefinition, Usage,
};

use super::parse_finish_reason;

/// Default max tokens when not specified (Anthropic requires this field)
const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Outbound: canonical request -> Anthropic wire format --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut system: Option<String> = None;
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for msg in &req.messages {
            if msg.role == Role::System {
                match &mut system {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&msg.content);
                    }
                    None => system = Some(msg.content.clone()),
                }
            } else {
                push_merged(&mut messages, canonical_message_to_anthropic(msg));
            }
        }

        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                })
                .collect()
        });

        Self {
            model: req.model.clone(),
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.temperature,
            stream: if req.stream { Some(true) } else { None },
            tools,
        }
    }
}

/// Convert a canonical message to Anthropic wire format
fn canonical_message_to_anthropic(msg: &Message) -> AnthropicMessage {
    // Tool results become tool_result blocks inside a user message
    if msg.role == Role::Tool
        && let Some(tool_call_id) = &msg.tool_call_id
    {
        return AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: Some(msg.content.clone()),
                is_error: None,
            }]),
        };
    }

    // Assistant messages with tool calls become tool_use blocks
    if let Some(tool_calls) = &msg.tool_calls {
        let mut blocks: Vec<AnthropicContentBlock> = Vec::new();

        if !msg.content.is_empty() {
            blocks.push(AnthropicContentBlock::Text {
                text: msg.content.clone(),
            });
        }

        for tc in tool_calls {
            let input = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            blocks.push(AnthropicContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input,
            });
        }

        return AnthropicMessage {
            role: "assistant".to_owned(),
            content: AnthropicContent::Blocks(blocks),
        };
    }

    let role = if msg.role == Role::Assistant { "assistant" } else { "user" };
    AnthropicMessage {
        role: role.to_owned(),
        content: AnthropicContent::Text(msg.content.clone()),
    }
}

/// Append a message, merging into the previous one when roles match
///
/// Anthropic requires strict user/assistant alternation. Adjacent plain-text
/// messages of the same role are joined with a single newline; anything
/// involving blocks concatenates the block lists in order.
fn push_merged(messages: &mut Vec<AnthropicMessage>, msg: AnthropicMessage) {
    if let Some(last) = messages.last_mut()
        && last.role == msg.role
    {
        merge_content(&mut last.content, msg.content);
        return;
    }
    messages.push(msg);
}

fn merge_content(existing: &mut AnthropicContent, incoming: AnthropicContent) {
    match (&mut *existing, incoming) {
        (AnthropicContent::Text(a), AnthropicContent::Text(b)) => {
            a.push('\n');
            a.push_str(&b);
        }
        (_, incoming) => {
            let prior = std::mem::replace(existing, AnthropicContent::Text(String::new()));
            let mut blocks = into_blocks(prior);
            blocks.extend(into_blocks(incoming));
            *existing = AnthropicContent::Blocks(blocks);
        }
    }
}

fn into_blocks(content: AnthropicContent) -> Vec<AnthropicContentBlock> {
    match content {
        AnthropicContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![AnthropicContentBlock::Text { text }]
            }
        }
        AnthropicContent::Blocks(blocks) => blocks,
    }
}

// -- Inbound: Anthropic wire format -> canonical --

impl From<AnthropicRequest> for CompletionRequest {
    fn from(req: AnthropicRequest) -> Self {
        let mut messages: Vec<Message> = Vec::new();

        if let Some(system) = req.system {
            messages.push(Message::system(system));
        }

        for msg in req.messages {
            messages.extend(anthropic_message_to_canonical(msg));
        }

        Self {
            model: req.model,
            messages,
            temperature: req.temperature,
            max_tokens: Some(req.max_tokens),
            tools: req.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|t| ToolDefinition {
                        tool_type: "function".to_owned(),
                        function: FunctionDefinition {
                            name: t.name,
                            description: t.description,
                            parameters: Some(t.input_schema),
                        },
                    })
                    .collect()
            }),
            stream: req.stream.unwrap_or(false),
        }
    }
}

/// Convert one Anthropic message into canonical messages
///
/// A single Anthropic user message can carry several `tool_result` blocks;
/// each becomes its own tool-role message.
fn anthropic_message_to_canonical(msg: AnthropicMessage) -> Vec<Message> {
    let role = if msg.role == "assistant" { Role::Assistant } else { Role::User };

    let blocks = match msg.content {
        AnthropicContent::Text(text) => {
            return vec![Message {
                role,
                content: text,
                tool_calls: None,
                tool_call_id: None,
            }];
        }
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall {
                    id,
                    function: FunctionCall { name, arguments },
                });
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                out.push(Message::tool(tool_use_id, content.unwrap_or_default()));
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

/// State tracker for decoding an Anthropic event stream
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    /// Sequential 0-based index of the tool call currently being streamed
    ///
    /// Anthropic's content block index is shared across all block types, so
    /// a tool use that follows a text block starts at index 1 or higher.
    /// Consumers index tool calls densely from zero, so the block index is
    /// remapped to a sequential counter.
    current_tool_call_index: u32,
    /// Counter used to assign the next tool call its sequential index
    next_tool_call_index: u32,
}

impl AnthropicStreamState {
    /// Create a new stream state tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert an Anthropic stream event to canonical stream events
    pub fn convert_event(&mut self, event: &AnthropicStreamEvent) -> Vec<StreamEvent> {
        match event {
            AnthropicStreamEvent::Ping | AnthropicStreamEvent::ContentBlockStop { .. } => Vec::new(),

            // Input token counts arrive with message_start
            AnthropicStreamEvent::MessageStart { message } => message
                .usage
                .map(|u| vec![StreamEvent::Usage(anthropic_usage_to_canonical(u))])
                .unwrap_or_default(),

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::Text { .. } => Vec::new(),
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    self.current_tool_call_index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    vec![StreamEvent::Delta(StreamDelta {
                        index: 0,
                        content: None,
                        tool_call: Some(StreamToolCall {
                            index: self.current_tool_call_index,
                            id: Some(id.clone()),
                            function: Some(StreamFunctionCall {
                                name: Some(name.clone()),
                                arguments: None,
                            }),
                        }),
                        finish_reason: None,
                    })]
                }
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => {
                    vec![StreamEvent::Delta(StreamDelta {
                        index: 0,
                        content: Some(text.clone()),
                        tool_call: None,
                        finish_reason: None,
                    })]
                }
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    vec![StreamEvent::Delta(StreamDelta {
                        index: 0,
                        content: None,
                        tool_call: Some(StreamToolCall {
                            index: self.current_tool_call_index,
                            id: None,
                            function: Some(StreamFunctionCall {
                                name: None,
                                arguments: Some(partial_json.clone()),
                            }),
                        }),
                        finish_reason: None,
                    })]
                }
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();

                let finish_reason = delta.stop_reason.as_deref().and_then(parse_finish_reason);
                if finish_reason.is_some() {
                    events.push(StreamEvent::Delta(StreamDelta {
                        index: 0,
                        content: None,
                        tool_call: None,
                        finish_reason,
                    }));
                }

                if let Some(usage) = usage {
                    events.push(StreamEvent::Usage(anthropic_usage_to_canonical(*usage)));
                }

                events
            }

            AnthropicStreamEvent::MessageStop => {
                vec![StreamEvent::Done]
            }
        }
    }
}

fn anthropic_usage_to_canonical(usage: AnthropicUsage) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    }
}

/// Build Anthropic stream events from canonical stream events
pub fn canonical_to_anthropic_stream_events(event: &StreamEvent) -> Vec<AnthropicStreamEvent> {
    match event {
        StreamEvent::Delta(delta) => {
            let mut events = Vec::new();

            if let Some(content) = &delta.content {
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: AnthropicStreamDelta::TextDelta { text: content.clone() },
                });
            }

            if let Some(tc) = &delta.tool_call
                && let Some(func) = &tc.function
                && let Some(args) = &func.arguments
            {
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index: tc.index,
                    delta: AnthropicStreamDelta::InputJsonDelta {
                        partial_json: args.clone(),
                    },
                });
            }

            if let Some(finish_reason) = &delta.finish_reason {
                let stop_reason = match finish_reason {
                    FinishReason::Stop | FinishReason::ContentFilter => "end_turn",
                    FinishReason::Length => "max_tokens",
                    FinishReason::ToolCalls => "tool_use",
                };

                events.push(AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta {
                        stop_reason: Some(stop_reason.to_owned()),
                        stop_sequence: None,
                    },
                    usage: None,
                });
            }

            events
        }
        StreamEvent::Usage(usage) => {
            vec![AnthropicStreamEvent::MessageDelta {
                delta: AnthropicMessageDelta {
                    stop_reason: None,
                    stop_sequence: None,
                },
                usage: Some(AnthropicUsage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                }),
            }]
        }
        StreamEvent::Done => {
            vec![AnthropicStreamEvent::MessageStop]
        }
    }
}
