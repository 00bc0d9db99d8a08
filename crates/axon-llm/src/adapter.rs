//! Stream adapter: provider bytes in, caller-facing SSE frames out
//!
//! The adapter consumes one provider stream, forwards content deltas as they
//! arrive, buffers tool-call fragments until the provider marks them
//! complete, and aggregates usage reports. Tool-call argument deltas and
//! intermediate usage are suppressed by default; callers see one consolidated
//! tool-calls chunk per turn plus a terminal usage chunk.

use std::time::{SystemTime, UNIX_EPOCH};

use axon_core::Dialect;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::convert::anthropic::{AnthropicStreamState, canonical_to_anthropic_stream_events};
use crate::convert::google::GoogleStreamState;
use crate::convert::openai::{
    delta_to_openai_chunk, openai_chunk_to_events, tool_calls_to_openai_chunk, usage_to_openai_chunk,
};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent};
use crate::protocol::google::GoogleStreamChunk;
use crate::protocol::openai::OpenAiStreamChunk;
use crate::types::{
    Choice, ChoiceMessage, CompletionResponse, FinishReason, FunctionCall, StreamDelta, StreamEvent, StreamToolCall,
    ToolCall, Usage,
};

/// Terminal SSE frame closing an `OpenAI`-shaped stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Render an error as a caller-facing SSE frame
pub fn error_frame(err: &LlmError) -> String {
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": err.error_type(),
        }
    });
    format!("data: {body}\n\n")
}

/// Behavior switches for one adapted stream
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Forward raw tool-call fragments to the caller as they arrive
    pub relay_tool_use_events: bool,
    /// Forward intermediate usage chunks to the caller
    pub relay_usage_events: bool,
    /// Emit one `event: function_call` frame per completed tool call
    pub emit_function_announcements: bool,
    /// Close the caller stream with `[DONE]` when this turn ends
    ///
    /// The agent loop spans several turns over one caller stream and owns
    /// the terminal frame itself.
    pub emit_done: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            relay_tool_use_events: false,
            relay_usage_events: false,
            emit_function_announcements: true,
            emit_done: true,
        }
    }
}

/// Everything the agent loop needs from one completed turn
#[derive(Debug)]
pub struct TurnOutcome {
    /// Full assistant text accumulated over the turn
    pub content: String,
    /// Buffered tool calls, in arrival order
    pub tool_calls: Vec<ToolCall>,
    /// Aggregated usage, when the provider reported any
    pub usage: Option<Usage>,
    /// Final finish reason, when the provider sent one
    pub finish_reason: Option<FinishReason>,
}

/// Caller-relevant event classified from the canonical stream
#[derive(Debug)]
enum ChunkEvent {
    /// Incremental assistant text
    Content(String),
    /// Raw tool-call fragment (id, name, or argument bytes)
    ToolCallFragment(StreamToolCall),
    /// Provider marked all buffered tool calls complete
    ToolCallsComplete(Vec<ToolCall>),
    /// Terminal finish reason other than tool calls
    Finish(FinishReason),
    /// Usage report
    Usage(Usage),
    /// End of provider stream
    Done,
}

/// Buffered state for one in-flight stream
#[derive(Debug, Default)]
struct StreamState {
    content: String,
    tool_calls: IndexMap<u32, ToolCallBuffer>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
}

impl StreamState {
    /// Fold one canonical event in and classify what the caller should see
    fn apply(&mut self, event: StreamEvent) -> Vec<ChunkEvent> {
        match event {
            StreamEvent::Delta(delta) => {
                let mut out = Vec::new();

                if let Some(text) = delta.content
                    && !text.is_empty()
                {
                    self.content.push_str(&text);
                    out.push(ChunkEvent::Content(text));
                }

                if let Some(tc) = delta.tool_call {
                    self.buffer_tool_call(&tc);
                    out.push(ChunkEvent::ToolCallFragment(tc));
                }

                if let Some(reason) = delta.finish_reason {
                    self.finish_reason = Some(reason);
                    if reason == FinishReason::ToolCalls {
                        out.push(ChunkEvent::ToolCallsComplete(self.assemble_tool_calls()));
                    } else {
                        out.push(ChunkEvent::Finish(reason));
                    }
                }

                out
            }
            StreamEvent::Usage(usage) => {
                self.usage.get_or_insert_with(Usage::default).absorb(usage);
                vec![ChunkEvent::Usage(usage)]
            }
            StreamEvent::Done => vec![ChunkEvent::Done],
        }
    }

    fn buffer_tool_call(&mut self, tc: &StreamToolCall) {
        let buffer = self.tool_calls.entry(tc.index).or_default();
        if let Some(id) = &tc.id {
            buffer.id.clone_from(id);
        }
        if let Some(func) = &tc.function {
            if let Some(name) = &func.name {
                buffer.name.clone_from(name);
            }
            if let Some(args) = &func.arguments {
                buffer.arguments.push_str(args);
            }
        }
    }

    /// Buffered tool calls in arrival order; empty argument buffers become `{}`
    fn assemble_tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|b| ToolCall {
                id: b.id.clone(),
                function: FunctionCall {
                    name: b.name.clone(),
                    arguments: if b.arguments.is_empty() {
                        "{}".to_owned()
                    } else {
                        b.arguments.clone()
                    },
                },
            })
            .collect()
    }

    fn into_outcome(self) -> TurnOutcome {
        let tool_calls = self.assemble_tool_calls();
        TurnOutcome {
            content: self.content,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

/// Per-dialect SSE payload decoder
enum SourceDecoder {
    OpenAi,
    Anthropic(AnthropicStreamState),
    Google(GoogleStreamState),
}

impl SourceDecoder {
    fn new(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Openai => Self::OpenAi,
            Dialect::Anthropic => Self::Anthropic(AnthropicStreamState::new()),
            Dialect::Google => Self::Google(GoogleStreamState::new()),
        }
    }

    /// Decode one SSE data payload
    ///
    /// Unparseable payloads are logged and skipped rather than tearing the
    /// stream down; providers occasionally interleave frames we don't model.
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        let data = data.trim();
        if data == "[DONE]" {
            return vec![StreamEvent::Done];
        }

        match self {
            Self::OpenAi => match serde_json::from_str::<OpenAiStreamChunk>(data) {
                Ok(chunk) => openai_chunk_to_events(&chunk),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable stream chunk");
                    Vec::new()
                }
            },
            Self::Anthropic(state) => match serde_json::from_str::<AnthropicStreamEvent>(data) {
                Ok(event) => state.convert_event(&event),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable stream event");
                    Vec::new()
                }
            },
            Self::Google(state) => match serde_json::from_str::<GoogleStreamChunk>(data) {
                Ok(chunk) => state.convert_chunk(&chunk),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable stream chunk");
                    Vec::new()
                }
            },
        }
    }
}

/// Adapts one provider stream into caller-facing SSE frames
#[derive(Debug)]
pub struct StreamAdapter {
    source: Dialect,
    target: Dialect,
    options: AdapterOptions,
    response_id: String,
    model: String,
    created: u64,
}

impl StreamAdapter {
    /// Build an adapter from a source dialect onto a caller-facing target
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedDialect` for targets without an emission mapping;
    /// only `OpenAI`- and Anthropic-shaped output is supported.
    pub fn new(
        source: Dialect,
        target: Dialect,
        model: impl Into<String>,
        options: AdapterOptions,
    ) -> Result<Self, LlmError> {
        if target == Dialect::Google {
            return Err(LlmError::UnsupportedDialect {
                dialect: target.to_string(),
            });
        }

        Ok(Self {
            source,
            target,
            options,
            response_id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created: unix_now(),
        })
    }

    /// Drive one provider stream to completion
    ///
    /// Frames are delivered through `sink` as they are produced; a full
    /// channel applies backpressure to the provider read. Returns the
    /// buffered outcome for the agent loop. A dropped receiver surfaces as
    /// `Cancelled`.
    pub async fn process_stream<S>(&self, bytes: S, sink: &mpsc::Sender<String>) -> Result<TurnOutcome, LlmError>
    where
        S: Stream<Item = Result<Bytes, LlmError>>,
    {
        let mut decoder = SourceDecoder::new(self.source);
        let mut state = StreamState::default();
        let mut finished = false;

        let mut events = std::pin::pin!(bytes.eventsource());

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    let err = map_stream_error(err);
                    self.send(sink, error_frame(&err)).await?;
                    if self.options.emit_done {
                        self.send(sink, DONE_FRAME.to_owned()).await?;
                    }
                    return Err(err);
                }
            };

            for stream_event in decoder.decode(&event.data) {
                for chunk_event in state.apply(stream_event) {
                    if matches!(chunk_event, ChunkEvent::Done) {
                        finished = true;
                    }
                    self.emit(&chunk_event, &state, sink).await?;
                }
                if finished {
                    break;
                }
            }
            if finished {
                break;
            }
        }

        // A stream that ends without a terminal event still flushes usage
        // and closes cleanly
        if !finished {
            self.emit(&ChunkEvent::Done, &state, sink).await?;
        }

        Ok(state.into_outcome())
    }

    /// Drive one provider stream to completion without a caller sink
    ///
    /// Used for non-streaming interactions: the whole turn is buffered and
    /// returned as a single response.
    pub async fn collect<S>(&self, bytes: S) -> Result<CompletionResponse, LlmError>
    where
        S: Stream<Item = Result<Bytes, LlmError>>,
    {
        let mut decoder = SourceDecoder::new(self.source);
        let mut state = StreamState::default();
        let mut finished = false;

        let mut events = std::pin::pin!(bytes.eventsource());

        while let Some(item) = events.next().await {
            let event = item.map_err(map_stream_error)?;
            for stream_event in decoder.decode(&event.data) {
                if matches!(stream_event, StreamEvent::Done) {
                    finished = true;
                    break;
                }
                state.apply(stream_event);
            }
            if finished {
                break;
            }
        }

        Ok(self.response_from(state))
    }

    async fn emit(&self, event: &ChunkEvent, state: &StreamState, sink: &mpsc::Sender<String>) -> Result<(), LlmError> {
        match event {
            ChunkEvent::Content(text) => {
                self.send_delta(
                    &StreamDelta {
                        index: 0,
                        content: Some(text.clone()),
                        tool_call: None,
                        finish_reason: None,
                    },
                    sink,
                )
                .await
            }

            ChunkEvent::ToolCallFragment(tc) => {
                if !self.options.relay_tool_use_events {
                    return Ok(());
                }
                self.send_delta(
                    &StreamDelta {
                        index: 0,
                        content: None,
                        tool_call: Some(tc.clone()),
                        finish_reason: None,
                    },
                    sink,
                )
                .await
            }

            ChunkEvent::ToolCallsComplete(calls) => {
                if calls.is_empty() {
                    return self.emit_finish(FinishReason::ToolCalls, sink).await;
                }

                // Malformed arguments are reported to the caller but still
                // forwarded; the agent loop feeds the model a corrective
                // tool message so it can retry.
                for err in argument_errors(calls) {
                    tracing::warn!(error = %err, "tool call arguments failed validation");
                    self.send(sink, error_frame(&err)).await?;
                }

                if self.options.emit_function_announcements {
                    for call in calls {
                        let body = serde_json::json!({
                            "id": call.id,
                            "name": call.function.name,
                            "arguments": call.function.arguments,
                        });
                        self.send(sink, named_frame("function_call", &body.to_string())).await?;
                    }
                }

                if self.target == Dialect::Anthropic {
                    self.send_anthropic_tool_blocks(calls, sink).await?;
                    return self.emit_finish(FinishReason::ToolCalls, sink).await;
                }

                let chunk = tool_calls_to_openai_chunk(calls, &self.response_id, &self.model, self.created);
                self.send(sink, data_frame(&chunk)).await
            }

            ChunkEvent::Finish(reason) => self.emit_finish(*reason, sink).await,

            ChunkEvent::Usage(usage) => {
                if !self.options.relay_usage_events {
                    return Ok(());
                }
                self.send_usage(usage, sink).await
            }

            ChunkEvent::Done => {
                if let Some(usage) = &state.usage {
                    self.send_usage(usage, sink).await?;
                }
                if self.target == Dialect::Anthropic {
                    return self.send(sink, anthropic_frame(&AnthropicStreamEvent::MessageStop)).await;
                }
                if self.options.emit_done {
                    self.send(sink, DONE_FRAME.to_owned()).await?;
                }
                Ok(())
            }
        }
    }

    async fn emit_finish(&self, reason: FinishReason, sink: &mpsc::Sender<String>) -> Result<(), LlmError> {
        self.send_delta(
            &StreamDelta {
                index: 0,
                content: None,
                tool_call: None,
                finish_reason: Some(reason),
            },
            sink,
        )
        .await
    }

    async fn send_delta(&self, delta: &StreamDelta, sink: &mpsc::Sender<String>) -> Result<(), LlmError> {
        if self.target == Dialect::Anthropic {
            for event in canonical_to_anthropic_stream_events(&StreamEvent::Delta(delta.clone())) {
                self.send(sink, anthropic_frame(&event)).await?;
            }
            return Ok(());
        }

        let chunk = delta_to_openai_chunk(delta, &self.response_id, &self.model, self.created);
        self.send(sink, data_frame(&chunk)).await
    }

    async fn send_usage(&self, usage: &Usage, sink: &mpsc::Sender<String>) -> Result<(), LlmError> {
        if self.target == Dialect::Anthropic {
            for event in canonical_to_anthropic_stream_events(&StreamEvent::Usage(*usage)) {
                self.send(sink, anthropic_frame(&event)).await?;
            }
            return Ok(());
        }

        let chunk = usage_to_openai_chunk(usage, &self.response_id, &self.model, self.created);
        self.send(sink, data_frame(&chunk)).await
    }

    /// Render completed tool calls as Anthropic content blocks
    async fn send_anthropic_tool_blocks(&self, calls: &[ToolCall], sink: &mpsc::Sender<String>) -> Result<(), LlmError> {
        for (i, call) in calls.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let index = i as u32;

            let start = AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicStreamContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input: serde_json::json!({}),
                },
            };
            self.send(sink, anthropic_frame(&start)).await?;

            let delta = AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicStreamDelta::InputJsonDelta {
                    partial_json: call.function.arguments.clone(),
                },
            };
            self.send(sink, anthropic_frame(&delta)).await?;

            self.send(sink, anthropic_frame(&AnthropicStreamEvent::ContentBlockStop { index }))
                .await?;
        }

        Ok(())
    }

    async fn send(&self, sink: &mpsc::Sender<String>, frame: String) -> Result<(), LlmError> {
        sink.send(frame).await.map_err(|_| LlmError::Cancelled)
    }

    fn response_from(&self, state: StreamState) -> CompletionResponse {
        let outcome = state.into_outcome();

        let message = ChoiceMessage {
            role: "assistant".to_owned(),
            content: if outcome.content.is_empty() && !outcome.tool_calls.is_empty() {
                None
            } else {
                Some(outcome.content)
            },
            tool_calls: if outcome.tool_calls.is_empty() {
                None
            } else {
                Some(outcome.tool_calls)
            },
        };

        CompletionResponse {
            id: self.response_id.clone(),
            object: "chat.completion".to_owned(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: outcome.finish_reason,
            }],
            usage: outcome.usage,
        }
    }
}

/// Validate that every assembled tool call carries a JSON object as arguments
fn argument_errors(calls: &[ToolCall]) -> Vec<LlmError> {
    calls
        .iter()
        .filter_map(|call| match serde_json::from_str::<serde_json::Value>(&call.function.arguments) {
            Ok(value) if value.is_object() => None,
            Ok(_) => Some(LlmError::MalformedToolArguments {
                name: call.function.name.clone(),
                detail: "arguments are valid JSON but not an object".to_owned(),
            }),
            Err(e) => Some(LlmError::MalformedToolArguments {
                name: call.function.name.clone(),
                detail: e.to_string(),
            }),
        })
        .collect()
}

fn map_stream_error(err: eventsource_stream::EventStreamError<LlmError>) -> LlmError {
    match err {
        eventsource_stream::EventStreamError::Transport(e) => e,
        other => LlmError::MalformedStream(other.to_string()),
    }
}

fn data_frame(chunk: &OpenAiStreamChunk) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_default();
    format!("data: {json}\n\n")
}

fn named_frame(event: &str, json: &str) -> String {
    format!("event: {event}\ndata: {json}\n\n")
}

fn anthropic_frame(event: &AnthropicStreamEvent) -> String {
    named_frame(event.event_name(), &serde_json::to_string(event).unwrap_or_default())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
