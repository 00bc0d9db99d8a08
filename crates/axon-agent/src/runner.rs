//! Multi-turn agent loop
//!
//! One loop instance drives one upstream stream at a time. Each turn submits
//! the message stack, adapts the provider stream onto the caller sink, and
//! either terminates or routes buffered tool calls through the dispatcher
//! and iterates. The loop owns the interaction-level `[DONE]` frame; the
//! adapter is told not to emit its own.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axon_config::AgentOptions;
use axon_core::store::{RecordedToolCall, RecordedToolResponse, RecordedUsage, TurnRecord};
use axon_core::{Dialect, FunctionRegistry, SessionStore};
use axon_llm::types::{
    Choice, ChoiceMessage, CompletionRequest, CompletionResponse, FinishReason, Message, ToolDefinition, Usage,
};
use axon_llm::{AdapterOptions, DONE_FRAME, LlmError, StreamAdapter, TurnOutcome, UpstreamClient, error_frame};
use futures_util::future;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::dispatch::FunctionDispatcher;

/// Caller identity for one interaction
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Registered model name to submit against
    pub model: String,
    /// Session the audit entry is keyed by
    pub session_id: String,
    /// End user on whose behalf the interaction runs
    pub user_id: String,
}

/// Multi-turn controller binding the streaming layer to tool dispatch
#[derive(Clone)]
pub struct AgentLoop {
    client: Arc<dyn UpstreamClient>,
    functions: Arc<dyn FunctionRegistry>,
    store: Arc<dyn SessionStore>,
    options: AgentOptions,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        functions: Arc<dyn FunctionRegistry>,
        store: Arc<dyn SessionStore>,
        options: AgentOptions,
    ) -> Self {
        Self {
            client,
            functions,
            store,
            options,
        }
    }

    /// Run one interaction to completion
    ///
    /// SSE frames are delivered through `sink` in production order and the
    /// stream always closes with a single `[DONE]`, except under
    /// cancellation, which tears the upstream down and returns silently
    /// without an audit entry. A dropped sink receiver counts as
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Non-recoverable upstream failures are surfaced both as an error frame
    /// on the sink and as the returned error.
    #[allow(clippy::too_many_lines)]
    pub async fn run(
        &self,
        question: &str,
        context: &RunContext,
        sink: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), LlmError> {
        let dispatcher = FunctionDispatcher::new(Arc::clone(&self.functions));
        let mut audit = AuditSink::new(Arc::clone(&self.store));

        let mut messages = Vec::new();
        if !self.options.system_prompt.is_empty() {
            messages.push(Message::system(&self.options.system_prompt));
        }
        messages.push(Message::user(question));

        let descriptors = self.functions.list();
        let parallel_safe = descriptors.iter().all(|d| d.side_effect_free);
        let tools: Option<Vec<ToolDefinition>> = if descriptors.is_empty() {
            None
        } else {
            Some(descriptors.iter().map(|d| ToolDefinition::from(*d)).collect())
        };

        // In non-streaming mode per-chunk frames are drained internally and
        // the caller receives one buffered response at the end.
        let (frame_tx, _drain) = if self.options.stream {
            (sink.clone(), None)
        } else {
            let (tx, mut rx) = mpsc::channel::<String>(64);
            let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
            (tx, Some(drain))
        };

        let deadline = Duration::from_secs(self.options.per_turn_deadline_seconds);
        let max_turns = self.options.max_turns.max(1);
        let mut total_usage: Option<Usage> = None;

        for turn_index in 0..max_turns {
            let request = CompletionRequest {
                model: context.model.clone(),
                messages: messages.clone(),
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
                tools: tools.clone(),
                stream: true,
            };
            let request_hash = hash_request(&request)?;

            tracing::debug!(session_id = %context.session_id, turn_index, "submitting turn");

            let opened = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                opened = self.client.open_stream(&request, deadline, cancel.clone()) => opened,
            };
            let (dialect, bytes) = match opened {
                Ok(pair) => pair,
                Err(err) => {
                    let record = failed_turn(turn_index, request_hash, &err);
                    return self.fail(err, true, record, &mut audit, context, &sink).await;
                }
            };

            let adapter = StreamAdapter::new(dialect, Dialect::Openai, &context.model, self.adapter_options())?;

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                outcome = adapter.process_stream(bytes, &frame_tx) => outcome,
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(LlmError::Cancelled) => return Ok(()),
                Err(err) => {
                    let record = failed_turn(turn_index, request_hash, &err);
                    return self.fail(err, false, record, &mut audit, context, &sink).await;
                }
            };

            if let Some(usage) = outcome.usage {
                let total = total_usage.get_or_insert_with(Usage::default);
                total.prompt_tokens += usage.prompt_tokens;
                total.completion_tokens += usage.completion_tokens;
                total.total_tokens += usage.total_tokens;
            }

            let mut record = TurnRecord {
                turn_index,
                request_hash,
                response_content: outcome.content.clone(),
                response_tool_calls: outcome
                    .tool_calls
                    .iter()
                    .map(|c| RecordedToolCall {
                        id: c.id.clone(),
                        name: c.function.name.clone(),
                        arguments: c.function.arguments.clone(),
                    })
                    .collect(),
                tool_responses: vec![],
                usage: outcome.usage.map(record_usage).unwrap_or_default(),
                error: None,
            };

            let wants_tools = outcome.finish_reason == Some(FinishReason::ToolCalls) && !outcome.tool_calls.is_empty();

            if !wants_tools {
                audit.record_turn(record);
                if !self.options.stream {
                    let response = buffered_response(&context.model, outcome, total_usage);
                    let json = serde_json::to_string(&response).map_err(|e| LlmError::Internal(e.into()))?;
                    if sink.send(format!("data: {json}\n\n")).await.is_err() {
                        return Ok(());
                    }
                }
                if sink.send(DONE_FRAME.to_owned()).await.is_err() {
                    return Ok(());
                }
                audit
                    .flush(&context.session_id, &context.user_id, &self.options.name)
                    .await;
                return Ok(());
            }

            if turn_index + 1 == max_turns {
                // Budget exhausted with tool work still pending
                tracing::warn!(session_id = %context.session_id, max_turns, "turn budget exhausted");
                audit.record_turn(record);
                audit.set_truncated();
                if sink
                    .send(finish_chunk(&context.model, FinishReason::Length))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
                if sink.send(DONE_FRAME.to_owned()).await.is_err() {
                    return Ok(());
                }
                audit
                    .flush(&context.session_id, &context.user_id, &self.options.name)
                    .await;
                return Ok(());
            }

            messages.push(Message::assistant(outcome.content, outcome.tool_calls.clone()));

            // Tool results are appended in call order; parallel invocation
            // only when every registered tool is declared side-effect-free
            let results = if parallel_safe {
                future::join_all(outcome.tool_calls.iter().map(|call| dispatcher.dispatch(call, &cancel))).await
            } else {
                let mut results = Vec::with_capacity(outcome.tool_calls.len());
                for call in &outcome.tool_calls {
                    results.push(dispatcher.dispatch(call, &cancel).await);
                }
                results
            };

            for result in results {
                let message = match result {
                    Ok(message) => message,
                    // Only cancellation crosses the dispatch boundary
                    Err(_) => return Ok(()),
                };
                record.tool_responses.push(RecordedToolResponse {
                    tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                });
                messages.push(message);
            }

            audit.record_turn(record);
        }

        Ok(())
    }

    fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            relay_tool_use_events: self.options.relay_tool_use_events,
            relay_usage_events: self.options.relay_usage_events,
            emit_function_announcements: self.options.emit_function_announcements,
            emit_done: false,
        }
    }

    /// Close the caller stream on a non-recoverable error and flush audit
    ///
    /// `announce` is false when the adapter already put an error frame on
    /// the caller sink; the terminal `[DONE]` is still owed either way. In
    /// non-streaming mode the adapter's frames went to the internal drain
    /// channel, so the error chunk is always owed on the real sink.
    async fn fail(
        &self,
        err: LlmError,
        announce: bool,
        record: TurnRecord,
        audit: &mut AuditSink,
        context: &RunContext,
        sink: &mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        tracing::error!(session_id = %context.session_id, error = %err, "interaction failed");
        if announce || !self.options.stream {
            let _ = sink.send(error_frame(&err)).await;
        }
        let _ = sink.send(DONE_FRAME.to_owned()).await;
        audit.record_turn(record);
        audit.set_error(err.to_string());
        audit
            .flush(&context.session_id, &context.user_id, &self.options.name)
            .await;
        Err(err)
    }
}

/// Turn record for a turn that ended in a non-recoverable error
fn failed_turn(turn_index: u32, request_hash: String, err: &LlmError) -> TurnRecord {
    TurnRecord {
        turn_index,
        request_hash,
        response_content: String::new(),
        response_tool_calls: vec![],
        tool_responses: vec![],
        usage: RecordedUsage::default(),
        error: Some(err.to_string()),
    }
}

/// SHA-256 over the canonical request JSON, hex-encoded
fn hash_request(request: &CompletionRequest) -> Result<String, LlmError> {
    let bytes = serde_json::to_vec(request).map_err(|e| LlmError::Internal(e.into()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn record_usage(usage: Usage) -> RecordedUsage {
    RecordedUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

/// Single chunk carrying only a finish reason
fn finish_chunk(model: &str, reason: FinishReason) -> String {
    let body = serde_json::json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4().simple()),
        "object": "chat.completion.chunk",
        "created": unix_now(),
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason.as_str()}],
    });
    format!("data: {body}\n\n")
}

/// Materialize the final turn as one non-streaming response
fn buffered_response(model: &str, outcome: TurnOutcome, usage: Option<Usage>) -> CompletionResponse {
    let message = ChoiceMessage {
        role: "assistant".to_owned(),
        content: Some(outcome.content),
        tool_calls: if outcome.tool_calls.is_empty() {
            None
        } else {
            Some(outcome.tool_calls)
        },
    };

    CompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion".to_owned(),
        created: unix_now(),
        model: model.to_owned(),
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: outcome.finish_reason,
        }],
        usage,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
