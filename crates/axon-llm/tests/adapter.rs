//! End-to-end adapter tests over scripted provider streams

use axon_core::Dialect;
use axon_llm::types::FinishReason;
use axon_llm::{AdapterOptions, LlmError, StreamAdapter, TurnOutcome};
use bytes::Bytes;
use futures::stream;
use tokio::sync::mpsc;

/// Script an `OpenAI`-style SSE stream from raw data payloads
fn openai_sse(payloads: &[&str]) -> impl futures::Stream<Item = Result<Bytes, LlmError>> {
    let frames: Vec<Result<Bytes, LlmError>> = payloads
        .iter()
        .map(|p| Ok(Bytes::from(format!("data: {p}\n\n"))))
        .collect();
    stream::iter(frames)
}

/// Script an Anthropic-style SSE stream from (event, data) pairs
fn anthropic_sse(events: &[(&str, &str)]) -> impl futures::Stream<Item = Result<Bytes, LlmError>> {
    let frames: Vec<Result<Bytes, LlmError>> = events
        .iter()
        .map(|(name, data)| Ok(Bytes::from(format!("event: {name}\ndata: {data}\n\n"))))
        .collect();
    stream::iter(frames)
}

async fn run<S>(adapter: &StreamAdapter, bytes: S) -> (Vec<String>, Result<TurnOutcome, LlmError>)
where
    S: futures::Stream<Item = Result<Bytes, LlmError>>,
{
    let (tx, mut rx) = mpsc::channel(64);
    let outcome = adapter.process_stream(bytes, &tx).await;
    drop(tx);

    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    (frames, outcome)
}

fn parse_data(frame: &str) -> serde_json::Value {
    let data = frame
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("frame has a data line");
    serde_json::from_str(data).expect("data line is JSON")
}

#[tokio::test]
async fn openai_content_passes_through_in_order() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":" world"},"finish_reason":null}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
        "[DONE]",
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.content, "Hello world");
    assert_eq!(outcome.finish_reason, Some(FinishReason::Stop));
    assert_eq!(outcome.usage.unwrap().total_tokens, 11);
    assert!(outcome.tool_calls.is_empty());

    // content, content, finish, terminal usage, [DONE]
    assert_eq!(frames.len(), 5);
    assert_eq!(
        parse_data(&frames[0])["choices"][0]["delta"]["content"], "Hello"
    );
    assert_eq!(
        parse_data(&frames[2])["choices"][0]["finish_reason"], "stop"
    );
    assert_eq!(parse_data(&frames[3])["usage"]["total_tokens"], 11);
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
    assert_eq!(frames.iter().filter(|f| f.contains("[DONE]")).count(), 1);
}

#[tokio::test]
async fn anthropic_tool_call_is_buffered_and_consolidated() {
    let adapter =
        StreamAdapter::new(Dialect::Anthropic, Dialect::Openai, "claude-sonnet", AdapterOptions::default()).unwrap();

    let bytes = anthropic_sse(&[
        (
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"claude-sonnet","usage":{"input_tokens":25}}}"#,
        ),
        (
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather","input":{}}}"#,
        ),
        (
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"loca"}}"#,
        ),
        (
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"tion\": \"SF\"}"}}"#,
        ),
        ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
        (
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":20}}"#,
        ),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    // announcement, consolidated chunk, terminal usage, [DONE]
    assert_eq!(frames.len(), 4);

    assert!(frames[0].starts_with("event: function_call\n"));
    let announced = parse_data(&frames[0]);
    assert_eq!(announced["name"], "get_weather");

    let consolidated = parse_data(&frames[1]);
    let choice = &consolidated["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    let call = &choice["delta"]["tool_calls"][0];
    assert_eq!(call["id"], "toolu_1");
    let args: serde_json::Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args["location"], "SF");

    // usage aggregates across message_start and message_delta
    let usage = parse_data(&frames[2]);
    assert_eq!(usage["usage"]["prompt_tokens"], 25);
    assert_eq!(usage["usage"]["completion_tokens"], 20);
    assert_eq!(usage["usage"]["total_tokens"], 45);

    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].function.name, "get_weather");
    assert_eq!(outcome.finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn raw_tool_fragments_are_suppressed_by_default() {
    let adapter =
        StreamAdapter::new(Dialect::Anthropic, Dialect::Openai, "claude-sonnet", AdapterOptions::default()).unwrap();

    let bytes = anthropic_sse(&[
        (
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"lookup","input":{}}}"#,
        ),
        (
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"q\": 1}"}}"#,
        ),
        (
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
        ),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ]);

    let (frames, _) = run(&adapter, bytes).await;

    // No frame carries a partial argument fragment before completion
    let consolidated_at = frames
        .iter()
        .position(|f| f.contains("tool_calls"))
        .expect("consolidated chunk present");
    for frame in &frames[..consolidated_at] {
        assert!(
            frame.starts_with("event: function_call\n"),
            "unexpected pre-completion frame: {frame}"
        );
    }
}

#[tokio::test]
async fn relay_option_forwards_raw_fragments() {
    let options = AdapterOptions {
        relay_tool_use_events: true,
        ..AdapterOptions::default()
    };
    let adapter = StreamAdapter::new(Dialect::Anthropic, Dialect::Openai, "claude-sonnet", options).unwrap();

    let bytes = anthropic_sse(&[
        (
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"lookup","input":{}}}"#,
        ),
        (
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"q\": 1}"}}"#,
        ),
        (
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
        ),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ]);

    let (frames, _) = run(&adapter, bytes).await;
    let fragment = frames
        .iter()
        .find(|f| f.contains(r#"{\"q\": 1}"#))
        .expect("raw fragment forwarded");
    assert!(parse_data(fragment)["choices"][0]["delta"]["tool_calls"].is_array());
}

#[tokio::test]
async fn malformed_arguments_yield_error_chunk_but_keep_the_call() {
    let adapter =
        StreamAdapter::new(Dialect::Anthropic, Dialect::Openai, "claude-sonnet", AdapterOptions::default()).unwrap();

    let bytes = anthropic_sse(&[
        (
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather","input":{}}}"#,
        ),
        (
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"location\": "}}"#,
        ),
        (
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
        ),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    let error = frames
        .iter()
        .find(|f| f.contains("malformed_tool_arguments"))
        .expect("error chunk emitted");
    assert_eq!(parse_data(error)["error"]["type"], "malformed_tool_arguments");

    // The call still reaches the loop so the model can be told to retry
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].function.arguments, r#"{"location": "#);
}

#[tokio::test]
async fn google_function_call_arrives_complete() {
    let adapter =
        StreamAdapter::new(Dialect::Google, Dialect::Openai, "gemini-pro", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_weather","args":{"location":"SF"}}}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3,"totalTokenCount":15}}"#,
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].id, "call_get_weather");
    assert_eq!(outcome.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(outcome.usage.unwrap().total_tokens, 15);

    let consolidated = frames.iter().find(|f| f.contains("tool_calls")).unwrap();
    let call = &parse_data(consolidated)["choices"][0]["delta"]["tool_calls"][0];
    let args: serde_json::Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args["location"], "SF");
}

#[tokio::test]
async fn unparseable_chunks_are_skipped() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"keep"},"finish_reason":null}]}"#,
        "this is not json",
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":" going"},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);

    let (_, outcome) = run(&adapter, bytes).await;
    assert_eq!(outcome.unwrap().content, "keep going");
}

#[tokio::test]
async fn stream_ending_without_done_closes_cleanly() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"partial"},"finish_reason":null}]}"#,
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.content, "partial");
    assert_eq!(outcome.finish_reason, None);
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn transport_error_emits_error_chunk_then_done() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = stream::iter(vec![
        Ok(Bytes::from(
            "data: {\"id\":\"u1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n",
        )),
        Err(LlmError::MalformedStream("connection reset".to_owned())),
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    assert!(matches!(outcome, Err(LlmError::MalformedStream(_))));

    let error = frames.iter().find(|f| f.contains("malformed_stream")).unwrap();
    assert_eq!(parse_data(error)["error"]["type"], "malformed_stream");
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn zero_usage_still_flushes_a_well_formed_terminal_chunk() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#,
        "[DONE]",
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    let outcome = outcome.unwrap();

    let usage = outcome.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 0);
    assert_eq!(usage.total_tokens, 0);

    // finish, terminal usage, [DONE]
    assert_eq!(frames.len(), 3);
    let terminal = parse_data(&frames[1]);
    assert_eq!(terminal["usage"]["prompt_tokens"], 0);
    assert_eq!(terminal["usage"]["completion_tokens"], 0);
    assert_eq!(terminal["usage"]["total_tokens"], 0);
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn relay_usage_option_forwards_intermediate_reports() {
    let options = AdapterOptions {
        relay_usage_events: true,
        ..AdapterOptions::default()
    };
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", options).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":0,"total_tokens":9}}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":"stop"}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
        "[DONE]",
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    assert_eq!(outcome.unwrap().usage.unwrap().total_tokens, 11);

    // Both mid-stream reports are relayed, plus the aggregated terminal one
    let usage_frames: Vec<_> = frames.iter().filter(|f| f.contains("prompt_tokens")).collect();
    assert_eq!(usage_frames.len(), 3);
    assert_eq!(parse_data(usage_frames[0])["usage"]["total_tokens"], 9);
    assert_eq!(parse_data(usage_frames[2])["usage"]["total_tokens"], 11);
}

#[tokio::test]
async fn anthropic_target_renders_native_events() {
    let adapter =
        StreamAdapter::new(Dialect::Openai, Dialect::Anthropic, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);

    let (frames, outcome) = run(&adapter, bytes).await;
    outcome.unwrap();

    assert!(frames[0].starts_with("event: content_block_delta\n"));
    assert!(frames.last().unwrap().starts_with("event: message_stop\n"));
    assert!(!frames.iter().any(|f| f.contains("[DONE]")));
}

#[tokio::test]
async fn google_target_is_rejected() {
    let err = StreamAdapter::new(Dialect::Openai, Dialect::Google, "gpt-4o", AdapterOptions::default()).unwrap_err();
    assert!(matches!(err, LlmError::UnsupportedDialect { .. }));
}

#[tokio::test]
async fn collect_buffers_the_whole_turn() {
    let adapter = StreamAdapter::new(Dialect::Openai, Dialect::Openai, "gpt-4o", AdapterOptions::default()).unwrap();

    let bytes = openai_sse(&[
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
        r#"{"id":"u1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        "[DONE]",
    ]);

    let response = adapter.collect(bytes).await.unwrap();
    assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello!"));
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().total_tokens, 5);
}
