//! Upstream provider client
//!
//! [`UpstreamClient`] is the seam between the agent loop and the network;
//! tests drive the loop with scripted byte streams behind the same trait.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axon_core::{Dialect, LanguageModelRegistry, SecretResolver};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::google::GoogleErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;
use crate::request::ProviderRequest;
use crate::types::CompletionRequest;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Cap on error body text carried into error values
const ERROR_BODY_LIMIT: usize = 512;

/// Raw provider response bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Opens streaming completions against an upstream provider
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Submit a request and return the dialect plus the response byte stream
    ///
    /// The deadline covers the whole turn, from connect to the last body
    /// byte. Cancelling the token ends the byte stream and releases the
    /// connection.
    async fn open_stream(
        &self,
        request: &CompletionRequest,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<(Dialect, ByteStream), LlmError>;
}

/// HTTP client resolving models through the registry
pub struct HttpProviderClient {
    http: reqwest::Client,
    registry: Arc<dyn LanguageModelRegistry>,
    secrets: Arc<dyn SecretResolver>,
}

impl HttpProviderClient {
    /// Build a client over a model registry and secret resolver
    pub fn new(registry: Arc<dyn LanguageModelRegistry>, secrets: Arc<dyn SecretResolver>) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry,
            secrets,
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpProviderClient {
    async fn open_stream(
        &self,
        request: &CompletionRequest,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<(Dialect, ByteStream), LlmError> {
        let endpoint = self.registry.lookup(&request.model).ok_or_else(|| LlmError::ModelNotFound {
            model: request.model.clone(),
        })?;

        let secret = self
            .secrets
            .resolve(&endpoint.credential_key)
            .ok_or_else(|| LlmError::MissingCredential {
                key: endpoint.credential_key.clone(),
            })?;

        let body = ProviderRequest::from_canonical(request, endpoint.dialect).to_wire()?;

        let base = endpoint.endpoint.as_str().trim_end_matches('/').to_owned();
        let mut builder = match endpoint.dialect {
            Dialect::Openai => self
                .http
                .post(format!("{base}/chat/completions"))
                .bearer_auth(secret.expose_secret()),
            Dialect::Anthropic => self
                .http
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", secret.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            Dialect::Google => self
                .http
                .post(format!(
                    "{base}/models/{}:streamGenerateContent?alt=sse",
                    request.model
                ))
                .header("x-goog-api-key", secret.expose_secret()),
        };

        for (name, value) in &endpoint.default_headers {
            builder = builder.header(name, value);
        }

        tracing::debug!(model = %request.model, dialect = %endpoint.dialect, "opening upstream stream");

        let response = builder
            .header(http::header::ACCEPT, "text/event-stream")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::UpstreamTimeout
                } else {
                    LlmError::UpstreamUnreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(endpoint.dialect, &body);
            tracing::warn!(model = %request.model, dialect = %endpoint.dialect, status = %status, "upstream request failed");
            return Err(LlmError::UpstreamHttp { status, message });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::UpstreamTimeout
                } else {
                    LlmError::MalformedStream(e.to_string())
                }
            })
            .take_until(cancel.cancelled_owned());

        Ok((endpoint.dialect, Box::pin(stream)))
    }
}

/// Pull a human-readable message out of a provider error body
fn extract_error_message(dialect: Dialect, body: &str) -> String {
    let parsed = match dialect {
        Dialect::Openai => serde_json::from_str::<OpenAiErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
        Dialect::Anthropic => serde_json::from_str::<AnthropicErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
        Dialect::Google => serde_json::from_str::<GoogleErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
    };

    parsed.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "no response body".to_owned()
        } else {
            trimmed.chars().take(ERROR_BODY_LIMIT).collect()
        }
    })
}
