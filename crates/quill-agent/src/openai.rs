//! OpenAI-compatible model provider (Responses API).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use quill_core::{Error, Result};

use crate::provider::{
    ModelOutput, ModelProvider, ModelRequest, ModelResponse, QueryEmbedder, StreamEvent,
    TokenStream,
};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Generation model.
    pub model: String,
    /// Embedding model for query embeddings.
    pub embed_model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible provider over the Responses API.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a provider with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "agent",
            component = "provider",
            model = %config.model,
            "Initializing model provider"
        );
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = OpenAIConfig {
            base_url: std::env::var("QUILL_MODEL_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("QUILL_MODEL_API_KEY").ok(),
            model: std::env::var("QUILL_MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            embed_model: std::env::var("QUILL_EMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string()),
            timeout_seconds: std::env::var("QUILL_MODEL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req.header("Content-Type", "application/json")
    }

    fn body(&self, request: &ModelRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "instructions": request.instructions,
            "input": request.input,
            "stream": stream,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(request.tools.clone());
        }
        if let Some(prev) = &request.previous_response_id {
            body["previous_response_id"] = serde_json::Value::String(prev.clone());
        }
        body
    }

    async fn upstream_error(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body: WireErrorEnvelope = response.json().await.unwrap_or_default();
        let message = body
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("upstream returned HTTP {}", status));
        let code = body
            .error
            .and_then(|e| e.code)
            .or_else(|| code_from_status(status).map(String::from));
        Error::UpstreamModel { code, message }
    }
}

/// Machine-readable code implied by an HTTP status when the body has none.
fn code_from_status(status: u16) -> Option<&'static str> {
    match status {
        429 => Some("rate_limit_exceeded"),
        402 | 403 => Some("insufficient_quota"),
        404 => Some("model_not_found"),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireErrorEnvelope {
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    #[serde(default)]
    output: Vec<WireOutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireOutputItem {
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: Option<String>,
        name: String,
        arguments: String,
    },
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<WireContentPart>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl WireResponse {
    fn into_model_response(self) -> ModelResponse {
        let output = self
            .output
            .into_iter()
            .filter_map(|item| match item {
                WireOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => Some(ModelOutput::ToolCall {
                    call_id,
                    name,
                    arguments,
                }),
                WireOutputItem::Message { content } => {
                    let text: String = content
                        .into_iter()
                        .filter(|p| p.kind == "output_text")
                        .map(|p| p.text)
                        .collect();
                    if text.is_empty() {
                        None
                    } else {
                        Some(ModelOutput::Text(text))
                    }
                }
                WireOutputItem::Unknown => None,
            })
            .collect();
        ModelResponse {
            response_id: self.id,
            output,
        }
    }
}

/// Reassembles SSE lines from arbitrarily split byte chunks.
///
/// The HTTP layer hands us chunks at whatever boundaries the network
/// produced, so a `data:` line may arrive in pieces. Partial lines stay
/// buffered until their newline shows up.
struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    /// Feed one chunk; returns events for every line it completed.
    fn push(&mut self, chunk: &str) -> Vec<Result<StreamEvent>> {
        self.pending.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if let Some(event) = parse_sse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }
}

/// Parse one complete SSE line into an event.
///
/// Only `data:` lines matter; the payload's own `type` field discriminates.
/// Unknown event types are skipped so protocol additions do not break older
/// clients.
fn parse_sse_line(line: &str) -> Option<Result<StreamEvent>> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }

    let payload: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return Some(Err(Error::Inference(format!(
                "Failed to parse stream chunk: {}",
                e
            ))));
        }
    };
    match payload["type"].as_str() {
        Some("response.output_text.delta") => payload["delta"]
            .as_str()
            .map(|delta| Ok(StreamEvent::Delta(delta.to_string()))),
        Some("response.completed") => {
            let response_id = payload["response"]["id"].as_str().map(String::from);
            Some(Ok(StreamEvent::Completed { response_id }))
        }
        Some("response.failed") | Some("error") => {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("stream failed")
                .to_string();
            let code = payload["error"]["code"].as_str().map(String::from);
            Some(Err(Error::UpstreamModel { code, message }))
        }
        _ => None,
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        debug!(
            subsystem = "agent",
            component = "provider",
            op = "complete",
            model = %self.config.model,
            input_items = request.input.len(),
            tool_count = request.tools.len(),
            "Requesting completion"
        );

        let response = self
            .build_request("/responses")
            .json(&self.body(request, false))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;
        Ok(wire.into_model_response())
    }

    async fn stream_final(&self, request: &ModelRequest) -> Result<TokenStream> {
        let response = self
            .build_request("/responses")
            .json(&self.body(request, true))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let mut lines = SseLineBuffer::new();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => lines.push(&String::from_utf8_lossy(&bytes)),
                Err(e) => vec![Err(Error::StreamTransport(e.to_string()))],
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl QueryEmbedder for OpenAIProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.config.embed_model,
            "input": text,
        });

        let response = self.build_request("/embeddings").json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingDatum>,
        }
        #[derive(Deserialize)]
        struct EmbeddingDatum {
            embedding: Vec<f32>,
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse embedding: {}", e)))?;
        parsed
            .data
            .pop()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Inference("Embedding response was empty".to_string()))
    }
}
