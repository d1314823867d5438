//! Model provider seam.
//!
//! One turn of the agent alternates between tool rounds (`complete`) and the
//! streamed answer (`stream_final`). Both operate on the same request shape
//! so a round's `response_id` can thread straight into the next call.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use quill_core::Result;

/// A request to the model: instructions, conversation input items, tool
/// schemas, and the continuation token from the previous response.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub instructions: String,
    /// Conversation items in wire form (user messages, tool outputs).
    pub input: Vec<Value>,
    /// Tool schemas offered to the model; empty for the final answer.
    pub tools: Vec<Value>,
    pub previous_response_id: Option<String>,
}

impl ModelRequest {
    /// Append a user message item.
    pub fn push_user_message(&mut self, text: &str) {
        self.input.push(serde_json::json!({
            "role": "user",
            "content": text,
        }));
    }

    /// Append a tool output item correlated by call id.
    pub fn push_tool_output(&mut self, call_id: &str, output: &Value) {
        self.input.push(serde_json::json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": output.to_string(),
        }));
    }
}

/// One item of a completed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// The model wants a tool invoked.
    ToolCall {
        call_id: Option<String>,
        name: String,
        /// Raw JSON argument string as the model produced it.
        arguments: String,
    },
    /// Assistant text.
    Text(String),
}

/// A completed (non-streamed) model response.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub response_id: Option<String>,
    pub output: Vec<ModelOutput>,
}

impl ModelResponse {
    /// All tool calls in this response, in order.
    pub fn tool_calls(&self) -> Vec<(&Option<String>, &str, &str)> {
        self.output
            .iter()
            .filter_map(|o| match o {
                ModelOutput::ToolCall {
                    call_id,
                    name,
                    arguments,
                } => Some((call_id, name.as_str(), arguments.as_str())),
                ModelOutput::Text(_) => None,
            })
            .collect()
    }

    /// Concatenated assistant text, None when the response has none.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .output
            .iter()
            .filter_map(|o| match o {
                ModelOutput::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// One event of a streamed final answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An answer increment.
    Delta(String),
    /// The stream finished; carries the response id for continuation.
    Completed { response_id: Option<String> },
}

/// Stream of final-answer events.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A conversational model backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Run one non-streamed round (tool selection or fallback answer).
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Stream the final answer for the turn.
    async fn stream_final(&self, request: &ModelRequest) -> Result<TokenStream>;
}

/// Produces query embeddings for the agent's hybrid searches.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embed one query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
