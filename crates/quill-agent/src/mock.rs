//! Scripted model provider for deterministic testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use quill_core::{Error, Result};

use crate::provider::{
    ModelProvider, ModelRequest, ModelResponse, QueryEmbedder, StreamEvent, TokenStream,
};

/// A provider that replays scripted responses in order.
///
/// `complete` pops from the completion script; `stream_final` pops from the
/// stream script. An exhausted script is an error, so a test that makes more
/// rounds than it scripted fails loudly.
#[derive(Default)]
pub struct ScriptedProvider {
    completions: Mutex<VecDeque<Result<ModelResponse>>>,
    streams: Mutex<VecDeque<Result<Vec<Result<StreamEvent>>>>>,
    embeddings: Mutex<VecDeque<Result<Vec<f32>>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a completion response.
    pub fn push_completion(self, response: ModelResponse) -> Self {
        self.completions.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue a completion failure.
    pub fn push_completion_error(self, error: Error) -> Self {
        self.completions.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue a streamed final answer.
    pub fn push_stream(self, events: Vec<Result<StreamEvent>>) -> Self {
        self.streams.lock().unwrap().push_back(Ok(events));
        self
    }

    /// Queue a stream that fails to open.
    pub fn push_stream_open_error(self, error: Error) -> Self {
        self.streams.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue a query embedding.
    pub fn push_embedding(self, embedding: Vec<f32>) -> Self {
        self.embeddings.lock().unwrap().push_back(Ok(embedding));
        self
    }

    /// Queue an embedding failure.
    pub fn push_embedding_error(self, error: Error) -> Self {
        self.embeddings.lock().unwrap().push_back(Err(error));
        self
    }

    /// Requests seen so far, for assertions.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("completion script exhausted".to_string())))
    }

    async fn stream_final(&self, request: &ModelRequest) -> Result<TokenStream> {
        self.requests.lock().unwrap().push(request.clone());
        let events = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("stream script exhausted".to_string())))?;
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[async_trait]
impl QueryEmbedder for ScriptedProvider {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        self.embeddings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("embedding script exhausted".to_string())))
    }
}
