//! Conversational agent over the quillbox notes backend.
//!
//! The agent turns a user message into tool calls against the repository and
//! retrieval gateway, then streams the model's final answer as a sequence of
//! [`quill_core::ChatEvent`]s. [`session`] consumes such a sequence on the
//! receiving side and drives the visible turn state.

pub mod agent;
pub mod cache;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod session;
pub mod sink;
pub mod tools;
pub mod tracker;
pub mod transport;

pub use agent::{AgentService, MAX_TOOL_ROUNDS};
pub use cache::NoteMetaCache;
pub use mock::ScriptedProvider;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{
    ModelOutput, ModelProvider, ModelRequest, ModelResponse, QueryEmbedder, StreamEvent,
    TokenStream,
};
pub use session::{SessionController, SessionState};
pub use sink::{StringSink, TextSink, ThrottledBuffer, DEFAULT_REFRESH_INTERVAL};
pub use tools::{sanitize_arguments, tool_definitions, ToolDispatcher, ToolOutcome};
pub use tracker::{Indicator, IndicatorState, ToolTracker};
pub use transport::{ChannelTransport, Transport};
