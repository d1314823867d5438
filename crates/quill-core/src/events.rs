//! Chat stream wire events.
//!
//! One conversational turn emits a sequence of these events over the
//! transport. The ordering contract is part of the protocol: any number of
//! `tool_call`/`tool_result` pairs, then either `final_start` → `final_delta`*
//! → `final_done` (streamed answer) or a single `final` (one-shot answer).
//! `error` may arrive at any point and terminates the turn.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One event in a chat turn's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The model requested a tool invocation.
    ToolCall {
        /// Correlates with the matching `tool_result`; may be absent when the
        /// upstream model did not assign one.
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        name: String,
        /// Sanitized arguments, safe to show to the caller.
        arguments: serde_json::Value,
    },
    /// A previously announced tool invocation completed.
    ToolResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        name: String,
    },
    /// The streamed answer is about to begin.
    FinalStart,
    /// One increment of the streamed answer.
    FinalDelta { delta: String },
    /// The streamed answer is complete.
    FinalDone {
        /// Continuation token for the next turn.
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        /// Ids of notes consulted while answering.
        sources: Vec<Uuid>,
    },
    /// A complete answer delivered in one piece (non-streamed fallback).
    Final {
        response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        sources: Vec<Uuid>,
    },
    /// The turn failed; no further events follow.
    Error {
        /// User-facing message, never internal diagnostics.
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ChatEvent {
    /// Wire name of this event, used as the SSE event field.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::ToolCall { .. } => "tool_call",
            ChatEvent::ToolResult { .. } => "tool_result",
            ChatEvent::FinalStart => "final_start",
            ChatEvent::FinalDelta { .. } => "final_delta",
            ChatEvent::FinalDone { .. } => "final_done",
            ChatEvent::Final { .. } => "final",
            ChatEvent::Error { .. } => "error",
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatEvent::FinalDone { .. } | ChatEvent::Final { .. } | ChatEvent::Error { .. }
        )
    }
}
