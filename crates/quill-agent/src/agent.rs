//! Turn orchestration: model calls, tool execution, final answer streaming.
//!
//! A turn has two phases. The planning phase runs non-streamed completions
//! with the note tools attached, executing each requested call and feeding
//! the output back, up to [`MAX_TOOL_ROUNDS`] rounds. The answer phase
//! streams the final text with tools withheld; if the stream fails to open,
//! one non-streamed completion produces a one-shot answer instead.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use quill_core::{CandidateSource, ChatEvent, Error, NoteMeta, Result};
use quill_db::NoteRepository;

use crate::cache::NoteMetaCache;
use crate::provider::{ModelProvider, ModelRequest, StreamEvent};
use crate::tools::{sanitize_arguments, tool_definitions, ToolDispatcher};

/// Maximum tool rounds per turn before the model must answer.
pub const MAX_TOOL_ROUNDS: usize = 3;

const EVENT_BUFFER: usize = 64;

/// Most tags carried into the instructions, newest notes first.
const MAX_INSTRUCTION_TAGS: usize = 50;

fn planning_instructions(tags: &[String]) -> String {
    let mut s = String::from(
        "You are a personal notes assistant. Use the provided tools to search \
         and manage the user's notes. Gather everything you need with tools \
         before answering; do not produce the answer in this phase.",
    );
    if !tags.is_empty() {
        s.push_str("\nTags already in use: ");
        s.push_str(&tags.join(", "));
        s.push_str(". Prefer reusing existing tags over inventing new ones.");
    }
    s
}

const ANSWER_INSTRUCTIONS: &str = "Answer the user's request using the note tool \
     results gathered so far. Be concise and do not mention the tools.";

const ANSWER_NUDGE: &str = "Answer now based on what you found.";

fn upstream_code(e: &Error) -> Option<String> {
    match e {
        Error::UpstreamModel { code, .. } => code.clone(),
        _ => None,
    }
}

fn error_event(e: &Error) -> ChatEvent {
    ChatEvent::Error {
        message: e.user_message(),
        code: upstream_code(e),
    }
}

/// Append ids not yet present, preserving first-seen order.
fn merge_sources(acc: &mut Vec<Uuid>, new_ids: &[Uuid]) {
    for id in new_ids {
        if !acc.contains(id) {
            acc.push(*id);
        }
    }
}

/// Conversational agent over the notes backend.
pub struct AgentService<P, S: CandidateSource> {
    provider: Arc<P>,
    dispatcher: Arc<ToolDispatcher<S>>,
    repository: Arc<dyn NoteRepository>,
    meta_cache: Arc<NoteMetaCache>,
}

impl<P, S> AgentService<P, S>
where
    P: ModelProvider + 'static,
    S: CandidateSource + 'static,
{
    pub fn new(
        provider: Arc<P>,
        dispatcher: Arc<ToolDispatcher<S>>,
        repository: Arc<dyn NoteRepository>,
        meta_cache: Arc<NoteMetaCache>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            repository,
            meta_cache,
        }
    }

    /// Run one turn, emitting events as they happen.
    ///
    /// The returned stream always ends with a terminal event: `final_done`,
    /// `final`, or `error`. Dropping the stream cancels the turn.
    pub fn chat_stream(
        &self,
        owner_id: Uuid,
        message: String,
        previous_response_id: Option<String>,
    ) -> ReceiverStream<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let provider = Arc::clone(&self.provider);
        let dispatcher = Arc::clone(&self.dispatcher);
        let repository = Arc::clone(&self.repository);

        tokio::spawn(async move {
            run_turn(
                provider,
                dispatcher,
                repository,
                owner_id,
                message,
                previous_response_id,
                tx,
            )
            .await;
        });

        ReceiverStream::new(rx)
    }

    /// Preview of a note referenced as an answer source.
    pub async fn note_meta(&self, owner_id: Uuid, id: Uuid) -> Result<NoteMeta> {
        if let Some(meta) = self.meta_cache.get(owner_id, id) {
            return Ok(meta);
        }
        let note = self.repository.fetch(owner_id, id).await?;
        let meta = NoteMeta::from(&note);
        self.meta_cache.put(owner_id, meta.clone());
        Ok(meta)
    }
}

/// Distinct tags across the owner's recent notes, first-seen order.
async fn tag_vocabulary(repository: &dyn NoteRepository, owner_id: Uuid) -> Vec<String> {
    let notes = match repository.list(owner_id, 200, 0).await {
        Ok(notes) => notes,
        Err(e) => {
            warn!(
                subsystem = "agent",
                component = "service",
                error = %e,
                "Tag vocabulary lookup failed"
            );
            return Vec::new();
        }
    };
    let mut tags = Vec::new();
    for note in &notes {
        for tag in note.tags_slice() {
            if !tags.contains(tag) {
                tags.push(tag.clone());
                if tags.len() >= MAX_INSTRUCTION_TAGS {
                    return tags;
                }
            }
        }
    }
    tags
}

async fn run_turn<P, S>(
    provider: Arc<P>,
    dispatcher: Arc<ToolDispatcher<S>>,
    repository: Arc<dyn NoteRepository>,
    owner_id: Uuid,
    message: String,
    previous_response_id: Option<String>,
    tx: mpsc::Sender<ChatEvent>,
) where
    P: ModelProvider,
    S: CandidateSource,
{
    let tags = tag_vocabulary(repository.as_ref(), owner_id).await;

    let mut request = ModelRequest {
        instructions: planning_instructions(&tags),
        input: Vec::new(),
        tools: tool_definitions(),
        previous_response_id,
    };
    request.push_user_message(&message);

    let mut sources: Vec<Uuid> = Vec::new();

    // Planning phase: tool rounds.
    let mut rounds = 0;
    while rounds < MAX_TOOL_ROUNDS {
        let response = match provider.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    subsystem = "agent",
                    component = "service",
                    op = "complete",
                    error = %e,
                    "Planning completion failed"
                );
                let _ = tx.send(error_event(&e)).await;
                return;
            }
        };

        let calls: Vec<(Option<String>, String, String)> = response
            .tool_calls()
            .into_iter()
            .map(|(id, name, args)| (id.clone(), name.to_string(), args.to_string()))
            .collect();

        // Submitted input is now part of the threaded conversation.
        request.previous_response_id = response.response_id.clone();
        request.input.clear();

        if calls.is_empty() {
            break;
        }

        for (call_id, name, arguments) in &calls {
            let visible: Value =
                serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            if tx
                .send(ChatEvent::ToolCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: sanitize_arguments(name, &visible),
                })
                .await
                .is_err()
            {
                return;
            }

            let outcome = match dispatcher.execute(owner_id, name, arguments).await {
                Ok(o) => o,
                Err(e) => {
                    warn!(
                        subsystem = "agent",
                        component = "service",
                        op = "tool",
                        tool = name.as_str(),
                        error = %e,
                        "Tool execution failed"
                    );
                    let _ = tx.send(error_event(&e)).await;
                    return;
                }
            };
            merge_sources(&mut sources, &outcome.source_ids);

            if tx
                .send(ChatEvent::ToolResult {
                    call_id: call_id.clone(),
                    name: name.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            match call_id {
                Some(id) => request.push_tool_output(id, &outcome.result),
                None => {
                    // Without a call id the output cannot be threaded back.
                    warn!(
                        subsystem = "agent",
                        component = "service",
                        tool = name.as_str(),
                        "Tool call without call_id, output dropped"
                    );
                }
            }
        }

        rounds += 1;
    }

    info!(
        subsystem = "agent",
        component = "service",
        op = "turn",
        rounds,
        sources = sources.len(),
        "Planning phase complete"
    );

    // Answer phase: tools withheld, final text streamed.
    request.tools = Vec::new();
    request.instructions = ANSWER_INSTRUCTIONS.to_string();
    if request.input.is_empty() {
        request.push_user_message(ANSWER_NUDGE);
    }

    match provider.stream_final(&request).await {
        Ok(mut stream) => {
            if tx.send(ChatEvent::FinalStart).await.is_err() {
                return;
            }
            while let Some(event) = stream.next().await {
                match event {
                    Ok(StreamEvent::Delta(delta)) => {
                        if tx.send(ChatEvent::FinalDelta { delta }).await.is_err() {
                            return;
                        }
                    }
                    Ok(StreamEvent::Completed { response_id }) => {
                        let _ = tx
                            .send(ChatEvent::FinalDone {
                                response_id,
                                sources: sources.clone(),
                            })
                            .await;
                        return;
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "agent",
                            component = "service",
                            op = "stream_final",
                            error = %e,
                            "Final stream failed mid-answer"
                        );
                        let _ = tx.send(error_event(&e)).await;
                        return;
                    }
                }
            }
            // Stream ended without a completion marker.
            let _ = tx
                .send(error_event(&Error::StreamTransport(
                    "final stream ended without completion".to_string(),
                )))
                .await;
        }
        Err(open_err) => {
            warn!(
                subsystem = "agent",
                component = "service",
                op = "stream_final",
                error = %open_err,
                "Final stream failed to open, falling back to one-shot"
            );
            match provider.complete(&request).await {
                Ok(response) => {
                    let text = response.text().unwrap_or_default();
                    let _ = tx
                        .send(ChatEvent::Final {
                            response: text,
                            response_id: response.response_id,
                            sources,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(error_event(&e)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sources_dedupes_preserving_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut acc = vec![a];
        merge_sources(&mut acc, &[b, a, c, b]);
        assert_eq!(acc, vec![a, b, c]);
    }

    #[test]
    fn test_planning_instructions_include_tags() {
        let s = planning_instructions(&["health".to_string(), "food".to_string()]);
        assert!(s.contains("health, food"));
        let bare = planning_instructions(&[]);
        assert!(!bare.contains("Tags already in use"));
    }

    #[test]
    fn test_error_event_carries_upstream_code() {
        let e = Error::UpstreamModel {
            code: Some("rate_limit_exceeded".to_string()),
            message: "slow down".to_string(),
        };
        match error_event(&e) {
            ChatEvent::Error { code, message } => {
                assert_eq!(code.as_deref(), Some("rate_limit_exceeded"));
                assert!(!message.contains("slow down"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
