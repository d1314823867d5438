//! End-to-end turn tests over a scripted model and an in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_stream::StreamExt;
use uuid::Uuid;

use quill_agent::{
    AgentService, ChannelTransport, ModelOutput, ModelResponse, NoteMetaCache, QueryEmbedder,
    ScriptedProvider, SessionController, SessionState, StreamEvent, StringSink, ToolDispatcher,
};
use quill_core::{
    CandidateSource, ChatEvent, CreateNoteRequest, Error, Note, NoteCandidate, Result,
    SearchQuery, UpdateNoteRequest, EMBEDDING_DIM,
};
use quill_db::NoteRepository;
use quill_search::{InMemorySource, RetrievalGateway};

/// Note store shared between the repository and the candidate source, so a
/// note created mid-turn is visible to searches later in the same turn.
#[derive(Clone, Default)]
struct MemoryStore {
    notes: Arc<Mutex<HashMap<Uuid, Note>>>,
}

impl MemoryStore {
    fn snapshot(&self) -> Vec<Note> {
        self.notes.lock().unwrap().values().cloned().collect()
    }

    fn insert(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id, note);
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn create(&self, owner_id: Uuid, req: CreateNoteRequest) -> Result<Note> {
        let note = Note {
            id: Uuid::new_v4(),
            owner_id,
            title: req.title,
            content: req.content,
            note_type: req.note_type,
            tags: req.tags,
            archived: req.archived,
            embedding: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.insert(note.clone());
        Ok(note)
    }

    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Note> {
        self.notes
            .lock()
            .unwrap()
            .get(&id)
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .ok_or(Error::NoteNotFound(id))
    }

    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .notes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(&id)
            .filter(|n| n.owner_id == owner_id)
            .ok_or(Error::NoteNotFound(id))?;
        let (title, content) =
            req.merged_title_content(note.title.as_deref(), note.content.as_deref())?;
        note.title = title;
        note.content = content;
        if let Some(t) = req.note_type {
            note.note_type = t;
        }
        if let Some(tags) = req.tags {
            note.tags = Some(quill_core::normalize_tags(tags));
        }
        if let Some(archived) = req.archived {
            note.archived = archived;
        }
        note.updated_at = Some(Utc::now());
        Ok(note.clone())
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        match notes.get(&id) {
            Some(n) if n.owner_id == owner_id => {
                notes.remove(&id);
                Ok(())
            }
            _ => Err(Error::NoteNotFound(id)),
        }
    }

    async fn set_embedding(&self, owner_id: Uuid, id: Uuid, embedding: &[f32]) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(&id)
            .filter(|n| n.owner_id == owner_id)
            .ok_or(Error::NoteNotFound(id))?;
        note.embedding = Some(embedding.to_vec());
        Ok(())
    }
}

#[async_trait]
impl CandidateSource for MemoryStore {
    async fn candidates(&self, owner_id: Uuid, query: &SearchQuery) -> Result<Vec<NoteCandidate>> {
        InMemorySource::new(self.snapshot())
            .candidates(owner_id, query)
            .await
    }
}

fn service(
    store: MemoryStore,
    provider: ScriptedProvider,
) -> AgentService<ScriptedProvider, MemoryStore> {
    let repository: Arc<dyn NoteRepository> = Arc::new(store.clone());
    let gateway = Arc::new(RetrievalGateway::new(store));
    let meta_cache = Arc::new(NoteMetaCache::new());
    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::clone(&repository),
        gateway,
        None,
        Arc::clone(&meta_cache),
    ));
    AgentService::new(Arc::new(provider), dispatcher, repository, meta_cache)
}

fn tool_call(call_id: &str, name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse {
        response_id: Some(format!("resp_{call_id}")),
        output: vec![ModelOutput::ToolCall {
            call_id: Some(call_id.to_string()),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
    }
}

fn no_more_tools() -> ModelResponse {
    ModelResponse {
        response_id: Some("resp_done".to_string()),
        output: vec![],
    }
}

async fn collect(
    svc: &AgentService<ScriptedProvider, MemoryStore>,
    owner: Uuid,
    message: &str,
) -> Vec<ChatEvent> {
    svc.chat_stream(owner, message.to_string(), None)
        .collect()
        .await
}

#[tokio::test]
async fn test_search_turn_streams_answer_with_sources() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: owner,
        title: Some("Groceries".to_string()),
        content: Some("milk, eggs".to_string()),
        note_type: Default::default(),
        tags: Some(vec!["food".to_string()]),
        archived: false,
        embedding: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    let note_id = note.id;
    store.insert(note);

    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c1", "search_notes", json!({"query": "milk"})))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("You have milk ".to_string())),
            Ok(StreamEvent::Delta("on the grocery list.".to_string())),
            Ok(StreamEvent::Completed {
                response_id: Some("resp_final".to_string()),
            }),
        ]);

    let svc = service(store, provider);
    let events = collect(&svc, owner, "do I need milk?").await;

    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "tool_call",
            "tool_result",
            "final_start",
            "final_delta",
            "final_delta",
            "final_done"
        ]
    );
    match events.last().unwrap() {
        ChatEvent::FinalDone {
            response_id,
            sources,
        } => {
            assert_eq!(response_id.as_deref(), Some("resp_final"));
            assert_eq!(sources, &vec![note_id]);
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test]
async fn test_tool_rounds_capped_at_three() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    // The model keeps asking for searches; only three rounds run.
    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c1", "search_notes", json!({"query": "a"})))
        .push_completion(tool_call("c2", "search_notes", json!({"query": "b"})))
        .push_completion(tool_call("c3", "search_notes", json!({"query": "c"})))
        .push_stream(vec![
            Ok(StreamEvent::Delta("Nothing found.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);

    let svc = service(store, provider);
    let events = collect(&svc, owner, "keep digging").await;

    let tool_calls = events
        .iter()
        .filter(|e| e.kind() == "tool_call")
        .count();
    assert_eq!(tool_calls, 3);
    assert_eq!(events.last().unwrap().kind(), "final_done");
}

#[tokio::test]
async fn test_stream_open_failure_falls_back_to_one_shot() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    let provider = ScriptedProvider::new()
        .push_completion(no_more_tools())
        .push_stream_open_error(Error::Request("connect timeout".to_string()))
        .push_completion(ModelResponse {
            response_id: Some("resp_fb".to_string()),
            output: vec![ModelOutput::Text("Here is your answer.".to_string())],
        });

    let svc = service(store, provider);
    let events = collect(&svc, owner, "hello").await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        ChatEvent::Final {
            response,
            response_id,
            ..
        } => {
            assert_eq!(response, "Here is your answer.");
            assert_eq!(response_id.as_deref(), Some("resp_fb"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_planning_failure_emits_error_with_code() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    let provider = ScriptedProvider::new().push_completion_error(Error::UpstreamModel {
        code: Some("rate_limit_exceeded".to_string()),
        message: "429 from upstream".to_string(),
    });

    let svc = service(store, provider);
    let events = collect(&svc, owner, "hi").await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        ChatEvent::Error { message, code } => {
            assert_eq!(code.as_deref(), Some("rate_limit_exceeded"));
            assert!(!message.contains("429"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_mid_stream_failure_emits_error_after_deltas() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    let provider = ScriptedProvider::new()
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("partial".to_string())),
            Err(Error::StreamTransport("connection reset".to_string())),
        ]);

    let svc = service(store, provider);
    let events = collect(&svc, owner, "hi").await;

    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["final_start", "final_delta", "error"]);
    match events.last().unwrap() {
        ChatEvent::Error { message, .. } => assert!(!message.contains("connection reset")),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_create_search_archive_round_trip() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    // Turn 1: create the note.
    let provider = ScriptedProvider::new()
        .push_completion(tool_call(
            "c1",
            "create_note",
            json!({"title": "Groceries", "content": "milk, eggs", "tags": ["food"]}),
        ))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Saved it.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);
    let svc = service(store.clone(), provider);
    let events = collect(&svc, owner, "note down milk and eggs").await;
    let created_id = match &events[events.len() - 1] {
        ChatEvent::FinalDone { sources, .. } => sources[0],
        other => panic!("unexpected terminal event: {other:?}"),
    };

    // Turn 2: search finds it.
    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c2", "search_notes", json!({"query": "milk"})))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Milk is on the grocery note.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);
    let svc = service(store.clone(), provider);
    let events = collect(&svc, owner, "where did I put milk?").await;
    match events.last().unwrap() {
        ChatEvent::FinalDone { sources, .. } => assert_eq!(sources, &vec![created_id]),
        other => panic!("unexpected terminal event: {other:?}"),
    }

    // Turn 3: archive it, then an active-only search comes up empty.
    let provider = ScriptedProvider::new()
        .push_completion(tool_call(
            "c3",
            "update_note",
            json!({"note_id": created_id, "archived": true}),
        ))
        .push_completion(tool_call(
            "c4",
            "search_notes",
            json!({"query": "milk", "archived": false}),
        ))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Archived; no active notes mention milk.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);
    let svc = service(store.clone(), provider);
    let events = collect(&svc, owner, "archive the grocery note").await;
    assert_eq!(events.last().unwrap().kind(), "final_done");

    let archived = store.snapshot();
    assert!(archived.iter().all(|n| n.archived));
    assert!(archived[0].updated_at.is_some());
}

#[tokio::test]
async fn test_owner_isolation_in_search_tool() {
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let store = MemoryStore::default();
    store.insert(Note {
        id: Uuid::new_v4(),
        owner_id: other,
        title: Some("Secret plans".to_string()),
        content: Some("milk heist".to_string()),
        note_type: Default::default(),
        tags: None,
        archived: false,
        embedding: None,
        created_at: Utc::now(),
        updated_at: None,
    });

    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c1", "search_notes", json!({"query": "milk"})))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Nothing about milk.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);

    let svc = service(store, provider);
    let events = collect(&svc, owner, "find milk").await;
    match events.last().unwrap() {
        ChatEvent::FinalDone { sources, .. } => assert!(sources.is_empty()),
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test]
async fn test_sanitized_tool_call_hides_note_content() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    let provider = ScriptedProvider::new()
        .push_completion(tool_call(
            "c1",
            "create_note",
            json!({"title": "Diary", "content": "very private text"}),
        ))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Saved.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);

    let svc = service(store, provider);
    let events = collect(&svc, owner, "save my diary entry").await;

    match &events[0] {
        ChatEvent::ToolCall { arguments, .. } => {
            assert_eq!(arguments["title"], "Diary");
            assert!(arguments.get("content").is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_agent_feeds_session_over_channel_transport() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: owner,
        title: Some("Groceries".to_string()),
        content: Some("milk, eggs".to_string()),
        note_type: Default::default(),
        tags: None,
        archived: false,
        embedding: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    let note_id = note.id;
    store.insert(note);

    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c1", "search_notes", json!({"query": "milk"})))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Milk is on the list.".to_string())),
            Ok(StreamEvent::Completed {
                response_id: Some("resp_1".to_string()),
            }),
        ]);
    let svc = service(store, provider);

    let mut events = svc.chat_stream(owner, "do I need milk?".to_string(), None);
    let (tx, transport) = ChannelTransport::pair(16);
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
        }
    });

    let mut session =
        SessionController::with_refresh_interval(StringSink::new(), std::time::Duration::ZERO);
    session.run(async { Ok(transport) }).await.unwrap();
    forwarder.await.unwrap();

    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(session.sink().text(), "Milk is on the list.");
    assert_eq!(session.continuation(), Some("resp_1"));
    assert_eq!(session.sources(), &[note_id]);
}

#[tokio::test]
async fn test_search_tool_alpha_shifts_winner() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();

    let mut aligned = vec![0.0; EMBEDDING_DIM];
    aligned[0] = 1.0;
    let mut opposed = vec![0.0; EMBEDDING_DIM];
    opposed[0] = -1.0;

    // One note the query matches lexically but whose embedding points away
    // from it, and one that only the vector channel can surface.
    let lexical_note = Note {
        id: Uuid::new_v4(),
        owner_id: owner,
        title: Some("milk milk milk".to_string()),
        content: None,
        note_type: Default::default(),
        tags: None,
        archived: false,
        embedding: Some(opposed),
        created_at: Utc::now(),
        updated_at: None,
    };
    let semantic_note = Note {
        id: Uuid::new_v4(),
        owner_id: owner,
        title: Some("groceries".to_string()),
        content: None,
        note_type: Default::default(),
        tags: None,
        archived: false,
        embedding: Some(aligned.clone()),
        created_at: Utc::now(),
        updated_at: None,
    };
    let lexical_id = lexical_note.id;
    let semantic_id = semantic_note.id;
    store.insert(lexical_note);
    store.insert(semantic_note);

    let embedder: Arc<dyn QueryEmbedder> = Arc::new(
        ScriptedProvider::new()
            .push_embedding(aligned.clone())
            .push_embedding(aligned),
    );
    let repository: Arc<dyn NoteRepository> = Arc::new(store.clone());
    let gateway = Arc::new(RetrievalGateway::new(store));
    let dispatcher = ToolDispatcher::new(
        repository,
        gateway,
        Some(embedder),
        Arc::new(NoteMetaCache::new()),
    );

    let args = json!({"query": "milk", "alpha": 1.0}).to_string();
    let outcome = dispatcher
        .execute(owner, "search_notes", &args)
        .await
        .unwrap();
    assert_eq!(outcome.source_ids[0], lexical_id);

    let args = json!({"query": "milk", "alpha": 0.0}).to_string();
    let outcome = dispatcher
        .execute(owner, "search_notes", &args)
        .await
        .unwrap();
    assert_eq!(outcome.source_ids[0], semantic_id);
}

#[tokio::test]
async fn test_note_meta_served_from_cache_after_search() {
    let owner = Uuid::new_v4();
    let store = MemoryStore::default();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: owner,
        title: Some("Groceries".to_string()),
        content: Some("milk".to_string()),
        note_type: Default::default(),
        tags: None,
        archived: false,
        embedding: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    let note_id = note.id;
    store.insert(note);

    let provider = ScriptedProvider::new()
        .push_completion(tool_call("c1", "search_notes", json!({"query": "milk"})))
        .push_completion(no_more_tools())
        .push_stream(vec![
            Ok(StreamEvent::Delta("Found it.".to_string())),
            Ok(StreamEvent::Completed { response_id: None }),
        ]);

    let svc = service(store, provider);
    let _ = collect(&svc, owner, "find milk").await;

    let meta = svc.note_meta(owner, note_id).await.unwrap();
    assert_eq!(meta.title.as_deref(), Some("Groceries"));

    // Another owner cannot fetch an uncached note's preview.
    let stranger = Uuid::new_v4();
    let miss = svc.note_meta(stranger, Uuid::new_v4()).await;
    assert!(miss.is_err());
}
