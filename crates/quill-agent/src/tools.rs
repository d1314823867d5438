//! Note tools exposed to the model.
//!
//! Four tools: `search_notes`, `create_note`, `update_note`, `delete_note`.
//! The dispatcher executes them against the repository and retrieval gateway
//! under the authenticated owner; the model never sees or supplies owner ids.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use quill_core::{
    CandidateSource, CreateNoteRequest, Error, NoteMeta, NoteType, Result, ScoredNote,
    SearchQuery, UpdateNoteRequest, DEFAULT_ALPHA, DEFAULT_LIMIT, MAX_LIMIT, MIN_LIMIT,
};
use quill_db::NoteRepository;
use quill_search::RetrievalGateway;

use crate::cache::NoteMetaCache;
use crate::provider::QueryEmbedder;

/// JSON tool definitions handed to the model on every request.
pub fn tool_definitions() -> Vec<Value> {
    let note_types: Vec<&str> = NoteType::ALL.iter().map(|t| t.as_str()).collect();
    vec![
        json!({
            "type": "function",
            "name": "search_notes",
            "description": "Search the user's notes by text, tags, type, archived state, and time ranges. Returns ranked matches.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Free-text search query"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "match_all_tags": {"type": "boolean", "description": "Require every tag instead of any"},
                    "note_type": {"type": "string", "enum": note_types},
                    "archived": {"type": "boolean"},
                    "alpha": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": DEFAULT_ALPHA, "description": "Blend weight: 1.0 is purely lexical, 0.0 purely semantic"},
                    "limit": {"type": "integer", "minimum": MIN_LIMIT, "maximum": MAX_LIMIT, "default": DEFAULT_LIMIT},
                    "created_from": {"type": "string", "format": "date-time"},
                    "created_to": {"type": "string", "format": "date-time"},
                    "updated_from": {"type": "string", "format": "date-time"},
                    "updated_to": {"type": "string", "format": "date-time"}
                },
                "required": []
            }
        }),
        json!({
            "type": "function",
            "name": "create_note",
            "description": "Create a new note. At least one of title or content is required.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "note_type": {"type": "string", "enum": note_types, "default": "note"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": []
            }
        }),
        json!({
            "type": "function",
            "name": "update_note",
            "description": "Update fields of an existing note. Omitted fields are unchanged; an empty title or content clears that field.",
            "parameters": {
                "type": "object",
                "properties": {
                    "note_id": {"type": "string", "format": "uuid"},
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "note_type": {"type": "string", "enum": note_types},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "archived": {"type": "boolean"}
                },
                "required": ["note_id"]
            }
        }),
        json!({
            "type": "function",
            "name": "delete_note",
            "description": "Permanently delete a note by id.",
            "parameters": {
                "type": "object",
                "properties": {
                    "note_id": {"type": "string", "format": "uuid"}
                },
                "required": ["note_id"]
            }
        }),
    ]
}

/// Reduce tool arguments to the fields safe to echo to the user.
///
/// Search arguments are fully visible; note mutations hide free-form content
/// and expose only identifying fields.
pub fn sanitize_arguments(tool_name: &str, arguments: &Value) -> Value {
    let keep: &[&str] = match tool_name {
        "search_notes" => {
            return arguments.clone();
        }
        "create_note" | "update_note" => &["note_type", "tags", "title"],
        "delete_note" => &["note_id"],
        _ => &[],
    };
    let mut out = serde_json::Map::new();
    if let Some(obj) = arguments.as_object() {
        for key in keep {
            if let Some(v) = obj.get(*key) {
                out.insert((*key).to_string(), v.clone());
            }
        }
    }
    Value::Object(out)
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(default)]
    match_all_tags: bool,
    note_type: Option<String>,
    archived: Option<bool>,
    alpha: Option<f32>,
    limit: Option<i64>,
    created_from: Option<DateTime<Utc>>,
    created_to: Option<DateTime<Utc>>,
    updated_from: Option<DateTime<Utc>>,
    updated_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    note_id: Uuid,
    title: Option<String>,
    content: Option<String>,
    note_type: Option<String>,
    tags: Option<Vec<String>>,
    archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    note_id: Uuid,
}

fn parse_note_type(s: &str) -> Result<NoteType> {
    NoteType::parse(s).ok_or_else(|| Error::Validation(format!("Unknown note type: {s}")))
}

fn scored_to_json(note: &ScoredNote) -> Value {
    json!({
        "id": note.id,
        "title": note.title,
        "content": note.content,
        "note_type": note.note_type.as_str(),
        "tags": note.tags,
        "archived": note.archived,
        "created_at": note.created_at,
        "updated_at": note.updated_at,
        "rank": note.rank,
    })
}

/// Outcome of one tool execution.
pub struct ToolOutcome {
    /// JSON payload fed back to the model as the tool output.
    pub result: Value,
    /// Notes this execution touched or surfaced, in result order.
    pub source_ids: Vec<Uuid>,
}

/// Executes tool calls against the notes backend.
pub struct ToolDispatcher<S: CandidateSource> {
    repository: Arc<dyn NoteRepository>,
    gateway: Arc<RetrievalGateway<S>>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    meta_cache: Arc<NoteMetaCache>,
}

impl<S: CandidateSource> ToolDispatcher<S> {
    pub fn new(
        repository: Arc<dyn NoteRepository>,
        gateway: Arc<RetrievalGateway<S>>,
        embedder: Option<Arc<dyn QueryEmbedder>>,
        meta_cache: Arc<NoteMetaCache>,
    ) -> Self {
        Self {
            repository,
            gateway,
            embedder,
            meta_cache,
        }
    }

    /// Execute one tool call.
    ///
    /// Recoverable failures (bad arguments, missing notes) come back as an
    /// error payload the model can react to; infrastructure failures
    /// propagate and end the turn.
    pub async fn execute(
        &self,
        owner_id: Uuid,
        tool_name: &str,
        arguments: &str,
    ) -> Result<ToolOutcome> {
        let parsed: Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => {
                return Ok(recoverable(format!("Invalid tool arguments: {e}")));
            }
        };

        info!(
            subsystem = "agent",
            component = "tools",
            op = "execute",
            tool = tool_name,
            args = %log_preview(&sanitize_arguments(tool_name, &parsed)),
            "Dispatching tool call"
        );

        let outcome = match tool_name {
            "search_notes" => self.search(owner_id, parsed).await,
            "create_note" => self.create(owner_id, parsed).await,
            "update_note" => self.update(owner_id, parsed).await,
            "delete_note" => self.delete(owner_id, parsed).await,
            other => {
                return Ok(recoverable(format!("Unknown tool: {other}")));
            }
        };

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e @ (Error::Validation(_) | Error::NoteNotFound(_) | Error::NotFound(_))) => {
                Ok(recoverable(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn search(&self, owner_id: Uuid, args: Value) -> Result<ToolOutcome> {
        let args: SearchArgs = serde_json::from_value(args)?;
        let mut query = SearchQuery {
            query: args.query,
            query_embedding: None,
            tags: args.tags,
            match_all_tags: args.match_all_tags,
            note_type: args.note_type.as_deref().map(parse_note_type).transpose()?,
            archived: args.archived,
            alpha: args.alpha.unwrap_or(DEFAULT_ALPHA),
            limit: args.limit.unwrap_or(DEFAULT_LIMIT),
            created_from: args.created_from,
            created_to: args.created_to,
            updated_from: args.updated_from,
            updated_to: args.updated_to,
            ..Default::default()
        };

        if let (Some(embedder), Some(text)) = (&self.embedder, query.text()) {
            match embedder.embed_query(text).await {
                Ok(embedding) => query.query_embedding = Some(embedding),
                // Retrieval still works lexically without a query vector.
                Err(e) => {
                    warn!(
                        subsystem = "agent",
                        component = "tools",
                        error = %e,
                        "Query embedding failed, searching lexically"
                    );
                }
            }
        }

        let results = self.gateway.search(owner_id, query).await?;
        let source_ids: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        for note in &results {
            self.meta_cache.put(owner_id, NoteMeta {
                id: note.id,
                title: note.title.clone(),
                note_type: note.note_type,
                archived: note.archived,
                created_at: note.created_at,
            });
        }
        let payload = json!({
            "count": results.len(),
            "results": results.iter().map(scored_to_json).collect::<Vec<_>>(),
        });
        Ok(ToolOutcome {
            result: payload,
            source_ids,
        })
    }

    async fn create(&self, owner_id: Uuid, args: Value) -> Result<ToolOutcome> {
        let req: CreateNoteRequest = serde_json::from_value(args)?;
        let note = self.repository.create(owner_id, req.normalize()?).await?;
        self.meta_cache.put(owner_id, NoteMeta::from(&note));
        let payload = json!({
            "id": note.id,
            "title": note.title,
            "note_type": note.note_type.as_str(),
            "tags": note.tags_slice(),
            "created_at": note.created_at,
        });
        Ok(ToolOutcome {
            result: payload,
            source_ids: vec![note.id],
        })
    }

    async fn update(&self, owner_id: Uuid, args: Value) -> Result<ToolOutcome> {
        let args: UpdateArgs = serde_json::from_value(args)?;
        let req = UpdateNoteRequest {
            title: args.title,
            content: args.content,
            note_type: args.note_type.as_deref().map(parse_note_type).transpose()?,
            tags: args.tags,
            archived: args.archived,
        };
        if req.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }
        let note = self.repository.update(owner_id, args.note_id, req).await?;
        self.meta_cache.put(owner_id, NoteMeta::from(&note));
        let payload = json!({
            "id": note.id,
            "title": note.title,
            "note_type": note.note_type.as_str(),
            "tags": note.tags_slice(),
            "archived": note.archived,
            "updated_at": note.updated_at,
        });
        Ok(ToolOutcome {
            result: payload,
            source_ids: vec![note.id],
        })
    }

    async fn delete(&self, owner_id: Uuid, args: Value) -> Result<ToolOutcome> {
        let args: DeleteArgs = serde_json::from_value(args)?;
        self.repository.delete(owner_id, args.note_id).await?;
        self.meta_cache.invalidate(owner_id, args.note_id);
        Ok(ToolOutcome {
            result: json!({"deleted": true, "note_id": args.note_id}),
            source_ids: vec![args.note_id],
        })
    }
}

/// Maximum logged length of a tool-argument preview.
const LOG_PREVIEW_LEN: usize = 200;

/// Render sanitized arguments for the log, truncated to a safe length.
fn log_preview(arguments: &Value) -> String {
    let mut s = arguments.to_string();
    if s.chars().count() > LOG_PREVIEW_LEN {
        s = s.chars().take(LOG_PREVIEW_LEN).collect::<String>() + "…";
    }
    s
}

fn recoverable(message: String) -> ToolOutcome {
    ToolOutcome {
        result: json!({"error": message}),
        source_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definitions_cover_all_tools() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(
            names,
            vec!["search_notes", "create_note", "update_note", "delete_note"]
        );
        for def in &defs {
            assert_eq!(def["type"], "function");
            assert!(def["parameters"]["properties"].is_object());
        }
    }

    #[test]
    fn test_sanitize_search_passes_everything() {
        let args = json!({"query": "milk", "tags": ["food"], "limit": 5});
        assert_eq!(sanitize_arguments("search_notes", &args), args);
    }

    #[test]
    fn test_sanitize_create_hides_content() {
        let args = json!({
            "title": "Groceries",
            "content": "milk, eggs, and my bank PIN",
            "note_type": "note",
            "tags": ["shopping"]
        });
        let sanitized = sanitize_arguments("create_note", &args);
        assert_eq!(sanitized["title"], "Groceries");
        assert_eq!(sanitized["note_type"], "note");
        assert_eq!(sanitized["tags"], json!(["shopping"]));
        assert!(sanitized.get("content").is_none());
    }

    #[test]
    fn test_sanitize_delete_keeps_only_note_id() {
        let id = Uuid::new_v4();
        let args = json!({"note_id": id, "reason": "cleanup"});
        let sanitized = sanitize_arguments("delete_note", &args);
        assert_eq!(sanitized, json!({"note_id": id}));
    }

    #[test]
    fn test_sanitize_unknown_tool_is_empty() {
        let sanitized = sanitize_arguments("mystery", &json!({"a": 1}));
        assert_eq!(sanitized, json!({}));
    }

    #[test]
    fn test_log_preview_truncates() {
        let long = json!({"query": "x".repeat(500)});
        let preview = log_preview(&long);
        assert!(preview.chars().count() <= LOG_PREVIEW_LEN + 1);
        assert!(preview.ends_with('…'));
        assert_eq!(log_preview(&json!({"q": "milk"})), r#"{"q":"milk"}"#);
    }

    #[test]
    fn test_search_args_parse_defaults() {
        let args: SearchArgs = serde_json::from_value(json!({"query": "milk"})).unwrap();
        assert!(!args.match_all_tags);
        assert!(args.limit.is_none());
        assert!(args.alpha.is_none());
    }

    #[test]
    fn test_search_schema_exposes_blend_weight() {
        let defs = tool_definitions();
        let search = &defs[0]["parameters"]["properties"];
        assert!(search.get("alpha").is_some());
        assert_eq!(search["alpha"]["minimum"], 0.0);
        assert_eq!(search["alpha"]["maximum"], 1.0);

        let args: SearchArgs =
            serde_json::from_value(json!({"query": "milk", "alpha": 0.2})).unwrap();
        assert_eq!(args.alpha, Some(0.2));
    }
}
