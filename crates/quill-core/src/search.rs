//! Retrieval query and result types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Note, NoteType};

/// Smallest accepted result limit.
pub const MIN_LIMIT: i64 = 1;

/// Largest accepted result limit.
pub const MAX_LIMIT: i64 = 200;

/// Default result limit when the caller supplies none.
pub const DEFAULT_LIMIT: i64 = 20;

/// Default blend weight when the caller supplies none.
pub const DEFAULT_ALPHA: f32 = 0.5;

/// Clamp a caller-supplied limit into `[MIN_LIMIT, MAX_LIMIT]`.
///
/// Out-of-range values are corrected silently, never rejected.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Clamp a caller-supplied blend weight into `[0, 1]`.
///
/// Non-finite values fall back to the default.
pub fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_finite() {
        alpha.clamp(0.0, 1.0)
    } else {
        DEFAULT_ALPHA
    }
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

/// A retrieval query against one owner's notes.
///
/// All filters are ANDed; each is skipped when unset. The owner is never part
/// of the query: it is injected by the gateway from the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query; whitespace-only is treated as absent.
    pub query: Option<String>,
    /// Query embedding; only the agent path supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_embedding: Option<Vec<f32>>,
    /// Tag filter; interpretation depends on `match_all_tags`.
    pub tags: Option<Vec<String>>,
    /// ALL mode requires every requested tag; ANY mode at least one.
    #[serde(default)]
    pub match_all_tags: bool,
    pub note_type: Option<NoteType>,
    /// Tri-state: Some(true)/Some(false) filter, None means both.
    pub archived: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Blend weight α; only meaningful when both text and embedding are set.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            query_embedding: None,
            tags: None,
            match_all_tags: false,
            note_type: None,
            archived: None,
            limit: DEFAULT_LIMIT,
            alpha: DEFAULT_ALPHA,
            created_from: None,
            created_to: None,
            updated_from: None,
            updated_to: None,
        }
    }
}

impl SearchQuery {
    /// Create a query with free text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Set the query embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    /// Set the tag filter.
    pub fn with_tags(mut self, tags: Vec<String>, match_all: bool) -> Self {
        self.tags = Some(tags);
        self.match_all_tags = match_all;
        self
    }

    /// Filter by note type.
    pub fn with_note_type(mut self, note_type: NoteType) -> Self {
        self.note_type = Some(note_type);
        self
    }

    /// Filter by archived state.
    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    /// Set the result limit (clamped at use sites).
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set the blend weight α (clamped at use sites).
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Trimmed query text, None when empty or whitespace.
    pub fn text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Whether a usable free-text query is present.
    pub fn has_text(&self) -> bool {
        self.text().is_some()
    }

    /// Limit after server-side clamping.
    pub fn effective_limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    /// Blend weight after server-side clamping.
    pub fn effective_alpha(&self) -> f32 {
        clamp_alpha(self.alpha)
    }

    /// Non-empty tag filter, if any.
    pub fn tag_filter(&self) -> Option<&[String]> {
        self.tags.as_deref().filter(|t| !t.is_empty())
    }
}

/// A note matched by retrieval, carrying its combined rank score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNote {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: NoteType,
    pub tags: Vec<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Combined score; comparable across the whole result set.
    pub rank: f32,
}

/// A filtered candidate row before score merging.
///
/// Sub-scores are computed by the candidate source (SQL or in-memory); the
/// ranking engine merges them into a single rank.
#[derive(Debug, Clone)]
pub struct NoteCandidate {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: NoteType,
    pub tags: Vec<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Raw lexical relevance in [0, 1), ts_rank-normalized; None when the
    /// query had no text.
    pub lexical_relevance: Option<f32>,
    /// Cosine distance between note and query embeddings; None when either
    /// vector is absent.
    pub cosine_distance: Option<f32>,
}

impl NoteCandidate {
    /// Convert into a scored result with the given rank.
    pub fn into_scored(self, rank: f32) -> ScoredNote {
        ScoredNote {
            id: self.id,
            title: self.title,
            content: self.content,
            note_type: self.note_type,
            tags: self.tags,
            archived: self.archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
            rank,
        }
    }

    /// Build a candidate from a note, with sub-scores to be filled in by the
    /// source.
    pub fn from_note(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            content: note.content.clone(),
            note_type: note.note_type,
            tags: note.tags_slice().to_vec(),
            archived: note.archived,
            created_at: note.created_at,
            updated_at: note.updated_at,
            lexical_relevance: None,
            cosine_distance: None,
        }
    }
}

/// Produces the filtered candidate set the ranking engine scores.
///
/// Implementations apply every filter in the query (owner, tags, type,
/// archived, time bounds, text match) and report raw sub-scores; they never
/// blend, order, or truncate.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch all candidates for one owner matching the query's filters.
    async fn candidates(&self, owner_id: Uuid, query: &SearchQuery)
        -> Result<Vec<NoteCandidate>>;
}
