//! Core data models for quillbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fixed dimensionality of note and query embeddings.
///
/// Embedding generation is external to this system; the dimension is part of
/// the storage contract and is validated at every boundary that accepts a
/// vector.
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum length of a note title, in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Maximum length of note content, in characters.
pub const MAX_CONTENT_LEN: usize = 10_000;

/// Type of note for categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[default]
    Note,
    Task,
    Event,
    Recipe,
    Vocabulary,
}

impl NoteType {
    /// All known note types, in declaration order.
    pub const ALL: [NoteType; 5] = [
        NoteType::Note,
        NoteType::Task,
        NoteType::Event,
        NoteType::Recipe,
        NoteType::Vocabulary,
    ];

    /// Wire name of this note type.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Note => "note",
            NoteType::Task => "task",
            NoteType::Event => "event",
            NoteType::Recipe => "recipe",
            NoteType::Vocabulary => "vocabulary",
        }
    }

    /// Parse a wire name into a note type.
    pub fn parse(s: &str) -> Option<NoteType> {
        match s {
            "note" => Some(NoteType::Note),
            "task" => Some(NoteType::Task),
            "event" => Some(NoteType::Event),
            "recipe" => Some(NoteType::Recipe),
            "vocabulary" => Some(NoteType::Vocabulary),
            _ => None,
        }
    }
}

/// A stored note.
///
/// Owned by exactly one caller; the owner filter is enforced on every
/// repository operation, never client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: NoteType,
    /// Ordered tag list; duplicates are allowed.
    pub tags: Option<Vec<String>>,
    pub archived: bool,
    /// Embedding vector; None until computed by the external pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Server-assigned, immutable.
    pub created_at: DateTime<Utc>,
    /// None until the first mutation; server-assigned on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Tags as a slice, empty when unset.
    pub fn tags_slice(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

/// Lightweight note projection for previews and tooltips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteMeta {
    pub id: Uuid,
    pub title: Option<String>,
    pub note_type: NoteType,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Note> for NoteMeta {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            note_type: note.note_type,
            archived: note.archived,
            created_at: note.created_at,
        }
    }
}

/// Request to create a note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub note_type: NoteType,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub archived: bool,
}

impl CreateNoteRequest {
    /// Validate and normalize the request in place.
    ///
    /// Trims title/content (empty strings become None), enforces the
    /// title-or-content invariant and length bounds, and normalizes tags.
    pub fn normalize(mut self) -> Result<Self> {
        let (title, content) = normalize_title_content(self.title, self.content)?;
        self.title = title;
        self.content = content;
        self.tags = self.tags.map(normalize_tags);
        Ok(self)
    }
}

/// Partial update for a note. `None` fields are left unchanged.
///
/// Setting `title`/`content` to an empty string clears the field, subject to
/// the title-or-content invariant checked against the merged result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: Option<NoteType>,
    pub tags: Option<Vec<String>>,
    pub archived: Option<bool>,
}

impl UpdateNoteRequest {
    /// True when no field is set (a no-op update).
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.note_type.is_none()
            && self.tags.is_none()
            && self.archived.is_none()
    }

    /// True when the update touches the lexical index inputs.
    pub fn touches_lexical(&self) -> bool {
        self.title.is_some() || self.content.is_some() || self.tags.is_some()
    }

    /// Validate the update against an existing note's fields, returning the
    /// merged (title, content) after trimming.
    pub fn merged_title_content(
        &self,
        existing_title: Option<&str>,
        existing_content: Option<&str>,
    ) -> Result<(Option<String>, Option<String>)> {
        let title = match &self.title {
            Some(t) => Some(t.clone()),
            None => existing_title.map(str::to_string),
        };
        let content = match &self.content {
            Some(c) => Some(c.clone()),
            None => existing_content.map(str::to_string),
        };
        normalize_title_content(title, content)
    }
}

/// Trim and bound-check title/content, requiring at least one non-empty.
fn normalize_title_content(
    title: Option<String>,
    content: Option<String>,
) -> Result<(Option<String>, Option<String>)> {
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let content = content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    if title.is_none() && content.is_none() {
        return Err(Error::Validation(
            "Either title or content must be provided and non-empty".to_string(),
        ));
    }
    if let Some(t) = &title {
        if t.chars().count() > MAX_TITLE_LEN {
            return Err(Error::Validation(format!(
                "Title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
    }
    if let Some(c) = &content {
        if c.chars().count() > MAX_CONTENT_LEN {
            return Err(Error::Validation(format!(
                "Content exceeds {} characters",
                MAX_CONTENT_LEN
            )));
        }
    }
    Ok((title, content))
}

/// Normalize a tag list: trim, lowercase, drop empties.
///
/// Order is preserved and duplicates are kept; tags are an ordered list, not
/// a set.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Validate an embedding vector's dimensionality.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(Error::Validation(format!(
            "Embedding must be {}-dimensional, got {}",
            EMBEDDING_DIM,
            embedding.len()
        )));
    }
    Ok(())
}
