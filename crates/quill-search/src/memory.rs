//! In-memory candidate source.
//!
//! Applies the same filter and sub-score semantics as the PostgreSQL source,
//! evaluated over a plain `Vec<Note>`. Used by tests and by small
//! deployments that keep the whole store resident.

use async_trait::async_trait;
use uuid::Uuid;

use quill_core::{CandidateSource, Note, NoteCandidate, Result, SearchQuery, WebQuery};

use crate::scoring::cosine_similarity;

/// Candidate source over an owned list of notes.
pub struct InMemorySource {
    notes: Vec<Note>,
}

impl InMemorySource {
    /// Create a source over the given notes.
    pub fn new(notes: Vec<Note>) -> Self {
        Self { notes }
    }
}

fn passes_filters(note: &Note, query: &SearchQuery) -> bool {
    if let Some(tags) = query.tag_filter() {
        let note_tags = note.tags_slice();
        let ok = if query.match_all_tags {
            tags.iter().all(|t| note_tags.contains(t))
        } else {
            tags.iter().any(|t| note_tags.contains(t))
        };
        if !ok {
            return false;
        }
    }
    if let Some(note_type) = query.note_type {
        if note.note_type != note_type {
            return false;
        }
    }
    if let Some(archived) = query.archived {
        if note.archived != archived {
            return false;
        }
    }
    if let Some(from) = query.created_from {
        if note.created_at < from {
            return false;
        }
    }
    if let Some(to) = query.created_to {
        if note.created_at > to {
            return false;
        }
    }
    // A never-updated note fails any updated-time bound, matching SQL NULL
    // comparison semantics.
    if let Some(from) = query.updated_from {
        match note.updated_at {
            Some(u) if u >= from => {}
            _ => return false,
        }
    }
    if let Some(to) = query.updated_to {
        match note.updated_at {
            Some(u) if u <= to => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl CandidateSource for InMemorySource {
    async fn candidates(
        &self,
        owner_id: Uuid,
        query: &SearchQuery,
    ) -> Result<Vec<NoteCandidate>> {
        let parsed = query.text().and_then(WebQuery::parse);

        let mut out = Vec::new();
        for note in &self.notes {
            if note.owner_id != owner_id || !passes_filters(note, query) {
                continue;
            }

            let lexical_relevance = parsed.as_ref().and_then(|q| {
                q.score(
                    note.title.as_deref(),
                    note.content.as_deref(),
                    note.tags_slice(),
                )
            });

            // With text and no embedding a lexical miss is filtered out;
            // with an embedding present, embedded notes stay in the set for
            // the vector channel.
            if parsed.is_some() && lexical_relevance.is_none() {
                let kept_for_vector =
                    query.query_embedding.is_some() && note.embedding.is_some();
                if !kept_for_vector {
                    continue;
                }
            }

            let cosine_distance = match (&query.query_embedding, &note.embedding) {
                (Some(q), Some(n)) => Some(1.0 - cosine_similarity(q, n)),
                _ => None,
            };

            let mut candidate = NoteCandidate::from_note(note);
            candidate.lexical_relevance = lexical_relevance;
            candidate.cosine_distance = cosine_distance;
            out.push(candidate);
        }
        Ok(out)
    }
}
