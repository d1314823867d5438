//! # quill-core
//!
//! Core types, traits, and abstractions for the quillbox library.
//!
//! This crate provides the data structures, error taxonomy, and wire events
//! that the other quillbox crates depend on.

pub mod error;
pub mod events;
pub mod lexical;
pub mod logging;
pub mod models;
pub mod search;

// Re-export commonly used types at crate root
pub use error::{Error, Result, GENERIC_USER_MESSAGE};
pub use events::ChatEvent;
pub use lexical::WebQuery;
pub use models::{
    normalize_tags, validate_embedding, CreateNoteRequest, Note, NoteMeta, NoteType,
    UpdateNoteRequest, EMBEDDING_DIM, MAX_CONTENT_LEN, MAX_TITLE_LEN,
};
pub use search::{
    clamp_alpha, clamp_limit, CandidateSource, NoteCandidate, ScoredNote, SearchQuery,
    DEFAULT_ALPHA, DEFAULT_LIMIT, MAX_LIMIT, MIN_LIMIT,
};
