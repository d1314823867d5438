//! # quill-search
//!
//! Hybrid retrieval for quillbox: explicit score merging over candidate
//! sources, a deterministic ranking engine, and the gateway that fronts it.

pub mod engine;
pub mod gateway;
pub mod memory;
pub mod scoring;

pub use engine::RankingEngine;
pub use gateway::RetrievalGateway;
pub use memory::InMemorySource;
pub use scoring::{blend, cosine_similarity, lexical_score, score_candidate, vector_score};
