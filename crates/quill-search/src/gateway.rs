//! The retrieval gateway: the single entry point callers use for search.
//!
//! The gateway normalizes and validates what callers send (clamping limits
//! and α, checking embedding dimensionality), injects the authenticated
//! owner, and shields callers from backend detail: any store failure comes
//! back as [`Error::Retrieval`] with the specifics only in the logs.

use tracing::{error, info};
use uuid::Uuid;

use quill_core::{
    validate_embedding, CandidateSource, Error, Result, ScoredNote, SearchQuery,
};

use crate::engine::RankingEngine;

/// Owner-scoped search facade over a ranking engine.
pub struct RetrievalGateway<S: CandidateSource> {
    engine: RankingEngine<S>,
}

impl<S: CandidateSource> RetrievalGateway<S> {
    /// Create a gateway over the given candidate source.
    pub fn new(source: S) -> Self {
        Self {
            engine: RankingEngine::new(source),
        }
    }

    /// Hybrid search on behalf of an authenticated owner.
    ///
    /// Accepts an optional query embedding (the agent path supplies one).
    /// Out-of-range limit and α are corrected silently; a wrong-dimension
    /// embedding is rejected with a validation error.
    pub async fn search(&self, owner_id: Uuid, query: SearchQuery) -> Result<Vec<ScoredNote>> {
        let query = self.normalize(query)?;

        let results = match self.engine.rank(owner_id, &query).await {
            Ok(results) => results,
            Err(e) => {
                error!(
                    subsystem = "search",
                    component = "gateway",
                    op = "search",
                    owner_id = %owner_id,
                    error = %e,
                    "Search backend failure"
                );
                return Err(Error::Retrieval("search backend unavailable".to_string()));
            }
        };

        info!(
            subsystem = "search",
            component = "gateway",
            op = "search",
            owner_id = %owner_id,
            limit = query.limit,
            alpha = query.alpha,
            has_embedding = query.query_embedding.is_some(),
            result_count = results.len(),
            "Search complete"
        );
        Ok(results)
    }

    /// Direct (non-agent) search; rejects query embeddings.
    ///
    /// The interactive search surface is lexical plus filters only, so an
    /// embedding here indicates a misrouted request.
    pub async fn search_direct(&self, owner_id: Uuid, query: SearchQuery) -> Result<Vec<ScoredNote>> {
        if query.query_embedding.is_some() {
            return Err(Error::Validation(
                "Query embeddings are not accepted on this endpoint".to_string(),
            ));
        }
        self.search(owner_id, query).await
    }

    /// Clamp limit/α in place and validate the embedding dimension.
    fn normalize(&self, mut query: SearchQuery) -> Result<SearchQuery> {
        query.limit = query.effective_limit();
        query.alpha = query.effective_alpha();
        if let Some(embedding) = &query.query_embedding {
            validate_embedding(embedding)?;
        }
        Ok(query)
    }
}
