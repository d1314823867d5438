//! The ranking engine: fetch, score, order, truncate.

use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use quill_core::{CandidateSource, Result, ScoredNote, SearchQuery};

use crate::scoring::score_candidate;

/// Scores and orders the candidates a source produces.
///
/// Ordering is fully deterministic: rank descending, then creation time
/// descending, then id. With no text and no embedding every rank is zero and
/// the ordering degenerates to pure recency, which is the intended behavior
/// for filter-only queries.
pub struct RankingEngine<S: CandidateSource> {
    source: S,
}

impl<S: CandidateSource> RankingEngine<S> {
    /// Create an engine over the given candidate source.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Run one query for one owner.
    ///
    /// The limit and α are clamped here regardless of what callers did
    /// upstream, so an engine embedded without the gateway still honors the
    /// bounds.
    pub async fn rank(&self, owner_id: Uuid, query: &SearchQuery) -> Result<Vec<ScoredNote>> {
        let start = Instant::now();
        let alpha = query.effective_alpha();
        let limit = query.effective_limit();

        let candidates = self.source.candidates(owner_id, query).await?;
        let candidate_count = candidates.len();

        let mut scored: Vec<ScoredNote> = candidates
            .into_iter()
            .map(|c| {
                let rank = score_candidate(&c, alpha);
                c.into_scored(rank)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit as usize);

        debug!(
            subsystem = "search",
            component = "ranking_engine",
            op = "rank",
            alpha,
            limit,
            candidate_count,
            result_count = scored.len(),
            has_embedding = query.query_embedding.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ranked candidates"
        );

        Ok(scored)
    }

    /// The underlying candidate source.
    pub fn source(&self) -> &S {
        &self.source
    }
}
