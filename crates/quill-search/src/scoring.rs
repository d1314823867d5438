//! Sub-score computation and the α-weighted blend.
//!
//! Both channels feed a single combinator: `rank = α·lexical + (1−α)·vector`.
//! A missing sub-score contributes exactly zero, so a note without an
//! embedding still ranks on its lexical channel and vice versa.

use quill_core::NoteCandidate;

/// Lexical sub-score from the raw relevance the candidate source reported.
///
/// The raw value is ts_rank-normalized into `[0, 1)` and rarely approaches
/// the top of that range, so it is doubled before clamping back into
/// `[0, 1]` to keep the two channels on comparable scales.
pub fn lexical_score(raw_relevance: Option<f32>) -> f32 {
    match raw_relevance {
        Some(raw) => (raw * 2.0).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Vector sub-score from a cosine distance.
///
/// `1 − distance`, deliberately unclamped: a vector pointing away from the
/// query yields a negative score and sinks below lexical-only matches.
pub fn vector_score(cosine_distance: Option<f32>) -> f32 {
    match cosine_distance {
        Some(d) => 1.0 - d,
        None => 0.0,
    }
}

/// Cosine similarity between two vectors of equal dimension.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Blend the two sub-scores with weight α on the lexical channel.
pub fn blend(lexical: f32, vector: f32, alpha: f32) -> f32 {
    alpha * lexical + (1.0 - alpha) * vector
}

/// Combined rank for a candidate at the given α.
pub fn score_candidate(candidate: &NoteCandidate, alpha: f32) -> f32 {
    blend(
        lexical_score(candidate.lexical_relevance),
        vector_score(candidate.cosine_distance),
        alpha,
    )
}
