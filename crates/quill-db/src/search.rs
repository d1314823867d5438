//! Candidate retrieval for hybrid search.
//!
//! This module only filters and reports raw sub-scores. The lexical channel
//! uses the weighted `lexeme` tsvector with `websearch_to_tsquery` and
//! `ts_rank` normalization flag 32 (scores land in `[0, 1)`); the vector
//! channel reports pgvector cosine distance. Blending, ordering, and
//! truncation happen in the ranking engine, not in SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use quill_core::{CandidateSource, Error, NoteCandidate, NoteType, Result, SearchQuery};

/// Parameter for dynamically built candidate queries.
#[derive(Debug, Clone)]
enum SqlParam {
    Uuid(Uuid),
    Text(String),
    TextArray(Vec<String>),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Vector(pgvector::Vector),
}

/// Build the candidate SELECT and its bind parameters.
///
/// Every filter in the query becomes an ANDed WHERE clause. When the query
/// has text, candidates must match it lexically unless an embedding is also
/// present, in which case notes carrying an embedding stay in the set so the
/// vector channel can surface purely semantic matches.
fn build_candidate_sql(owner_id: Uuid, query: &SearchQuery) -> (String, Vec<SqlParam>) {
    let mut params: Vec<SqlParam> = vec![SqlParam::Uuid(owner_id)];
    let mut clauses: Vec<String> = vec!["n.owner_id = $1".to_string()];

    let lexical_col = match query.text() {
        Some(text) => {
            params.push(SqlParam::Text(text.to_string()));
            let idx = params.len();
            let matcher = format!("n.lexeme @@ websearch_to_tsquery('english', ${idx})");
            if query.query_embedding.is_some() {
                clauses.push(format!("({matcher} OR n.embedding IS NOT NULL)"));
            } else {
                clauses.push(matcher);
            }
            format!("ts_rank(n.lexeme, websearch_to_tsquery('english', ${idx}), 32) AS lexical_relevance")
        }
        None => "NULL::float4 AS lexical_relevance".to_string(),
    };

    let distance_col = match &query.query_embedding {
        Some(embedding) => {
            params.push(SqlParam::Vector(pgvector::Vector::from(embedding.clone())));
            format!("(n.embedding <=> ${})::float4 AS cosine_distance", params.len())
        }
        None => "NULL::float4 AS cosine_distance".to_string(),
    };

    if let Some(tags) = query.tag_filter() {
        params.push(SqlParam::TextArray(tags.to_vec()));
        let op = if query.match_all_tags { "@>" } else { "&&" };
        clauses.push(format!("n.tags {} ${}", op, params.len()));
    }
    if let Some(note_type) = query.note_type {
        params.push(SqlParam::Text(note_type.as_str().to_string()));
        clauses.push(format!("n.note_type = ${}", params.len()));
    }
    if let Some(archived) = query.archived {
        params.push(SqlParam::Bool(archived));
        clauses.push(format!("n.archived = ${}", params.len()));
    }
    if let Some(ts) = query.created_from {
        params.push(SqlParam::Timestamp(ts));
        clauses.push(format!("n.created_at >= ${}", params.len()));
    }
    if let Some(ts) = query.created_to {
        params.push(SqlParam::Timestamp(ts));
        clauses.push(format!("n.created_at <= ${}", params.len()));
    }
    if let Some(ts) = query.updated_from {
        params.push(SqlParam::Timestamp(ts));
        clauses.push(format!("n.updated_at >= ${}", params.len()));
    }
    if let Some(ts) = query.updated_to {
        params.push(SqlParam::Timestamp(ts));
        clauses.push(format!("n.updated_at <= ${}", params.len()));
    }

    let sql = format!(
        "SELECT n.id, n.title, n.content, n.note_type, n.tags, n.archived,
                n.created_at, n.updated_at,
                {lexical_col},
                {distance_col}
         FROM note n
         WHERE {}",
        clauses.join(" AND ")
    );
    (sql, params)
}

fn map_candidate_row(row: sqlx::postgres::PgRow) -> NoteCandidate {
    let note_type: String = row.get("note_type");
    NoteCandidate {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        note_type: NoteType::parse(&note_type).unwrap_or_default(),
        tags: row
            .get::<Option<Vec<String>>, _>("tags")
            .unwrap_or_default(),
        archived: row.get("archived"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        lexical_relevance: row.get("lexical_relevance"),
        cosine_distance: row.get("cosine_distance"),
    }
}

/// PostgreSQL-backed candidate source.
pub struct PgCandidateSource {
    pool: Pool<Postgres>,
}

impl PgCandidateSource {
    /// Create a new PgCandidateSource with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateSource for PgCandidateSource {
    async fn candidates(
        &self,
        owner_id: Uuid,
        query: &SearchQuery,
    ) -> Result<Vec<NoteCandidate>> {
        let (sql, params) = build_candidate_sql(owner_id, query);

        let mut q = sqlx::query(&sql);
        for param in params {
            q = match param {
                SqlParam::Uuid(v) => q.bind(v),
                SqlParam::Text(v) => q.bind(v),
                SqlParam::TextArray(v) => q.bind(v),
                SqlParam::Bool(v) => q.bind(v),
                SqlParam::Timestamp(v) => q.bind(v),
                SqlParam::Vector(v) => q.bind(v),
            };
        }

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        Ok(rows.into_iter().map(map_candidate_row).collect())
    }
}
