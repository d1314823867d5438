//! Note repository implementation.
//!
//! Every operation is owner-scoped at the SQL level: a note id belonging to
//! another owner behaves exactly like a missing note.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use quill_core::{
    normalize_tags, validate_embedding, CreateNoteRequest, Error, Note, NoteType, Result,
    UpdateNoteRequest,
};

/// Columns selected whenever a full note is returned.
const NOTE_COLUMNS: &str =
    "id, owner_id, title, content, note_type, tags, archived, embedding, created_at, updated_at";

/// Owner-scoped note storage.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Create a note, returning it with server-assigned fields.
    async fn create(&self, owner_id: Uuid, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch one note by id.
    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Note>;

    /// List notes, newest first.
    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Note>>;

    /// Apply a partial update, returning the updated note.
    async fn update(&self, owner_id: Uuid, id: Uuid, req: UpdateNoteRequest) -> Result<Note>;

    /// Delete a note permanently.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<()>;

    /// Attach an embedding computed by the external pipeline.
    async fn set_embedding(&self, owner_id: Uuid, id: Uuid, embedding: &[f32]) -> Result<()>;
}

/// PostgreSQL implementation of [`NoteRepository`].
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Weighted tsvector expression over bound title/content/tags params.
///
/// Title carries weight A, content B, tags C, so title matches outrank
/// content matches which outrank tag matches.
fn lexeme_expr(title_param: usize, content_param: usize, tags_param: usize) -> String {
    format!(
        "setweight(to_tsvector('english', COALESCE(${title_param}, '')), 'A') || \
         setweight(to_tsvector('english', COALESCE(${content_param}, '')), 'B') || \
         setweight(to_tsvector('english', array_to_string(COALESCE(${tags_param}, '{{}}'), ' ')), 'C')"
    )
}

/// Build the dynamic UPDATE statement for a partial note update.
///
/// Fixed params: $1 = now, $2 = id, $3 = owner_id. Dynamic params follow in
/// bind order: merged title/content/tags (when the update touches lexical
/// inputs), then note_type, then archived. The lexeme rewrite shares the
/// statement with the field writes so the index can never go stale.
fn build_update_sql(touches_lexical: bool, has_note_type: bool, has_archived: bool) -> String {
    let mut updates = vec!["updated_at = $1".to_string()];
    let mut param_idx = 4;

    if touches_lexical {
        let (t, c, g) = (param_idx, param_idx + 1, param_idx + 2);
        param_idx += 3;
        updates.push(format!("title = ${t}"));
        updates.push(format!("content = ${c}"));
        updates.push(format!("tags = ${g}"));
        updates.push(format!("lexeme = {}", lexeme_expr(t, c, g)));
    }
    if has_note_type {
        updates.push(format!("note_type = ${param_idx}"));
        param_idx += 1;
    }
    if has_archived {
        updates.push(format!("archived = ${param_idx}"));
    }

    format!(
        "UPDATE note SET {} WHERE id = $2 AND owner_id = $3 RETURNING {}",
        updates.join(", "),
        NOTE_COLUMNS
    )
}

/// Map a database row to a Note.
fn map_note_row(row: sqlx::postgres::PgRow) -> Note {
    let note_type: String = row.get("note_type");
    Note {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        content: row.get("content"),
        note_type: NoteType::parse(&note_type).unwrap_or_default(),
        tags: row.get("tags"),
        archived: row.get("archived"),
        embedding: row
            .get::<Option<pgvector::Vector>, _>("embedding")
            .map(|v| v.to_vec()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, owner_id: Uuid, req: CreateNoteRequest) -> Result<Note> {
        let req = req.normalize()?;
        let id = Uuid::now_v7();
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO note (id, owner_id, title, content, note_type, tags, archived, lexeme, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, {}, $8)
             RETURNING {}",
            lexeme_expr(3, 4, 6),
            NOTE_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(&req.title)
            .bind(&req.content)
            .bind(req.note_type.as_str())
            .bind(&req.tags)
            .bind(req.archived)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(map_note_row(row))
    }

    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Note> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM note WHERE id = $1 AND owner_id = $2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NoteNotFound(id))?;

        Ok(map_note_row(row))
    }

    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM note WHERE owner_id = $1
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(map_note_row).collect())
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        if req.is_empty() {
            return self.fetch(owner_id, id).await;
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let existing = sqlx::query(
            "SELECT title, content, tags FROM note WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::NoteNotFound(id))?;

        // Merge against current values so the title-or-content invariant is
        // checked on the note as it will be after the update.
        let merged = if req.touches_lexical() {
            let existing_title: Option<String> = existing.get("title");
            let existing_content: Option<String> = existing.get("content");
            let (title, content) = req
                .merged_title_content(existing_title.as_deref(), existing_content.as_deref())?;
            let tags = match &req.tags {
                Some(t) => normalize_tags(t.clone()),
                None => existing
                    .get::<Option<Vec<String>>, _>("tags")
                    .unwrap_or_default(),
            };
            Some((title, content, tags))
        } else {
            None
        };

        let sql = build_update_sql(
            merged.is_some(),
            req.note_type.is_some(),
            req.archived.is_some(),
        );

        let mut q = sqlx::query(&sql).bind(Utc::now()).bind(id).bind(owner_id);
        if let Some((title, content, tags)) = &merged {
            q = q.bind(title).bind(content).bind(tags);
        }
        if let Some(note_type) = req.note_type {
            q = q.bind(note_type.as_str());
        }
        if let Some(archived) = req.archived {
            q = q.bind(archived);
        }

        let row = q.fetch_one(&mut *tx).await.map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        Ok(map_note_row(row))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }
        Ok(())
    }

    async fn set_embedding(&self, owner_id: Uuid, id: Uuid, embedding: &[f32]) -> Result<()> {
        validate_embedding(embedding)?;

        let result = sqlx::query("UPDATE note SET embedding = $1 WHERE id = $2 AND owner_id = $3")
            .bind(pgvector::Vector::from(embedding.to_vec()))
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }
        Ok(())
    }
}
