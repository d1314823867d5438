//! # quill-db
//!
//! PostgreSQL storage layer for quillbox.
//!
//! This crate provides:
//! - Connection pool management
//! - The owner-scoped note repository
//! - The filtered candidate source feeding the ranking engine
//!   (weighted tsvector + pgvector cosine distance)

pub mod notes;
pub mod pool;
pub mod search;

pub use notes::{NoteRepository, PgNoteRepository};
pub use pool::create_pool;
pub use search::PgCandidateSource;

use quill_core::{Error, Result};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Note repository for CRUD operations.
    pub notes: PgNoteRepository,
    /// Candidate source for hybrid retrieval.
    pub candidates: PgCandidateSource,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            candidates: PgCandidateSource::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
