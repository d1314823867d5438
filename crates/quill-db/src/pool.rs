//! Connection pool setup for the notes store.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use quill_core::{Error, Result};

/// Connections the API process holds unless overridden.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// How long an acquire may wait before the request fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a PostgreSQL pool sized for this service.
///
/// `QUILL_DB_MAX_CONNECTIONS` overrides the pool size; an unparseable or
/// zero value falls back to the default.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let max_connections =
        max_connections_from_env(std::env::var("QUILL_DB_MAX_CONNECTIONS").ok());

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections,
        pool_size = pool.size(),
        "Connection pool ready"
    );
    Ok(pool)
}

fn max_connections_from_env(raw: Option<String>) -> u32 {
    raw.and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}
