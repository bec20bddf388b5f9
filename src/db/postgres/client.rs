use std::time::Duration;

use anyhow::{anyhow, Context};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

const SCHEMA_PATH: &str = "schema/postgres.sql";
const CONNECT_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Wait before retrying after the given failed attempt (1-based): 250ms, 500ms, 1s, ...
fn connect_backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Schema statements in file order.
///
/// `;` separates statements except inside a `$$` body, so `plpgsql` functions
/// survive intact. Blank statements are dropped and the rest are trimmed.
fn schema_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_body = false;
    let mut from = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        match c {
            '$' if matches!(chars.peek(), Some((_, '$'))) => {
                chars.next();
                in_body = !in_body;
            },
            ';' if !in_body => {
                statements.push(sql[from..at].trim());
                from = at + 1;
            },
            _ => {},
        }
    }
    statements.push(sql[from..].trim());

    statements.retain(|s| !s.is_empty());
    statements
}

/// Pooled PostgreSQL connection backing the snapshot store (see `ops.rs`).
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    /// Build the pool and make sure one connection can be checked out.
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );
        let pool = Pool::builder(manager)
            .max_size(settings.pool_size)
            .build()
            .context("Could not build PostgreSQL pool")?;

        info!(
            "Opening PostgreSQL pool to {}:{}/{} (size {})",
            settings.host, settings.port, settings.database, settings.pool_size
        );

        let mut attempt = 1;
        loop {
            match pool.get().await {
                Ok(_) => {
                    info!("PostgreSQL reachable after {} attempt(s)", attempt);
                    return Ok(Self { pool });
                },
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    let wait = connect_backoff(attempt);
                    warn!(
                        "PostgreSQL unreachable ({}), attempt {} of {}; next try in {}ms",
                        e,
                        attempt,
                        CONNECT_ATTEMPTS,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
                Err(e) => {
                    return Err(anyhow!("PostgreSQL unreachable after {} attempts: {}", attempt, e));
                },
            }
        }
    }

    /// Apply `schema/postgres.sql`. Every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let schema = tokio::fs::read_to_string(SCHEMA_PATH)
            .await
            .with_context(|| format!("Could not read {}", SCHEMA_PATH))?;
        let statements = schema_statements(&schema);

        let client = self.pool.get().await?;
        for stmt in &statements {
            client
                .batch_execute(stmt)
                .await
                .with_context(|| format!("Schema statement failed: {}", stmt))?;
        }

        info!("Applied {} schema statements from {}", statements.len(), SCHEMA_PATH);
        Ok(())
    }
}
