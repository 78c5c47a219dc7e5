//! Postgres client and connection management

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::schema;
use crate::PersistenceError;

/// Postgres configuration
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    /// Dimension used when declaring the vector column
    pub vector_dimension: usize,
}

impl Default for PgConfig {
    fn default() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost:5432/docchat".to_string());

        Self {
            url,
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            vector_dimension: 1536,
        }
    }
}

/// Postgres pool wrapper
///
/// One pool per process, shared by reference across all stores.
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
    config: PgConfig,
}

impl PgClient {
    /// Connect to Postgres
    pub async fn connect(config: PgConfig) -> Result<Self, PersistenceError> {
        tracing::info!(
            max_connections = config.max_connections,
            "Connecting to Postgres"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self { pool, config })
    }

    /// Ensure the pgvector extension, tables and indexes exist
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_schema(&self.pool, self.config.vector_dimension).await?;
        tracing::info!("Schema ensured");
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap connectivity probe for readiness checks
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
