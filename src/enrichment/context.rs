use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::warn;

use crate::db::error_repository::ErrorRepository;
use crate::db::job_repository::JobRepository;
use crate::enrichment::EnrichmentError;
use crate::secrets::SecretValue;

/// Everything an enrichment hook may touch during a run: the database the
/// table lives in, the job's validated configuration, the secret resolved
/// at submission (memory only, never persisted), and manual error
/// reporting.
pub struct EnrichmentContext {
    pool: SqlitePool,
    database_name: String,
    table: String,
    job_id: i64,
    config: Map<String, Value>,
    secret: Option<SecretValue>,
}

impl EnrichmentContext {
    pub fn new(
        pool: SqlitePool,
        database_name: String,
        table: String,
        job_id: i64,
        config: Map<String, Value>,
        secret: Option<SecretValue>,
    ) -> Self {
        Self {
            pool,
            database_name,
            table,
            job_id,
            config,
            secret,
        }
    }

    /// Pool for the database containing the enriched table
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// The secret resolved for this run
    pub fn secret(&self) -> Result<&str, EnrichmentError> {
        self.secret
            .as_ref()
            .map(SecretValue::expose)
            .ok_or_else(|| EnrichmentError::new("No secret resolved for this run"))
    }

    /// Report a subset of rows as failed without failing the whole batch.
    ///
    /// Writes one error record with exactly these identifiers and bumps the
    /// job's error counter by their number. The enrichment should then
    /// return `Completed` with the count of rows it did process.
    pub async fn report_errors(
        &self,
        ids: &[Value],
        message: &str,
    ) -> Result<(), EnrichmentError> {
        let row_pks = serde_json::to_string(ids)
            .map_err(|e| EnrichmentError::new(format!("Could not serialize ids: {}", e)))?;
        ErrorRepository::append(&self.pool, self.job_id, &row_pks, message, None).await?;
        JobRepository::bump_error_count(&self.pool, self.job_id, ids.len() as i64).await?;
        warn!(
            "Job {}: enrichment reported {} failed rows: {}",
            self.job_id,
            ids.len(),
            message
        );
        Ok(())
    }
}
