use actix_web::{HttpResponse, ResponseError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::validation::ErrorResponse;
use crate::app::AppCore;
use crate::db::error_repository::ErrorRepository;
use crate::db::job_repository::{JobRepository, NewJob};
use crate::db::message_repository::MessageRepository;
use crate::db::models::{ErrorRow, JobRow, MessageRow};
use crate::secrets::{Actor, SecretError, STASH_CONFIG_KEY};
use crate::source::{RowSource, SourceError};

use super::models::SubmitJobRequest;

/// Service-level errors
#[derive(Debug)]
pub enum ServiceError {
    /// Database operation failed
    Database(sqlx::Error),

    /// Request references something that does not exist
    NotFound(String),

    /// Control request against a job not in the required source state.
    /// Rejected without mutation; not retry-able as-is.
    Conflict(String),

    /// Required credential could not be resolved; no job was created
    Secret(SecretError),

    /// Request content is invalid (unknown enrichment, bad filter, ...)
    Validation(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Database(e) => write!(f, "Database error: {}", e),
            ServiceError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ServiceError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ServiceError::Secret(e) => write!(f, "Secret error: {}", e),
            ServiceError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Database(e)
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::Database(e) => {
                tracing::error!("Database error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Database error occurred"}),
                })
            }
            ServiceError::NotFound(msg) => {
                warn!("Not found: {}", msg);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({ "message": msg }),
                })
            }
            ServiceError::Conflict(msg) => {
                warn!("Invalid transition: {}", msg);
                HttpResponse::Conflict().json(ErrorResponse {
                    error: "Invalid transition".to_string(),
                    fields: serde_json::json!({ "message": msg }),
                })
            }
            ServiceError::Secret(e) => {
                warn!("Secret resolution failed: {}", e);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Secret unavailable".to_string(),
                    fields: serde_json::json!({"message": e.to_string()}),
                })
            }
            ServiceError::Validation(msg) => {
                warn!("Validation error: {}", msg);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: serde_json::json!({ "message": msg }),
                })
            }
        }
    }
}

/// Control interface over the engine: submit, pause, resume, cancel,
/// status and listing. Every status mutation validates the job's current
/// state via compare-and-set; losing the race means no mutation happened.
pub struct JobService {
    core: Arc<AppCore>,
}

impl JobService {
    pub fn new(core: Arc<AppCore>) -> Self {
        Self { core }
    }

    /// Create a job and launch its runner.
    ///
    /// The secret chain is walked before any job record exists: a
    /// resolution failure is reported synchronously and leaves no trace in
    /// the job store.
    pub async fn submit(&self, req: SubmitJobRequest) -> Result<JobRow, ServiceError> {
        let pool = self
            .core
            .catalog
            .get(&req.database)
            .ok_or_else(|| {
                ServiceError::Validation(format!("Unknown database '{}'", req.database))
            })?
            .clone();

        let enrichment = self.core.registry.get(&req.enrichment).ok_or_else(|| {
            ServiceError::Validation(format!("Unknown enrichment '{}'", req.enrichment))
        })?;

        let mut config = req.config.clone();
        if let Some(secret) = &req.secret {
            let key = self.core.secrets.stash(secret);
            config.insert(STASH_CONFIG_KEY.to_string(), Value::String(key));
        }

        let actor = Actor {
            id: req.actor_id.clone(),
            can_use_secret_store: req.actor_can_use_secret_store,
        };
        let secret = match enrichment.secret() {
            Some(spec) => Some(
                self.core
                    .secrets
                    .resolve(&spec, &config, &actor)
                    .await
                    .map_err(ServiceError::Secret)?,
            ),
            None => None,
        };

        let source = RowSource::open(pool.clone(), &req.table, &req.filter)
            .await
            .map_err(|e| match e {
                SourceError::Schema(msg) => ServiceError::Validation(msg),
                SourceError::Database(e) => ServiceError::Database(e),
            })?;
        let row_count = source.count().await.map_err(|e| match e {
            SourceError::Schema(msg) => ServiceError::Validation(msg),
            SourceError::Database(e) => ServiceError::Database(e),
        })?;

        let config_json = serde_json::to_string(&config)
            .map_err(|e| ServiceError::Validation(format!("Invalid config: {}", e)))?;

        let job = JobRepository::create(
            &pool,
            &NewJob {
                enrichment: req.enrichment.clone(),
                database_name: req.database.clone(),
                table_name: req.table.clone(),
                filter_expr: req.filter.clone(),
                config: config_json,
                row_count,
                actor_id: req.actor_id.clone(),
            },
        )
        .await?;

        info!(
            "Job {} submitted: {} on {}/{} covering {} rows",
            job.id, req.enrichment, req.database, req.table, row_count
        );
        MessageRepository::append(&pool, job.id, "Job created").await?;

        self.core
            .spawn_runner(&req.database, job.clone(), enrichment, secret);
        Ok(job)
    }

    /// Pause a running job. The in-flight batch (if any) runs to its natural
    /// end but its progress is not committed.
    pub async fn pause(
        &self,
        database: &str,
        id: i64,
        reason: &str,
    ) -> Result<JobRow, ServiceError> {
        let pool = self.pool(database)?;
        if !JobRepository::mark_paused(pool, id, reason).await? {
            return Err(self.transition_conflict(pool, id, "pause", "running").await?);
        }
        MessageRepository::append(pool, id, &format!("Paused: {}", reason)).await?;
        self.must_get(pool, id).await
    }

    /// Resume a paused job: exactly one of any concurrent attempts wins the
    /// status CAS and re-launches a runner at the persisted cursor.
    pub async fn resume(&self, database: &str, id: i64) -> Result<JobRow, ServiceError> {
        let pool = self.pool(database)?;
        if !JobRepository::mark_resumed(pool, id).await? {
            return Err(self.transition_conflict(pool, id, "resume", "paused").await?);
        }
        MessageRepository::append(pool, id, "Resume requested").await?;
        let job = self.must_get(pool, id).await?;
        self.core.relaunch(database, job.clone()).await;
        Ok(job)
    }

    /// Cancel a running or paused job (terminal). The cursor stays at the
    /// last checkpoint so the final state is inspectable.
    pub async fn cancel(
        &self,
        database: &str,
        id: i64,
        reason: &str,
    ) -> Result<JobRow, ServiceError> {
        let pool = self.pool(database)?;
        if !JobRepository::mark_cancelled(pool, id, reason).await? {
            return Err(self
                .transition_conflict(pool, id, "cancel", "running or paused")
                .await?);
        }
        MessageRepository::append(pool, id, &format!("Cancelled: {}", reason)).await?;
        self.must_get(pool, id).await
    }

    /// Job snapshot plus its narration and error history
    pub async fn get_status(
        &self,
        database: &str,
        id: i64,
    ) -> Result<(JobRow, Vec<MessageRow>, Vec<ErrorRow>), ServiceError> {
        let pool = self.pool(database)?;
        let job = self.must_get(pool, id).await?;
        let messages = MessageRepository::list_for_job(pool, id).await?;
        let errors = ErrorRepository::list_for_job(pool, id).await?;
        Ok((job, messages, errors))
    }

    pub async fn list(
        &self,
        database: &str,
        table: Option<&str>,
    ) -> Result<Vec<JobRow>, ServiceError> {
        let pool = self.pool(database)?;
        Ok(JobRepository::list(pool, table).await?)
    }

    fn pool(&self, database: &str) -> Result<&sqlx::SqlitePool, ServiceError> {
        self.core
            .catalog
            .get(database)
            .ok_or_else(|| ServiceError::NotFound(format!("Unknown database '{}'", database)))
    }

    async fn must_get(
        &self,
        pool: &sqlx::SqlitePool,
        id: i64,
    ) -> Result<JobRow, ServiceError> {
        JobRepository::get(pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Job {} not found", id)))
    }

    /// Build the rejection for a lost transition CAS: NotFound if the job
    /// does not exist, otherwise Conflict naming the actual status
    async fn transition_conflict(
        &self,
        pool: &sqlx::SqlitePool,
        id: i64,
        verb: &str,
        required: &str,
    ) -> Result<ServiceError, ServiceError> {
        match JobRepository::get(pool, id).await? {
            None => Ok(ServiceError::NotFound(format!("Job {} not found", id))),
            Some(job) => Ok(ServiceError::Conflict(format!(
                "Cannot {} job {} in status '{}' (requires {})",
                verb,
                id,
                job.status.as_str(),
                required
            ))),
        }
    }
}
