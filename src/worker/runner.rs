use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::error_repository::ErrorRepository;
use crate::db::job_repository::JobRepository;
use crate::db::message_repository::MessageRepository;
use crate::db::models::JobRow;
use crate::enrichment::{BatchOutcome, Enrichment, EnrichmentContext};
use crate::secrets::SecretValue;
use crate::source::{pks_for_rows, RowSource, SourceError};

/// Drives one job's scan-and-transform loop to a terminal or paused state.
///
/// The loop is cooperative: pause, cancel and process shutdown are observed
/// only between batches, and progress is committed through a checkpoint
/// that is atomic with the status check. If the checkpoint loses to a
/// control signal the runner stops without writing, so a paused or
/// cancelled job is never overwritten from behind.
pub struct EnrichmentRunner {
    pool: SqlitePool,
    enrichment: Arc<dyn Enrichment>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EnrichmentRunner {
    pub fn new(
        pool: SqlitePool,
        enrichment: Arc<dyn Enrichment>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            enrichment,
            shutdown_rx,
        }
    }

    /// Run the job to a stop. All failure paths end in a terminal status
    /// plus a narration message; this never returns an error to the caller
    /// because there is nobody above it to handle one.
    pub async fn run(self, job: JobRow, secret: Option<SecretValue>) {
        let job_id = job.id;
        if let Err(e) = self.drive(job, secret).await {
            // Storage itself failed; nothing more durable we can do than log
            error!("Job {}: runner stopped on storage error: {}", job_id, e);
        }
    }

    async fn drive(&self, job: JobRow, secret: Option<SecretValue>) -> Result<(), sqlx::Error> {
        let job_id = job.id;

        // The status column is the lease; losing it means another runner
        // owns this job or a control signal got there first. The generation
        // identifies this grant, so a lease revoked by pause and re-granted
        // by resume cannot be used to commit.
        let Some(generation) = JobRepository::acquire(&self.pool, job_id).await? else {
            warn!("Job {}: could not take run lease, not starting", job_id);
            return Ok(());
        };

        let source = match RowSource::open(
            self.pool.clone(),
            &job.table_name,
            &job.filter_expr,
        )
        .await
        {
            Ok(source) => source,
            Err(e) => {
                self.fail(job_id, &format!("Row source unavailable: {}", e)).await?;
                return Ok(());
            }
        };

        let ctx = EnrichmentContext::new(
            self.pool.clone(),
            job.database_name.clone(),
            job.table_name.clone(),
            job_id,
            job.config_map(),
            secret,
        );

        // A job paused during its first batch still has zero progress, so
        // "has initialize run" is recorded explicitly rather than inferred
        // from the counters
        if job.initialized_at.is_none() {
            if let Err(e) = self.enrichment.initialize(&ctx).await {
                self.fail(job_id, &format!("Initialization failed: {}", e)).await?;
                return Ok(());
            }
            JobRepository::mark_initialized(&self.pool, job_id).await?;
            self.narrate(job_id, &format!("Started: {}", self.enrichment.name())).await?;
        } else {
            self.narrate(job_id, "Resumed from last checkpoint").await?;
        }

        let mut cursor = job.next_cursor.clone();
        let batch_size = self.enrichment.batch_size();

        loop {
            if *self.shutdown_rx.borrow() {
                info!("Job {}: shutdown requested, leaving job for recovery", job_id);
                self.narrate(job_id, "Process shutting down, job will resume on restart")
                    .await?;
                return Ok(());
            }

            let fetch = match source.fetch(cursor.as_deref(), batch_size).await {
                Ok(fetch) => fetch,
                Err(SourceError::Schema(msg)) => {
                    self.fail(job_id, &format!("Schema changed under job: {}", msg)).await?;
                    return Ok(());
                }
                Err(SourceError::Database(e)) => {
                    self.fail(job_id, &format!("Fetch failed: {}", e)).await?;
                    return Ok(());
                }
            };

            if fetch.rows.is_empty() {
                break;
            }

            let batch_len = fetch.rows.len() as i64;
            let (done_delta, error_delta) = match self
                .enrichment
                .enrich_batch(&ctx, &fetch.rows, source.pks())
                .await
            {
                Ok(BatchOutcome::Completed { processed }) => {
                    (processed.map_or(batch_len, |n| n as i64), 0)
                }
                Ok(BatchOutcome::PauseRequested { reason }) => {
                    // Cursor stays at the last checkpoint; this batch is
                    // retried on resume
                    if JobRepository::mark_paused(&self.pool, job_id, &reason).await? {
                        info!("Job {}: paused: {}", job_id, reason);
                        self.narrate(job_id, &format!("Paused: {}", reason)).await?;
                    }
                    return Ok(());
                }
                Ok(BatchOutcome::CancelRequested { reason }) => {
                    if JobRepository::mark_cancelled(&self.pool, job_id, &reason).await? {
                        info!("Job {}: cancelled: {}", job_id, reason);
                        self.narrate(job_id, &format!("Cancelled: {}", reason)).await?;
                    }
                    return Ok(());
                }
                Err(e) => {
                    // One bad batch never aborts the run: record every row
                    // identifier it covered and move on
                    let ids = pks_for_rows(&fetch.rows, source.pks());
                    let row_pks = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".into());
                    let trace = if self.enrichment.log_traceback() {
                        e.trace.as_deref()
                    } else {
                        None
                    };
                    ErrorRepository::append(&self.pool, job_id, &row_pks, &e.message, trace)
                        .await?;
                    warn!(
                        "Job {}: batch of {} rows failed: {}",
                        job_id, batch_len, e.message
                    );
                    (0, batch_len)
                }
            };

            if !JobRepository::checkpoint(
                &self.pool,
                job_id,
                generation,
                fetch.next_cursor.as_deref(),
                done_delta,
                error_delta,
            )
            .await?
            {
                // A pause, cancel or resume-under-a-new-lease landed while
                // the batch was in flight; its progress is intentionally
                // not committed
                info!("Job {}: stopped by control signal before checkpoint", job_id);
                return Ok(());
            }

            cursor = fetch.next_cursor;
            if fetch.exhausted {
                break;
            }
        }

        if let Err(e) = self.enrichment.finalize(&ctx).await {
            self.fail(job_id, &format!("Finalize failed: {}", e)).await?;
            return Ok(());
        }

        if JobRepository::mark_finished(&self.pool, job_id).await? {
            info!("Job {}: finished", job_id);
            self.narrate(job_id, "Finished").await?;
        }
        Ok(())
    }

    async fn fail(&self, job_id: i64, reason: &str) -> Result<(), sqlx::Error> {
        error!("Job {}: {}", job_id, reason);
        JobRepository::mark_failed(&self.pool, job_id, reason).await?;
        self.narrate(job_id, reason).await
    }

    async fn narrate(&self, job_id: i64, message: &str) -> Result<(), sqlx::Error> {
        MessageRepository::append(&self.pool, job_id, message).await
    }
}
