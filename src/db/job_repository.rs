use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{JobRow, JobStatus};

/// Fields needed to create a job; counters and status are set by the store
pub struct NewJob {
    pub enrichment: String,
    pub database_name: String,
    pub table_name: String,
    pub filter_expr: String,
    pub config: String,
    pub row_count: i64,
    pub actor_id: Option<String>,
}

/// Repository for job records
///
/// Every status mutation is a compare-and-set UPDATE guarded by the expected
/// current status; callers learn from the returned bool whether they won the
/// race. This is what makes the status column usable as a lease.
pub struct JobRepository;

impl JobRepository {
    /// Insert a new job with status `pending` and zeroed counters
    pub async fn create(pool: &SqlitePool, job: &NewJob) -> Result<JobRow, sqlx::Error> {
        debug!(
            "Creating job: enrichment={}, table={}",
            job.enrichment, job.table_name
        );

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            insert into _enrichment_jobs (
                status, enrichment, database_name, table_name, filter_expr,
                config, started_at, row_count, done_count, error_count, actor_id
            ) values (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            returning *
            "#,
        )
        .bind(JobStatus::Pending)
        .bind(&job.enrichment)
        .bind(&job.database_name)
        .bind(&job.table_name)
        .bind(&job.filter_expr)
        .bind(&job.config)
        .bind(Utc::now().naive_utc())
        .bind(job.row_count)
        .bind(&job.actor_id)
        .fetch_one(pool)
        .await?;

        debug!("Job created with id={}", row.id);
        Ok(row)
    }

    pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>("select * from _enrichment_jobs where id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs, newest first, optionally restricted to one table
    pub async fn list(
        pool: &SqlitePool,
        table: Option<&str>,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        match table {
            Some(table) => {
                sqlx::query_as::<_, JobRow>(
                    "select * from _enrichment_jobs where table_name = ? order by id desc",
                )
                .bind(table)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, JobRow>("select * from _enrichment_jobs order by id desc")
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Take the run lease: `pending` -> `running`, bumping the lease
    /// generation. Also succeeds for a job already in `running`, which is
    /// how the recovery sweep re-adopts jobs that never reached a clean
    /// stop before shutdown. Returns the generation the caller now holds,
    /// or None if the lease could not be taken.
    pub async fn acquire(pool: &SqlitePool, id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "update _enrichment_jobs
             set status = 'running', run_generation = run_generation + 1
             where id = ? and status in ('pending', 'running')
             returning run_generation",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(generation,)| generation))
    }

    /// Atomically persist a batch's progress, but only while the job is
    /// still `running` under the caller's lease generation. Returns false
    /// if a pause/cancel landed first, or if the lease was revoked and
    /// re-granted (pause then resume) while the batch was in flight; in
    /// either case nothing was written and the runner must stop.
    pub async fn checkpoint(
        pool: &SqlitePool,
        id: i64,
        generation: i64,
        next_cursor: Option<&str>,
        done_delta: i64,
        error_delta: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs
             set next_cursor = ?,
                 done_count = done_count + ?,
                 error_count = error_count + ?
             where id = ? and status = 'running' and run_generation = ?",
        )
        .bind(next_cursor)
        .bind(done_delta)
        .bind(error_delta)
        .bind(id)
        .bind(generation)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record that the initialize hook completed, so a later resume does
    /// not repeat one-time setup
    pub async fn mark_initialized(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("update _enrichment_jobs set initialized_at = ? where id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Increment only the error counter (manual per-row error reporting)
    pub async fn bump_error_count(
        pool: &SqlitePool,
        id: i64,
        by: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "update _enrichment_jobs set error_count = error_count + ? where id = ?",
        )
        .bind(by)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// `running` -> `paused`, recording the reason
    pub async fn mark_paused(
        pool: &SqlitePool,
        id: i64,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs set status = 'paused', cancel_reason = ?
             where id = ? and status = 'running'",
        )
        .bind(reason)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `paused` -> `running`, clearing the pause reason and revoking any
    /// stale lease by bumping the generation. Exactly one of any number of
    /// concurrent resume attempts sees true here.
    pub async fn mark_resumed(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs
             set status = 'running', cancel_reason = null,
                 run_generation = run_generation + 1
             where id = ? and status = 'paused'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `running` or `paused` -> `cancelled` (terminal). The cursor is left
    /// at the last checkpoint so the frozen state remains inspectable.
    pub async fn mark_cancelled(
        pool: &SqlitePool,
        id: i64,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs
             set status = 'cancelled', cancel_reason = ?, finished_at = ?
             where id = ? and status in ('running', 'paused')",
        )
        .bind(reason)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `running` -> `finished`; the cursor is cleared because nothing is
    /// left to fetch
    pub async fn mark_finished(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs
             set status = 'finished', finished_at = ?, next_cursor = null
             where id = ? and status = 'running'",
        )
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Any non-terminal state -> `failed` (terminal), recording the cause
    pub async fn mark_failed(
        pool: &SqlitePool,
        id: i64,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "update _enrichment_jobs
             set status = 'failed', cancel_reason = ?, finished_at = ?
             where id = ? and status in ('pending', 'running', 'paused')",
        )
        .bind(reason)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Jobs that were mid-run when the process last stopped; the recovery
    /// sweep re-launches a runner for each of these on startup
    pub async fn running_ids(pool: &SqlitePool) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("select id from _enrichment_jobs where status = 'running'")
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
