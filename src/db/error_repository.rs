use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::ErrorRow;

/// Append-only log of failed batches. Records are never updated or deleted
/// by the engine; they exist so failed rows can be reprocessed by hand.
pub struct ErrorRepository;

impl ErrorRepository {
    /// Record one failed batch: the serialized row identifier list, the
    /// error text, and an optional diagnostic trace
    pub async fn append(
        pool: &SqlitePool,
        job_id: i64,
        row_pks: &str,
        error: &str,
        trace: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "insert into _enrichment_errors (job_id, created_at, row_pks, error, trace)
             values (?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(Utc::now().naive_utc())
        .bind(row_pks)
        .bind(error)
        .bind(trace)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_job(
        pool: &SqlitePool,
        job_id: i64,
    ) -> Result<Vec<ErrorRow>, sqlx::Error> {
        sqlx::query_as::<_, ErrorRow>(
            "select * from _enrichment_errors where job_id = ? order by id",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }
}
