use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::MessageRow;

/// Append-only narration log attached to a job. Display only, no control
/// semantics.
pub struct MessageRepository;

impl MessageRepository {
    pub async fn append(
        pool: &SqlitePool,
        job_id: i64,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "insert into _enrichment_messages (job_id, created_at, message)
             values (?, ?, ?)",
        )
        .bind(job_id)
        .bind(Utc::now().naive_utc())
        .bind(message)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_job(
        pool: &SqlitePool,
        job_id: i64,
    ) -> Result<Vec<MessageRow>, sqlx::Error> {
        sqlx::query_as::<_, MessageRow>(
            "select * from _enrichment_messages where job_id = ? order by id",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }
}
