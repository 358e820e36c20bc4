use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of an enrichment job.
///
/// The status column doubles as the mutual-exclusion lease: at most one
/// runner may observe itself as the owner of a `Running` job, and every
/// control transition is a compare-and-set against the expected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Cancelled,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Finished | JobStatus::Failed
        )
    }
}

/// Database representation of an enrichment job
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRow {
    pub id: i64,
    pub status: JobStatus,
    /// Lease generation, bumped on every acquire and resume. A runner may
    /// only commit progress under the generation it acquired.
    pub run_generation: i64,
    pub enrichment: String,
    pub database_name: String,
    pub table_name: String,
    pub filter_expr: String,
    /// JSON dictionary of validated enrichment config
    pub config: String,
    pub started_at: NaiveDateTime,
    /// Set once the initialize hook has completed; resume never repeats it
    pub initialized_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    /// Reason for the last pause or cancel, null otherwise
    pub cancel_reason: Option<String>,
    /// Opaque resumption cursor; null once there is nothing left to fetch
    pub next_cursor: Option<String>,
    pub row_count: i64,
    pub done_count: i64,
    pub error_count: i64,
    pub actor_id: Option<String>,
}

impl JobRow {
    pub fn config_map(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::from_str(&self.config).unwrap_or_default()
    }
}

/// One failed batch: the row identifiers it covered and what went wrong
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ErrorRow {
    pub id: i64,
    pub job_id: i64,
    pub created_at: NaiveDateTime,
    /// JSON list of row primary keys (scalars, or arrays for composite keys)
    pub row_pks: String,
    pub error: String,
    pub trace: Option<String>,
}

/// Timestamped narration entry for operator visibility
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub job_id: i64,
    pub created_at: NaiveDateTime,
    pub message: String,
}
