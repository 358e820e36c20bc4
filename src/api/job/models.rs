use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

/// Request to create a job and launch its runner
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, message = "Database is required"))]
    pub database: String,

    #[validate(length(min = 1, message = "Table is required"))]
    pub table: String,

    #[validate(length(min = 1, message = "Enrichment slug is required"))]
    pub enrichment: String,

    /// Opaque SQL filter fragment reapplied to the table on every fetch
    #[serde(default)]
    pub filter: String,

    /// Already-validated configuration mapping for the enrichment
    #[serde(default)]
    pub config: Map<String, Value>,

    pub actor_id: Option<String>,

    /// Whether the (upstream-authenticated) actor may read the secret store
    #[serde(default)]
    pub actor_can_use_secret_store: bool,

    /// Ephemeral secret for this run. Stashed in memory under a random key;
    /// the value itself never reaches the job store.
    pub secret: Option<String>,
}

/// Body for pause and cancel requests
#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
}

/// Query parameters for job listing
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub table: Option<String>,
}
