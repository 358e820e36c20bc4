pub mod context;
pub mod registry;
pub mod uppercase;

pub use context::EnrichmentContext;
pub use registry::EnrichmentRegistry;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// A named credential an enrichment needs before it can run
#[derive(Debug, Clone, Serialize)]
pub struct SecretSpec {
    /// Environment-variable style name, e.g. "OPENAI_API_KEY"
    pub name: &'static str,
    pub description: &'static str,
}

/// Field types for the declarative configuration schema. Consumed by the
/// external configuration UI; the engine never interprets these.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Checkbox,
    Select,
    Password,
}

/// One field of an enrichment's configuration form
#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub name: &'static str,
    pub field_type: FieldType,
    pub label: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// Tagged outcome of one batch invocation.
///
/// Pause and cancel requests travel through here, structurally separate
/// from batch failures, so the runner never mistakes "stop the run" for
/// "this batch failed".
#[derive(Debug)]
pub enum BatchOutcome {
    /// The batch was processed. `processed` overrides the credited row
    /// count; `None` credits the whole batch.
    Completed { processed: Option<u64> },
    /// Stop the run, resumable later (e.g. "ran out of tokens")
    PauseRequested { reason: String },
    /// Stop the run permanently
    CancelRequested { reason: String },
}

/// Failure raised by an enrichment hook. For `enrich_batch` this marks the
/// whole batch as failed; for `initialize`/`finalize` it is fatal to the job.
#[derive(Debug)]
pub struct EnrichmentError {
    pub message: String,
    pub trace: Option<String>,
}

impl EnrichmentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Some(trace.into()),
        }
    }
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<sqlx::Error> for EnrichmentError {
    fn from(e: sqlx::Error) -> Self {
        EnrichmentError::new(format!("Database error: {}", e))
    }
}

impl std::error::Error for EnrichmentError {}

/// A pluggable batch transform applied to rows of a table.
///
/// Implementations must tolerate seeing a batch again after a crash: the
/// engine commits progress only after a batch completes, so delivery to the
/// transform is at-least-once.
#[async_trait]
pub trait Enrichment: Send + Sync {
    /// Unique short identifier, used in job records and API paths
    fn slug(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Rows delivered per `enrich_batch` call
    fn batch_size(&self) -> usize {
        100
    }

    /// Include a diagnostic trace in error records for this enrichment
    fn log_traceback(&self) -> bool {
        false
    }

    /// Credential required before a job can be created, if any
    fn secret(&self) -> Option<SecretSpec> {
        None
    }

    /// Declarative configuration schema, served verbatim to the external
    /// configuration UI
    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// One-time setup before the first batch of a fresh job. A failure here
    /// is fatal: the job never starts processing rows.
    async fn initialize(&self, _ctx: &EnrichmentContext) -> Result<(), EnrichmentError> {
        Ok(())
    }

    /// Process one batch. `rows` are JSON objects keyed by column name;
    /// `pks` names the primary key columns identifying each row.
    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError>;

    /// One-time teardown after the row set is exhausted. A failure here
    /// marks the job failed.
    async fn finalize(&self, _ctx: &EnrichmentContext) -> Result<(), EnrichmentError> {
        Ok(())
    }
}
