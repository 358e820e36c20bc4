// Each integration test binary compiles this module on its own and uses a
// different subset of the helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::{sleep, Duration, Instant};

use enrichd::api::job::JobService;
use enrichd::app::AppCore;
use enrichd::db::catalog::Catalog;
use enrichd::db::connection;
use enrichd::db::job_repository::JobRepository;
use enrichd::db::models::{JobRow, JobStatus};
use enrichd::enrichment::{
    BatchOutcome, Enrichment, EnrichmentContext, EnrichmentError, EnrichmentRegistry,
};
use enrichd::secrets::{NoSecretStore, SecretResolver};

/// One temp SQLite database named "main" wired into a full engine core
pub struct Harness {
    pub service: JobService,
    pub core: Arc<AppCore>,
    pub pool: SqlitePool,
    _dir: TempDir,
    _shutdown_tx: watch::Sender<bool>,
}

pub async fn harness(registry: EnrichmentRegistry) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("main.db");
    let pool = connection::get_connection(&path).await.expect("open pool");
    let catalog = Catalog::from_pools(vec![("main".to_string(), pool.clone())])
        .await
        .expect("catalog");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let core = Arc::new(AppCore::new(
        catalog,
        registry,
        SecretResolver::new(Box::new(NoSecretStore)),
        shutdown_rx,
    ));
    Harness {
        service: JobService::new(core.clone()),
        core,
        pool,
        _dir: dir,
        _shutdown_tx: shutdown_tx,
    }
}

/// Create an `items(id integer primary key, name text)` table with `n` rows
/// named "row-1" .. "row-n"
pub async fn create_items(pool: &SqlitePool, n: i64) {
    sqlx::query("create table items (id integer primary key, name text)")
        .execute(pool)
        .await
        .expect("create table");
    for i in 1..=n {
        sqlx::query("insert into items (id, name) values (?, ?)")
            .bind(i)
            .bind(format!("row-{}", i))
            .execute(pool)
            .await
            .expect("insert row");
    }
}

pub async fn item_names(pool: &SqlitePool) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as("select name from items order by id")
        .fetch_all(pool)
        .await
        .expect("select names");
    rows.into_iter().map(|(name,)| name).collect()
}

/// Poll until the job reaches `status`, panicking after five seconds
pub async fn wait_for_status(pool: &SqlitePool, id: i64, status: JobStatus) -> JobRow {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = JobRepository::get(pool, id)
            .await
            .expect("get job")
            .expect("job exists");
        if job.status == status {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for status {:?}, job is {:?}",
            status,
            job.status
        );
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn submit_req(
    enrichment: &str,
    config: Map<String, Value>,
) -> enrichd::api::job::models::SubmitJobRequest {
    enrichd::api::job::models::SubmitJobRequest {
        database: "main".to_string(),
        table: "items".to_string(),
        enrichment: enrichment.to_string(),
        filter: String::new(),
        config,
        actor_id: Some("tester".to_string()),
        actor_can_use_secret_store: false,
        secret: None,
    }
}

pub fn config_with_column(column: &str) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("column".to_string(), json!(column));
    config
}

fn suffix_column(ctx: &EnrichmentContext) -> Result<String, EnrichmentError> {
    ctx.config()
        .get("column")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| EnrichmentError::new("No column configured"))
}

async fn append_suffix(
    ctx: &EnrichmentContext,
    rows: &[Map<String, Value>],
    pks: &[String],
    suffix: &str,
) -> Result<(), EnrichmentError> {
    let column = suffix_column(ctx)?;
    let sql = format!(
        "update \"{}\" set \"{}\" = \"{}\" || ? where \"{}\" = ?",
        ctx.table(),
        column,
        column,
        pks[0]
    );
    for row in rows {
        let id = row
            .get(&pks[0])
            .and_then(Value::as_i64)
            .ok_or_else(|| EnrichmentError::new("Missing integer primary key"))?;
        sqlx::query(&sql)
            .bind(suffix)
            .bind(id)
            .execute(ctx.pool())
            .await?;
    }
    Ok(())
}

/// Appends "-enriched" to the configured column, no explicit count
pub struct Suffix {
    pub batch: usize,
}

#[async_trait]
impl Enrichment for Suffix {
    fn slug(&self) -> &'static str {
        "suffix"
    }

    fn name(&self) -> &'static str {
        "Append suffix"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        append_suffix(ctx, rows, pks, "-enriched").await?;
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// Every batch call raises
pub struct AlwaysFails {
    pub batch: usize,
}

#[async_trait]
impl Enrichment for AlwaysFails {
    fn slug(&self) -> &'static str {
        "always-fails"
    }

    fn name(&self) -> &'static str {
        "Always fails"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        _ctx: &EnrichmentContext,
        _rows: &[Map<String, Value>],
        _pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        Err(EnrichmentError::new("upstream service exploded"))
    }
}

/// Processes batches normally, but on exactly its second call requests a
/// pause instead of touching any row
pub struct PausesOnSecondCall {
    pub batch: usize,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Enrichment for PausesOnSecondCall {
    fn slug(&self) -> &'static str {
        "pauses-second"
    }

    fn name(&self) -> &'static str {
        "Pauses on second call"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 1 {
            return Ok(BatchOutcome::PauseRequested {
                reason: "ran out of tokens".to_string(),
            });
        }
        append_suffix(ctx, rows, pks, "-enriched").await?;
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// Pauses before processing anything on its very first call, and counts
/// how often initialize runs
pub struct PausesOnFirstCall {
    pub batch: usize,
    pub calls: Arc<AtomicUsize>,
    pub inits: Arc<AtomicUsize>,
}

#[async_trait]
impl Enrichment for PausesOnFirstCall {
    fn slug(&self) -> &'static str {
        "pauses-first"
    }

    fn name(&self) -> &'static str {
        "Pauses on first call"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn initialize(&self, _ctx: &EnrichmentContext) -> Result<(), EnrichmentError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            return Ok(BatchOutcome::PauseRequested {
                reason: "warming up".to_string(),
            });
        }
        append_suffix(ctx, rows, pks, "-enriched").await?;
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// Processes its first batch, then requests cancellation
pub struct CancelsOnSecondCall {
    pub batch: usize,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Enrichment for CancelsOnSecondCall {
    fn slug(&self) -> &'static str {
        "cancels-second"
    }

    fn name(&self) -> &'static str {
        "Cancels on second call"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= 1 {
            return Ok(BatchOutcome::CancelRequested {
                reason: "operator gave up".to_string(),
            });
        }
        append_suffix(ctx, rows, pks, "-enriched").await?;
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// Processes only the first row of each batch, reports the rest failed
/// through the context, and returns an explicit count of one
pub struct PartialReporter {
    pub batch: usize,
}

#[async_trait]
impl Enrichment for PartialReporter {
    fn slug(&self) -> &'static str {
        "partial-reporter"
    }

    fn name(&self) -> &'static str {
        "Partial reporter"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        append_suffix(ctx, &rows[..1], pks, "-enriched").await?;
        let failed: Vec<Value> = rows[1..]
            .iter()
            .map(|row| row.get(&pks[0]).cloned().unwrap_or(Value::Null))
            .collect();
        if !failed.is_empty() {
            ctx.report_errors(&failed, "rows skipped by transform").await?;
        }
        Ok(BatchOutcome::Completed { processed: Some(1) })
    }
}

/// Requires a secret and writes it into the configured column, so tests can
/// observe which value the resolver produced
pub struct NeedsSecret {
    pub batch: usize,
    /// Distinct per test so environment mutations cannot bleed across
    /// concurrently running tests
    pub secret_name: &'static str,
}

#[async_trait]
impl Enrichment for NeedsSecret {
    fn slug(&self) -> &'static str {
        "needs-secret"
    }

    fn name(&self) -> &'static str {
        "Needs secret"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    fn secret(&self) -> Option<enrichd::enrichment::SecretSpec> {
        Some(enrichd::enrichment::SecretSpec {
            name: self.secret_name,
            description: "API key for the Acme service",
        })
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        let secret = ctx.secret()?.to_string();
        append_suffix(ctx, rows, pks, &format!("-{}", secret)).await?;
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// initialize() always fails
pub struct BrokenInit;

#[async_trait]
impl Enrichment for BrokenInit {
    fn slug(&self) -> &'static str {
        "broken-init"
    }

    fn name(&self) -> &'static str {
        "Broken init"
    }

    async fn initialize(&self, _ctx: &EnrichmentContext) -> Result<(), EnrichmentError> {
        Err(EnrichmentError::new("could not create working table"))
    }

    async fn enrich_batch(
        &self,
        _ctx: &EnrichmentContext,
        _rows: &[Map<String, Value>],
        _pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        Ok(BatchOutcome::Completed { processed: None })
    }
}

/// Batches succeed but finalize() fails
pub struct BrokenFinalize {
    pub batch: usize,
}

#[async_trait]
impl Enrichment for BrokenFinalize {
    fn slug(&self) -> &'static str {
        "broken-finalize"
    }

    fn name(&self) -> &'static str {
        "Broken finalize"
    }

    fn batch_size(&self) -> usize {
        self.batch
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        append_suffix(ctx, rows, pks, "-enriched").await?;
        Ok(BatchOutcome::Completed { processed: None })
    }

    async fn finalize(&self, _ctx: &EnrichmentContext) -> Result<(), EnrichmentError> {
        Err(EnrichmentError::new("cleanup failed"))
    }
}
