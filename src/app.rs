use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::catalog::Catalog;
use crate::db::job_repository::JobRepository;
use crate::db::message_repository::MessageRepository;
use crate::db::models::JobRow;
use crate::enrichment::{Enrichment, EnrichmentRegistry};
use crate::secrets::{Actor, SecretResolver, SecretValue};
use crate::worker::{EnrichmentRunner, RunnerTracker};

/// Shared process state: the database catalog, the read-only enrichment
/// registry, the secret resolver, and the bookkeeping needed to launch and
/// shut down runners.
pub struct AppCore {
    pub catalog: Catalog,
    pub registry: EnrichmentRegistry,
    pub secrets: SecretResolver,
    pub tracker: RunnerTracker,
    shutdown_rx: watch::Receiver<bool>,
}

impl AppCore {
    pub fn new(
        catalog: Catalog,
        registry: EnrichmentRegistry,
        secrets: SecretResolver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            catalog,
            registry,
            secrets,
            tracker: RunnerTracker::new(),
            shutdown_rx,
        }
    }

    /// Launch a runner task for `job`. The caller must already hold (or be
    /// entitled to take) the status lease.
    pub fn spawn_runner(
        &self,
        database: &str,
        job: JobRow,
        enrichment: Arc<dyn Enrichment>,
        secret: Option<SecretValue>,
    ) {
        let Some(pool) = self.catalog.get(database) else {
            error!("Cannot spawn runner: unknown database '{}'", database);
            return;
        };
        let runner =
            EnrichmentRunner::new(pool.clone(), enrichment, self.shutdown_rx.clone());
        let handle = tokio::spawn(async move {
            runner.run(job, secret).await;
        });
        self.tracker.track(handle);
    }

    /// Re-launch every job left in `running` by the previous process. No
    /// operator action required; the lease is assumed stale because this is
    /// the single owner process.
    pub async fn recovery_sweep(&self) {
        for database in self.catalog.names() {
            let Some(pool) = self.catalog.get(&database) else {
                continue;
            };
            let ids = match JobRepository::running_ids(pool).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("Recovery sweep failed for '{}': {}", database, e);
                    continue;
                }
            };
            for id in ids {
                let job = match JobRepository::get(pool, id).await {
                    Ok(Some(job)) => job,
                    Ok(None) => continue,
                    Err(e) => {
                        error!("Recovery sweep could not load job {}: {}", id, e);
                        continue;
                    }
                };
                info!("Recovery sweep: re-launching job {} in '{}'", id, database);
                if let Err(e) =
                    MessageRepository::append(pool, id, "Recovered after restart").await
                {
                    warn!("Could not narrate recovery for job {}: {}", id, e);
                }
                self.relaunch(&database, job).await;
            }
        }
    }

    /// Launch a runner for an existing job, re-resolving its secret. Used by
    /// resume and the recovery sweep; the submission-time stash may be gone,
    /// so an unresolvable secret fails the job instead of running unsecured.
    pub async fn relaunch(&self, database: &str, job: JobRow) {
        let Some(enrichment) = self.registry.get(&job.enrichment) else {
            self.fail_unlaunchable(database, &job, "Enrichment is no longer registered")
                .await;
            return;
        };

        let secret = match enrichment.secret() {
            Some(spec) => {
                // Process-initiated resolution acts with store access; the
                // privilege check happened at submission
                let actor = Actor {
                    id: job.actor_id.clone(),
                    can_use_secret_store: true,
                };
                match self.secrets.resolve(&spec, &job.config_map(), &actor).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        self.fail_unlaunchable(database, &job, &e.to_string()).await;
                        return;
                    }
                }
            }
            None => None,
        };

        self.spawn_runner(database, job, enrichment, secret);
    }

    async fn fail_unlaunchable(&self, database: &str, job: &JobRow, reason: &str) {
        error!("Job {}: cannot launch: {}", job.id, reason);
        let Some(pool) = self.catalog.get(database) else {
            return;
        };
        if let Err(e) = JobRepository::mark_failed(pool, job.id, reason).await {
            error!("Job {}: could not mark failed: {}", job.id, e);
            return;
        }
        if let Err(e) = MessageRepository::append(pool, job.id, reason).await {
            warn!("Job {}: could not narrate failure: {}", job.id, e);
        }
    }
}
