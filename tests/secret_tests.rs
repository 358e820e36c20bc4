mod common;

use std::sync::Arc;

use common::*;
use enrichd::api::job::service::ServiceError;
use enrichd::db::models::JobStatus;
use enrichd::enrichment::EnrichmentRegistry;
use enrichd::secrets::STASH_CONFIG_KEY;

fn registry(secret_name: &'static str) -> EnrichmentRegistry {
    let mut registry = EnrichmentRegistry::new();
    registry.register(Arc::new(NeedsSecret {
        batch: 10,
        secret_name,
    }));
    registry
}

#[tokio::test]
async fn unresolvable_secret_rejects_submission_before_any_job_exists() {
    let h = harness(registry("ACME_KEY_MISSING")).await;
    create_items(&h.pool, 2).await;

    let err = h
        .service
        .submit(submit_req("needs-secret", config_with_column("name")))
        .await
        .expect_err("no secret anywhere");
    assert!(matches!(err, ServiceError::Secret(_)));

    // Resolution failure surfaced synchronously, no job record created
    let jobs = h.service.list("main", None).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn ephemeral_secret_is_stashed_used_and_never_persisted() {
    let h = harness(registry("ACME_KEY_STASHED")).await;
    create_items(&h.pool, 2).await;

    let mut req = submit_req("needs-secret", config_with_column("name"));
    req.secret = Some("s3cret".to_string());
    let job = h.service.submit(req).await.expect("submit");

    // The stored config carries only the stash key, never the value
    assert!(job.config.contains(STASH_CONFIG_KEY));
    assert!(!job.config.contains("s3cret"));

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.done_count, 2);
    assert_eq!(
        item_names(&h.pool).await,
        vec!["row-1-s3cret", "row-2-s3cret"]
    );
}

#[tokio::test]
async fn environment_secret_takes_priority() {
    let h = harness(registry("ACME_KEY_FROM_ENV")).await;
    create_items(&h.pool, 1).await;

    std::env::set_var("ACME_KEY_FROM_ENV", "env-value");
    let mut req = submit_req("needs-secret", config_with_column("name"));
    req.secret = Some("stash-value".to_string());
    let job = h.service.submit(req).await.expect("submit");
    std::env::remove_var("ACME_KEY_FROM_ENV");

    wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(item_names(&h.pool).await, vec!["row-1-env-value"]);
}
