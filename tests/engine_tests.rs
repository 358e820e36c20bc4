mod common;

use std::sync::Arc;

use serde_json::Value;

use common::*;
use enrichd::db::error_repository::ErrorRepository;
use enrichd::db::message_repository::MessageRepository;
use enrichd::db::models::JobStatus;
use enrichd::enrichment::EnrichmentRegistry;

fn registry_with(enrichment: impl enrichd::enrichment::Enrichment + 'static) -> EnrichmentRegistry {
    let mut registry = EnrichmentRegistry::new();
    registry.register(Arc::new(enrichment));
    registry
}

#[tokio::test]
async fn suffix_run_finishes_and_mutates_all_rows() {
    let h = harness(registry_with(Suffix { batch: 10 })).await;
    create_items(&h.pool, 3).await;

    let job = h
        .service
        .submit(submit_req("suffix", config_with_column("name")))
        .await
        .expect("submit");
    assert_eq!(job.row_count, 3);

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.done_count, 3);
    assert_eq!(done.error_count, 0);
    assert_eq!(done.row_count, 3);
    assert!(done.next_cursor.is_none());
    assert!(done.finished_at.is_some());

    assert_eq!(
        item_names(&h.pool).await,
        vec!["row-1-enriched", "row-2-enriched", "row-3-enriched"]
    );
}

#[tokio::test]
async fn failing_batches_are_logged_and_run_still_exhausts() {
    let h = harness(registry_with(AlwaysFails { batch: 10 })).await;
    create_items(&h.pool, 3).await;

    let job = h
        .service
        .submit(submit_req("always-fails", Default::default()))
        .await
        .expect("submit");

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.done_count, 0);
    assert_eq!(done.error_count, 3);
    assert_eq!(done.row_count, 3);

    // Exactly one error record, listing exactly the three row identifiers
    let errors = ErrorRepository::list_for_job(&h.pool, job.id).await.unwrap();
    assert_eq!(errors.len(), 1);
    let ids: Vec<Value> = serde_json::from_str(&errors[0].row_pks).unwrap();
    assert_eq!(ids, vec![Value::from(1), Value::from(2), Value::from(3)]);
    assert!(errors[0].error.contains("upstream service exploded"));

    // Rows untouched
    assert_eq!(item_names(&h.pool).await, vec!["row-1", "row-2", "row-3"]);
}

#[tokio::test]
async fn multi_batch_failure_produces_one_record_per_batch() {
    let h = harness(registry_with(AlwaysFails { batch: 2 })).await;
    create_items(&h.pool, 5).await;

    let job = h
        .service
        .submit(submit_req("always-fails", Default::default()))
        .await
        .expect("submit");

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.error_count, 5);
    assert_eq!(done.done_count, 0);

    let errors = ErrorRepository::list_for_job(&h.pool, job.id).await.unwrap();
    // Batches of 2, 2 and 1
    assert_eq!(errors.len(), 3);
    let lens: Vec<usize> = errors
        .iter()
        .map(|e| serde_json::from_str::<Vec<Value>>(&e.row_pks).unwrap().len())
        .collect();
    assert_eq!(lens, vec![2, 2, 1]);
}

#[tokio::test]
async fn explicit_partial_count_is_trusted() {
    let h = harness(registry_with(PartialReporter { batch: 10 })).await;
    create_items(&h.pool, 4).await;

    let job = h
        .service
        .submit(submit_req("partial-reporter", config_with_column("name")))
        .await
        .expect("submit");

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.done_count, 1);
    assert_eq!(done.error_count, 3);
    assert!(done.done_count + done.error_count <= done.row_count);

    let errors = ErrorRepository::list_for_job(&h.pool, job.id).await.unwrap();
    assert_eq!(errors.len(), 1);
    let ids: Vec<Value> = serde_json::from_str(&errors[0].row_pks).unwrap();
    assert_eq!(ids, vec![Value::from(2), Value::from(3), Value::from(4)]);

    assert_eq!(
        item_names(&h.pool).await,
        vec!["row-1-enriched", "row-2", "row-3", "row-4"]
    );
}

#[tokio::test]
async fn broken_initialize_fails_job_before_any_row() {
    let h = harness(registry_with(BrokenInit)).await;
    create_items(&h.pool, 3).await;

    let job = h
        .service
        .submit(submit_req("broken-init", Default::default()))
        .await
        .expect("submit");

    let done = wait_for_status(&h.pool, job.id, JobStatus::Failed).await;
    assert_eq!(done.done_count, 0);
    assert_eq!(done.error_count, 0);
    assert!(done
        .cancel_reason
        .as_deref()
        .unwrap()
        .contains("could not create working table"));
    assert_eq!(item_names(&h.pool).await, vec!["row-1", "row-2", "row-3"]);
}

#[tokio::test]
async fn broken_finalize_fails_job_after_processing() {
    let h = harness(registry_with(BrokenFinalize { batch: 10 })).await;
    create_items(&h.pool, 2).await;

    let job = h
        .service
        .submit(submit_req("broken-finalize", config_with_column("name")))
        .await
        .expect("submit");

    let done = wait_for_status(&h.pool, job.id, JobStatus::Failed).await;
    // Batches committed before the finalize failure stay committed
    assert_eq!(done.done_count, 2);
    assert!(done.cancel_reason.as_deref().unwrap().contains("cleanup failed"));
}

#[tokio::test]
async fn every_outcome_is_narrated() {
    let h = harness(registry_with(Suffix { batch: 10 })).await;
    create_items(&h.pool, 1).await;

    let job = h
        .service
        .submit(submit_req("suffix", config_with_column("name")))
        .await
        .expect("submit");
    wait_for_status(&h.pool, job.id, JobStatus::Finished).await;

    let messages = MessageRepository::list_for_job(&h.pool, job.id).await.unwrap();
    let texts: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
    assert!(texts.contains(&"Job created"));
    assert!(texts.iter().any(|t| t.starts_with("Started")));
    assert!(texts.contains(&"Finished"));
}

#[tokio::test]
async fn unknown_enrichment_is_rejected_without_job_row() {
    let h = harness(EnrichmentRegistry::new()).await;
    create_items(&h.pool, 1).await;

    let err = h
        .service
        .submit(submit_req("no-such-slug", Default::default()))
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("Unknown enrichment"));

    let jobs = h.service.list("main", None).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn filter_restricts_row_set() {
    let h = harness(registry_with(Suffix { batch: 10 })).await;
    create_items(&h.pool, 4).await;

    let mut req = submit_req("suffix", config_with_column("name"));
    req.filter = "id > 2".to_string();
    let job = h.service.submit(req).await.expect("submit");
    assert_eq!(job.row_count, 2);

    let done = wait_for_status(&h.pool, job.id, JobStatus::Finished).await;
    assert_eq!(done.done_count, 2);
    assert_eq!(
        item_names(&h.pool).await,
        vec!["row-1", "row-2", "row-3-enriched", "row-4-enriched"]
    );
}
