//! Tests for the in-memory job store

use chrono::Utc;
use serde_json::json;

use shared::{FileId, JobStatus, ResourceLimit, SolverTypeId, UserId};

use crate::services::MemoryStore;
use crate::traits::{JobStore, NewJob, NewJobPart};

fn new_job(user: i64) -> NewJob {
    NewJob {
        user_id: UserId(user),
        data_id: FileId(1),
        model_id: FileId(2),
    }
}

fn new_part(solver_type: i64) -> NewJobPart {
    NewJobPart {
        solver_type: SolverTypeId(solver_type),
        cpu_limit: ResourceLimit::Unbounded,
        time_limit: ResourceLimit::Bounded(60),
        memory_limit: ResourceLimit::Bounded(512),
        all_solutions: false,
        free_search: false,
    }
}

#[tokio::test]
async fn inserted_jobs_start_queued_with_increasing_ids() {
    let store = MemoryStore::new();
    let first = store.insert_job(new_job(1)).await.unwrap();
    let second = store.insert_job(new_job(1)).await.unwrap();
    assert!(second > first);

    let job = store.job(first).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn oldest_queued_is_fifo_and_skips_finished_jobs() {
    let store = MemoryStore::new();
    let first = store.insert_job(new_job(1)).await.unwrap();
    let second = store.insert_job(new_job(2)).await.unwrap();

    assert_eq!(store.oldest_queued().await.unwrap().unwrap().id, first);

    store.mark_completed(first, Utc::now()).await.unwrap();
    assert_eq!(store.oldest_queued().await.unwrap().unwrap().id, second);

    store.mark_running(second, Utc::now()).await.unwrap();
    assert!(store.oldest_queued().await.unwrap().is_none());
}

#[tokio::test]
async fn parts_come_back_newest_first() {
    let store = MemoryStore::new();
    let job = store.insert_job(new_job(1)).await.unwrap();
    store.insert_part(job, new_part(10)).await.unwrap();
    store.insert_part(job, new_part(20)).await.unwrap();

    let parts = store.parts_for_job(job).await.unwrap();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].id > parts[1].id);
    assert_eq!(parts[0].solver_type, SolverTypeId(20));
}

#[tokio::test]
async fn part_insert_requires_an_existing_job() {
    let store = MemoryStore::new();
    let err = store
        .insert_part(shared::JobId(99), new_part(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn history_is_per_user_newest_first_and_capped() {
    let store = MemoryStore::new();
    for _ in 0..4 {
        store.insert_job(new_job(1)).await.unwrap();
    }
    store.insert_job(new_job(2)).await.unwrap();

    let history = store.history_for_user(UserId(1), 3).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    assert!(history.iter().all(|job| job.user_id == UserId(1)));
}

#[tokio::test]
async fn output_rows_append_and_the_first_one_answers_queries() {
    let store = MemoryStore::new();
    let job = store.insert_job(new_job(1)).await.unwrap();
    assert!(store.output_for_job(job).await.unwrap().is_none());

    store.append_output(job, json!("first")).await.unwrap();
    store.append_output(job, json!("second")).await.unwrap();

    let row = store.output_for_job(job).await.unwrap().unwrap();
    assert_eq!(row.content, json!("first"));
}

#[tokio::test]
async fn delete_cascades_parts_and_output() {
    let store = MemoryStore::new();
    let job = store.insert_job(new_job(1)).await.unwrap();
    store.insert_part(job, new_part(1)).await.unwrap();
    store.append_output(job, json!("out")).await.unwrap();

    store.delete_job(job).await.unwrap();

    assert!(store.job(job).await.unwrap().is_none());
    assert!(store.parts_for_job(job).await.unwrap().is_empty());
    assert!(store.output_for_job(job).await.unwrap().is_none());
}
