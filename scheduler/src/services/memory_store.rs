//! In-memory job store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use shared::{Job, JobId, JobOutputRow, JobPart, JobStatus, UserId};

use crate::error::StoreError;
use crate::traits::{JobStore, NewJob, NewJobPart};

/// Table state behind one lock; BTreeMaps keep id order so queue scans are
/// FIFO by construction.
#[derive(Default)]
struct Tables {
    jobs: BTreeMap<i64, Job>,
    parts: BTreeMap<i64, JobPart>,
    outputs: Vec<JobOutputRow>,
    next_job_id: i64,
    next_part_id: i64,
    next_output_id: i64,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: NewJob) -> Result<JobId, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_job_id += 1;
        let id = JobId(tables.next_job_id);

        tables.jobs.insert(
            id.0,
            Job {
                id,
                user_id: job.user_id,
                data_id: job.data_id,
                model_id: job.model_id,
                status: JobStatus::Queued,
                created_at: Utc::now(),
                started_at: None,
                ended_at: None,
            },
        );
        Ok(id)
    }

    async fn insert_part(&self, job_id: JobId, part: NewJobPart) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.jobs.contains_key(&job_id.0) {
            return Err(StoreError::not_found("jobs", job_id.0));
        }

        tables.next_part_id += 1;
        let id = tables.next_part_id;
        tables.parts.insert(
            id,
            JobPart {
                id,
                solver_type: part.solver_type,
                cpu_limit: part.cpu_limit,
                time_limit: part.time_limit,
                memory_limit: part.memory_limit,
                all_solutions: part.all_solutions,
                free_search: part.free_search,
                job_id,
            },
        );
        Ok(())
    }

    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.jobs.get(&id.0).cloned())
    }

    async fn oldest_queued(&self) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .values()
            .find(|job| job.status == JobStatus::Queued)
            .cloned())
    }

    async fn parts_for_job(&self, job_id: JobId) -> Result<Vec<JobPart>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .parts
            .values()
            .rev()
            .filter(|part| part.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn mark_running(&self, id: JobId, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let job = tables
            .jobs
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::not_found("jobs", id.0))?;
        job.status = JobStatus::Running;
        job.started_at = Some(started_at);
        Ok(())
    }

    async fn mark_completed(&self, id: JobId, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let job = tables
            .jobs
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::not_found("jobs", id.0))?;
        job.status = JobStatus::Completed;
        job.ended_at = Some(ended_at);
        Ok(())
    }

    async fn append_output(&self, job_id: JobId, content: Value) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_output_id += 1;
        let id = tables.next_output_id;
        tables.outputs.push(JobOutputRow { id, content, job_id });
        Ok(())
    }

    async fn history_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .values()
            .rev()
            .filter(|job| job.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn output_for_job(&self, job_id: JobId) -> Result<Option<JobOutputRow>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .outputs
            .iter()
            .find(|row| row.job_id == job_id)
            .cloned())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.jobs.remove(&id.0);
        tables.parts.retain(|_, part| part.job_id != id);
        tables.outputs.retain(|row| row.job_id != id);
        Ok(())
    }
}
