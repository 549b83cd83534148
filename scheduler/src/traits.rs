//! Trait definitions with mockall annotations for testing
//!
//! The scheduler's two external collaborators — the pub/sub transport and
//! the relational job store — are reached exclusively through these traits
//! so the core can be exercised against mocks and in-process stand-ins.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use shared::{FileId, Job, JobId, JobOutputRow, JobPart, ResourceLimit, SolverTypeId, UserId};

use crate::error::{SchedulerResult, StoreError};

/// One message delivered by the pub/sub transport
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub event: String,
    pub payload: Value,
}

/// Column values for a new `jobs` row
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: UserId,
    pub data_id: FileId,
    pub model_id: FileId,
}

/// Column values for a new `jobParts` row
#[derive(Debug, Clone)]
pub struct NewJobPart {
    pub solver_type: SolverTypeId,
    pub cpu_limit: ResourceLimit,
    pub time_limit: ResourceLimit,
    pub memory_limit: ResourceLimit,
    pub all_solutions: bool,
    pub free_search: bool,
}

impl From<&shared::PartSpec> for NewJobPart {
    fn from(spec: &shared::PartSpec) -> Self {
        Self {
            solver_type: spec.solver_type,
            cpu_limit: ResourceLimit::from(spec.cpu_limit),
            time_limit: ResourceLimit::from(spec.time_limit),
            memory_limit: ResourceLimit::from(spec.memory_limit),
            all_solutions: spec.all_solutions,
            free_search: spec.free_search,
        }
    }
}

/// Narrow seam over the external pub/sub transport.
///
/// Delivery guarantees belong to the transport; the scheduler only assumes
/// that subscribed events arrive in publish order per subscription.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` under the given event name
    async fn publish(&self, event: &str, payload: Value) -> SchedulerResult<()>;

    /// Open a subscription covering the given event names
    async fn subscribe(&self, events: Vec<String>) -> SchedulerResult<mpsc::UnboundedReceiver<BusEvent>>;
}

/// Seam over the relational store holding the `jobs`, `jobParts` and
/// `jobOutput` tables. The scheduler never touches rows directly; it only
/// issues these transitions and queries.
#[mockall::automock]
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a queued job row, returning its generated id
    async fn insert_job(&self, job: NewJob) -> Result<JobId, StoreError>;

    /// Insert one part row for an existing job
    async fn insert_part(&self, job_id: JobId, part: NewJobPart) -> Result<(), StoreError>;

    /// Fetch a job row by id
    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// The queued job that has waited longest (lowest id wins ties)
    async fn oldest_queued(&self) -> Result<Option<Job>, StoreError>;

    /// Parts of a job, newest part first
    async fn parts_for_job(&self, job_id: JobId) -> Result<Vec<JobPart>, StoreError>;

    /// Transition a job to running and stamp its start time
    async fn mark_running(&self, id: JobId, started_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Transition a job to completed and stamp its end time
    async fn mark_completed(&self, id: JobId, ended_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Append one output row for a job
    async fn append_output(&self, job_id: JobId, content: Value) -> Result<(), StoreError>;

    /// A user's jobs, newest first, at most `limit` rows
    async fn history_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// The first stored output row for a job, if any
    async fn output_for_job(&self, job_id: JobId) -> Result<Option<JobOutputRow>, StoreError>;

    /// Delete a job row, cascading its parts and output
    async fn delete_job(&self, id: JobId) -> Result<(), StoreError>;
}

// Arc delegation so tests and the binary can keep a handle on the store
// they hand to the scheduler.
#[async_trait::async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn insert_job(&self, job: NewJob) -> Result<JobId, StoreError> {
        (**self).insert_job(job).await
    }

    async fn insert_part(&self, job_id: JobId, part: NewJobPart) -> Result<(), StoreError> {
        (**self).insert_part(job_id, part).await
    }

    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).job(id).await
    }

    async fn oldest_queued(&self) -> Result<Option<Job>, StoreError> {
        (**self).oldest_queued().await
    }

    async fn parts_for_job(&self, job_id: JobId) -> Result<Vec<JobPart>, StoreError> {
        (**self).parts_for_job(job_id).await
    }

    async fn mark_running(&self, id: JobId, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).mark_running(id, started_at).await
    }

    async fn mark_completed(&self, id: JobId, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).mark_completed(id, ended_at).await
    }

    async fn append_output(&self, job_id: JobId, content: Value) -> Result<(), StoreError> {
        (**self).append_output(job_id, content).await
    }

    async fn history_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Job>, StoreError> {
        (**self).history_for_user(user_id, limit).await
    }

    async fn output_for_job(&self, job_id: JobId) -> Result<Option<JobOutputRow>, StoreError> {
        (**self).output_for_job(job_id).await
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        (**self).delete_job(id).await
    }
}
