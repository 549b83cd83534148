//! Gateway ↔ scheduler job messages

use serde::{Deserialize, Serialize};

use crate::types::{FileId, Job, JobId, JobOutputRow, SolverTypeId, UserId};

/// Inbound job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddJob {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "dataID")]
    pub data_id: FileId,
    #[serde(rename = "modelID")]
    pub model_id: FileId,
    #[serde(default)]
    pub solvers: Vec<PartSpec>,
}

impl AddJob {
    pub const EVENT: &'static str = "add-job";
}

/// One requested solver invocation within a submission. Limits arrive as
/// raw numbers; zero means unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartSpec {
    #[serde(rename = "solverID")]
    pub solver_type: SolverTypeId,
    #[serde(rename = "cpuLimit", default)]
    pub cpu_limit: u64,
    #[serde(rename = "timeLimit", default)]
    pub time_limit: u64,
    #[serde(rename = "memoryLimit", default)]
    pub memory_limit: u64,
    #[serde(rename = "flagA", default)]
    pub all_solutions: bool,
    #[serde(rename = "flagF", default)]
    pub free_search: bool,
}

/// Acknowledgement of a submission; `error` is true iff persistence failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddJobResponse {
    pub error: bool,
}

impl AddJobResponse {
    pub const EVENT: &'static str = "add-job-response";
}

/// Self-triggered scheduling pass over the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCheck {}

impl QueueCheck {
    pub const EVENT: &'static str = "queue-check";
}

/// Request to cancel a job. The ownership check is skipped when `userID`
/// is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveJob {
    pub id: JobId,
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl RemoveJob {
    pub const EVENT: &'static str = "remove-job";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveJobResponse {
    pub error: bool,
}

impl RemoveJobResponse {
    pub const EVENT: &'static str = "remove-job-response";
}

/// Query for a user's submission history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryRequest {
    #[serde(rename = "userID")]
    pub user_id: UserId,
}

impl JobHistoryRequest {
    pub const EVENT: &'static str = "job-history";
}

/// History rows, newest first, capped at 50
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryResponse {
    pub data: Vec<Job>,
}

impl JobHistoryResponse {
    pub const EVENT: &'static str = "job-history-response";
}

/// Query for a job's stored output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutputRequest {
    pub id: JobId,
}

impl JobOutputRequest {
    pub const EVENT: &'static str = "job-output";
}

/// The first stored output row, or `false` when none exists yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutputResponse {
    #[serde(with = "super::or_false", default)]
    pub data: Option<JobOutputRow>,
}

impl JobOutputResponse {
    pub const EVENT: &'static str = "job-output-response";
}
