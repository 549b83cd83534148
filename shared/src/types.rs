//! Core domain types shared between the scheduler and its collaborators

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Row identifier in the `jobs` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a platform user (job owner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored file (dataset or model) in the file service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a solver type in the catalog service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolverTypeId(pub i64);

impl fmt::Display for SolverTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External identifier of a remote solver worker process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolverId(pub String);

impl SolverId {
    pub fn new(id: impl Into<String>) -> Self {
        SolverId(id.into())
    }
}

impl fmt::Display for SolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SolverId {
    fn from(id: &str) -> Self {
        SolverId(id.to_string())
    }
}

/// Lifecycle status of a job, stored as the integer the `jobs` table uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
}

impl JobStatus {
    pub fn as_int(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
        }
    }
}

impl TryFrom<u8> for JobStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(JobStatus::Queued),
            1 => Ok(JobStatus::Running),
            2 => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_int())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        JobStatus::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A per-part resource bound. A zero on the wire means no bound at all,
/// and an unbounded limit serializes back out as JSON `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceLimit {
    #[default]
    Unbounded,
    Bounded(u64),
}

impl ResourceLimit {
    pub fn is_unbounded(self) -> bool {
        matches!(self, ResourceLimit::Unbounded)
    }

    pub fn value(self) -> Option<u64> {
        match self {
            ResourceLimit::Unbounded => None,
            ResourceLimit::Bounded(n) => Some(n),
        }
    }
}

impl From<u64> for ResourceLimit {
    fn from(raw: u64) -> Self {
        if raw == 0 {
            ResourceLimit::Unbounded
        } else {
            ResourceLimit::Bounded(raw)
        }
    }
}

impl Serialize for ResourceLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResourceLimit::Bounded(n) => serializer.serialize_u64(*n),
            ResourceLimit::Unbounded => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bound(u64),
            Flag(bool),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Bound(n)) => Ok(ResourceLimit::from(n)),
            _ => Ok(ResourceLimit::Unbounded),
        }
    }
}

/// Row in the `jobs` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "dataID")]
    pub data_id: FileId,
    #[serde(rename = "modelID")]
    pub model_id: FileId,
    pub status: JobStatus,
    #[serde(rename = "createdTime", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "startTime", with = "chrono::serde::ts_milliseconds_option", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endTime", with = "chrono::serde::ts_milliseconds_option", default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Row in the `jobParts` table: one requested solver invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPart {
    pub id: i64,
    #[serde(rename = "solverID")]
    pub solver_type: SolverTypeId,
    #[serde(rename = "cpuLimit")]
    pub cpu_limit: ResourceLimit,
    #[serde(rename = "timeLimit")]
    pub time_limit: ResourceLimit,
    #[serde(rename = "memoryLimit")]
    pub memory_limit: ResourceLimit,
    /// Ask the solver for every solution instead of the first one
    #[serde(rename = "flagA")]
    pub all_solutions: bool,
    /// Let the solver ignore the model's search annotations
    #[serde(rename = "flagF")]
    pub free_search: bool,
    #[serde(rename = "jobID")]
    pub job_id: JobId,
}

/// Row in the `jobOutput` table, appended once per completed part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutputRow {
    pub id: i64,
    pub content: Value,
    #[serde(rename = "jobID")]
    pub job_id: JobId,
}

/// Catalog entry returned by the solver catalog service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverCatalogEntry {
    pub id: SolverTypeId,
    pub name: String,
    pub docker_image: String,
}

/// Profile row returned by the user service; `solver_limit` is the user's
/// concurrency allowance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(rename = "solverLimit")]
    pub solver_limit: u32,
}

/// Session part of a correlation identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_status_round_trips_through_its_integer_encoding() {
        for status in [JobStatus::Queued, JobStatus::Running, JobStatus::Completed] {
            let encoded = serde_json::to_value(status).unwrap();
            assert_eq!(encoded, json!(status.as_int()));
            let decoded: JobStatus = serde_json::from_value(encoded).unwrap();
            assert_eq!(decoded, status);
        }
        assert!(serde_json::from_value::<JobStatus>(json!(3)).is_err());
    }

    #[test]
    fn zero_limit_normalizes_to_unbounded() {
        assert_eq!(ResourceLimit::from(0), ResourceLimit::Unbounded);
        assert_eq!(ResourceLimit::from(4), ResourceLimit::Bounded(4));
    }

    #[test]
    fn unbounded_limit_serializes_as_false() {
        assert_eq!(serde_json::to_value(ResourceLimit::Unbounded).unwrap(), json!(false));
        assert_eq!(serde_json::to_value(ResourceLimit::Bounded(2)).unwrap(), json!(2));
    }

    #[test]
    fn limit_deserializes_from_number_false_or_null() {
        let parse = |v| serde_json::from_value::<ResourceLimit>(v).unwrap();
        assert_eq!(parse(json!(8)), ResourceLimit::Bounded(8));
        assert_eq!(parse(json!(0)), ResourceLimit::Unbounded);
        assert_eq!(parse(json!(false)), ResourceLimit::Unbounded);
        assert_eq!(parse(json!(null)), ResourceLimit::Unbounded);
    }

    #[test]
    fn job_row_uses_wire_column_names() {
        let job = Job {
            id: JobId(7),
            user_id: UserId(3),
            data_id: FileId(10),
            model_id: FileId(11),
            status: JobStatus::Running,
            created_at: chrono::DateTime::from_timestamp_millis(1_000).unwrap(),
            started_at: Some(chrono::DateTime::from_timestamp_millis(2_000).unwrap()),
            ended_at: None,
        };

        let encoded = serde_json::to_value(&job).unwrap();
        assert_eq!(encoded["userID"], json!(3));
        assert_eq!(encoded["status"], json!(1));
        assert_eq!(encoded["startTime"], json!(2_000));
        assert_eq!(encoded["endTime"], json!(null));
    }
}
