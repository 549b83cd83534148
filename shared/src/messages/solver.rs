//! Scheduler ↔ solver worker messages

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{JobId, ResourceLimit, SolverId};

/// Dispatch of one job part to a solver worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solve {
    #[serde(rename = "solverID")]
    pub solver_id: SolverId,
    #[serde(rename = "problemID")]
    pub problem_id: JobId,
    /// Dataset file content
    pub data: Value,
    /// Model file content
    pub model: Value,
    /// Catalog name of the solver binary to run
    pub solver: String,
    /// Docker image the worker should execute the solver in
    pub image: String,
    #[serde(rename = "flagS")]
    pub all_solutions: bool,
    #[serde(rename = "flagF")]
    pub free_search: bool,
    #[serde(rename = "cpuLimit")]
    pub cpu_limit: ResourceLimit,
    #[serde(rename = "timeLimit")]
    pub time_limit: ResourceLimit,
    /// Memory bound in megabytes; serialized with its unit (`"512m"`)
    #[serde(rename = "memoryLimit", with = "memory_limit_wire")]
    pub memory_limit: ResourceLimit,
}

impl Solve {
    pub const EVENT: &'static str = "solve";
}

/// A solver worker reporting the result of a dispatched part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResponse {
    #[serde(rename = "solverID")]
    pub solver_id: SolverId,
    #[serde(rename = "problemID")]
    pub problem_id: JobId,
    pub data: Value,
}

impl SolverResponse {
    pub const EVENT: &'static str = "solver-response";
}

/// Broadcast telling in-flight solvers to abandon a removed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSolve {
    #[serde(rename = "problemID")]
    pub problem_id: JobId,
}

impl StopSolve {
    pub const EVENT: &'static str = "stopSolve";
}

/// Health probe. Without a target id this is the startup discovery
/// broadcast every solver answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverPing {
    #[serde(rename = "solverID", default, skip_serializing_if = "Option::is_none")]
    pub solver_id: Option<SolverId>,
}

impl SolverPing {
    pub const EVENT: &'static str = "solver-ping";
}

/// Liveness answer from a solver. `problem_id` of -1 means the worker is
/// idle; `respond` asks for a ping back so the worker can confirm the
/// scheduler heard it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverPong {
    #[serde(rename = "solverID")]
    pub solver_id: SolverId,
    #[serde(rename = "problemID", default = "idle_problem_id")]
    pub problem_id: i64,
    #[serde(default)]
    pub respond: bool,
}

fn idle_problem_id() -> i64 {
    -1
}

impl SolverPong {
    pub const EVENT: &'static str = "solver-pong-response";

    /// The job the worker says it is working on, if any
    pub fn assigned_job(&self) -> Option<JobId> {
        (self.problem_id >= 0).then_some(JobId(self.problem_id))
    }
}

/// The memory limit crosses the wire as a string with its unit, or `false`
/// when unbounded.
mod memory_limit_wire {
    use super::*;

    pub fn serialize<S: Serializer>(limit: &ResourceLimit, serializer: S) -> Result<S::Ok, S::Error> {
        match limit {
            ResourceLimit::Bounded(megabytes) => serializer.serialize_str(&format!("{megabytes}m")),
            ResourceLimit::Unbounded => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ResourceLimit, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Bound(u64),
            Flag(bool),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Text(text)) => {
                let digits = text.trim_end_matches(|c: char| !c.is_ascii_digit());
                let megabytes: u64 = digits
                    .parse()
                    .map_err(|_| serde::de::Error::custom(format!("bad memory limit: {text}")))?;
                Ok(ResourceLimit::from(megabytes))
            }
            Some(Raw::Bound(megabytes)) => Ok(ResourceLimit::from(megabytes)),
            _ => Ok(ResourceLimit::Unbounded),
        }
    }
}
