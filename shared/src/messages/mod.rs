//! Message contracts for the solver scheduling system
//!
//! Every payload that crosses the pub/sub bus is defined here, organized by
//! peer:
//! - `job`: API gateway ↔ scheduler (submissions, removals, queries)
//! - `solver`: scheduler ↔ remote solver workers (dispatch, liveness)
//! - `rpc`: correlation-layer request/response pairs to the user, file and
//!   catalog services
//!
//! Field names follow the wire contract (`solverID`, `problemID`, ...), so
//! structs carry serde renames rather than leaking camelCase into Rust.

pub mod job;
pub mod rpc;
pub mod solver;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{SharedError, SharedResult};

pub use job::{
    AddJob, AddJobResponse, JobHistoryRequest, JobHistoryResponse, JobOutputRequest,
    JobOutputResponse, PartSpec, QueueCheck, RemoveJob, RemoveJobResponse,
};
pub use rpc::{GetUser, GetUserResponse, ListSolvers, ListSolversResponse, ReadFile, ReadFileResponse};
pub use solver::{Solve, SolverPing, SolverPong, SolverResponse, StopSolve};

/// Decode an inbound payload into its typed contract.
pub fn decode<M: DeserializeOwned>(event: &str, payload: &Value) -> SharedResult<M> {
    serde_json::from_value(payload.clone()).map_err(|e| SharedError::DeserializationError {
        event: event.to_string(),
        message: e.to_string(),
    })
}

/// Serde adapter for fields the wire carries as either a value or `false`.
///
/// The gateway-facing responses answer "nothing there" with a literal
/// `false` rather than `null`, so `Option::None` maps to `false` on the way
/// out and both `false` and `null` map back to `None`.
pub mod or_false {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Value(T),
            Flag(bool),
        }

        match Option::<Raw<T>>::deserialize(deserializer)? {
            Some(Raw::Value(inner)) => Ok(Some(inner)),
            _ => Ok(None),
        }
    }
}
