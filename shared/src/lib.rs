//! Shared types for the solver job scheduling service
//!
//! Contains only the types that cross the message bus or are persisted:
//! bus message contracts, domain rows, and the common error/logging
//! utilities. Scheduler-internal state (solver pool, correlation entries)
//! lives in the scheduler crate.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

// Re-export the bus contracts at crate level for convenience
pub use messages::{
    // Gateway ↔ scheduler job traffic
    AddJob, AddJobResponse, JobHistoryRequest, JobHistoryResponse, JobOutputRequest,
    JobOutputResponse, PartSpec, QueueCheck, RemoveJob, RemoveJobResponse,

    // Scheduler ↔ solver worker traffic
    Solve, SolverPing, SolverPong, SolverResponse, StopSolve,

    // Correlation RPCs to the user/file/catalog services
    GetUser, GetUserResponse, ListSolvers, ListSolversResponse, ReadFile, ReadFileResponse,
};
