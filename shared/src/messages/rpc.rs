//! Correlation-layer RPCs to the user, file and catalog services
//!
//! Each request is published with an injected `sessionId`/`requestId` pair
//! and the owning service echoes both back on the paired response event.
//! The identity fields are handled by the correlation layer, not by these
//! structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FileId, SolverCatalogEntry, UserId, UserProfile};

/// Lookup of a user's profile (concurrency allowance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUser {
    pub id: UserId,
}

impl GetUser {
    pub const EVENT: &'static str = "getUser";
    pub const RESPONSE_EVENT: &'static str = "getUser-response";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserResponse {
    #[serde(with = "super::or_false", default)]
    pub data: Option<UserProfile>,
}

/// Lookup of a stored file's content (dataset or model)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFile {
    #[serde(rename = "fileId")]
    pub file_id: FileId,
}

impl ReadFile {
    pub const EVENT: &'static str = "read-file";
    pub const RESPONSE_EVENT: &'static str = "read-file-response";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub data: Value,
}

/// Lookup of the full solver catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSolvers {}

impl ListSolvers {
    pub const EVENT: &'static str = "list-solvers";
    pub const RESPONSE_EVENT: &'static str = "list-solvers-response";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSolversResponse {
    #[serde(default)]
    pub data: Vec<SolverCatalogEntry>,
}
