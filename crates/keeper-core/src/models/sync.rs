//! Sync wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

/// Why the server refused to overwrite its copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    #[serde(rename = "server newer by timestamp")]
    ServerNewerByTimestamp,
    #[serde(rename = "server newer by version")]
    ServerNewerByVersion,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ServerNewerByTimestamp => "server newer by timestamp",
            Self::ServerNewerByVersion => "server newer by version",
        })
    }
}

/// A client change the server could not safely apply. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The change as the client submitted it
    pub local: Record,
    /// The authoritative copy
    pub server: Record,
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub changes: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub changes: Vec<Record>,
    pub new_watermark: DateTime<Utc>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}
