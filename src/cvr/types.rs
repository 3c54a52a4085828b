//! Pull protocol and CVR data types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only pull protocol version this engine serves
pub const PULL_VERSION: i64 = 1;

/// Key of the marker put emitted after a clear
pub const INIT_KEY: &str = "/init";

/// Sync key -> row version (epoch milliseconds)
pub type CvrData = BTreeMap<String, i64>;

/// Client ID -> last applied mutation ID
pub type MutationChanges = BTreeMap<String, i64>;

/// Request body of a pull
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "pullVersion")]
    pub pull_version: i64,
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Version of the CVR the client last received, null on first pull
    #[serde(default)]
    pub cookie: Option<i64>,
}

/// Response body of a pull
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub patch: Vec<PatchOp>,
    pub cookie: Option<i64>,
    #[serde(rename = "lastMutationIDChanges")]
    pub last_mutation_id_changes: MutationChanges,
}

/// One cache mutation sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Clear,
    Put { key: String, value: Value },
    Del { key: String },
}

impl PatchOp {
    /// The `put("/init", true)` marker that follows a clear
    pub fn init() -> Self {
        PatchOp::Put {
            key: INIT_KEY.to_string(),
            value: Value::Bool(true),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            PatchOp::Clear => None,
            PatchOp::Put { key, .. } | PatchOp::Del { key } => Some(key),
        }
    }
}

/// A logical client group and the actor it is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct ClientGroup {
    pub id: String,
    pub actor: Value,
    pub cvr_version: i64,
    pub client_version: i64,
}

/// A stored client view record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CvrSnapshot {
    pub version: i64,
    pub data: CvrData,
    /// Group client version when the snapshot was written
    pub client_version: i64,
}

/// Authoritative version of one visible row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRow {
    pub table: String,
    pub id: String,
    pub key: String,
    /// Last modification, epoch milliseconds
    pub version: i64,
}
