//! Lock HTTP Protocol
//!
//! Endpoints and DTOs for driving locks over HTTP. A client identifies itself
//! with a session id it chooses; every request carrying the same session acts
//! as the same lock owner on the receiving member.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- API Endpoints ---

pub const ENDPOINT_LOCK_ACQUIRE: &str = "/lock/acquire";
pub const ENDPOINT_LOCK_RELEASE: &str = "/lock/release";
pub const ENDPOINT_LOCK_FORCE_UNLOCK: &str = "/lock/force_unlock";
pub const ENDPOINT_LOCK_STATUS: &str = "/lock/status";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct LockRequest {
    /// Lock family name.
    pub name: String,
    /// Any JSON value; `null` is rejected.
    pub key: serde_json::Value,
    pub session: Uuid,
    /// Lease; omitted holds until released.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Bounded wait; omitted blocks until acquired.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockStatusQuery {
    pub name: String,
    /// The key as JSON text.
    pub key: String,
    #[serde(default)]
    pub session: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockStatusResponse {
    pub locked: bool,
    /// Present when the query named a session.
    #[serde(default)]
    pub locked_by_session: Option<bool>,
}
