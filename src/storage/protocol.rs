//! Map HTTP Protocol
//!
//! Public endpoints and DTOs for the replicated map. Keys and values are
//! arbitrary JSON; a `null` key is rejected.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

pub const ENDPOINT_MAP_PUT: &str = "/map/put";
pub const ENDPOINT_MAP_GET: &str = "/map/get";
pub const ENDPOINT_MAP_REMOVE: &str = "/map/remove";
pub const ENDPOINT_MAP_EXPIRY: &str = "/map/expiry";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    /// Map name.
    pub name: String,
    pub key: serde_json::Value,
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    pub name: String,
    pub key: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyQuery {
    pub name: String,
    /// The key as JSON text.
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiryRequest {
    pub name: String,
    pub keys: Vec<serde_json::Value>,
    /// Omitted makes the entries permanent.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

/// Answer to every map call. `value` is the stored value for a get and the
/// previous value for a put or remove.
#[derive(Debug, Serialize, Deserialize)]
pub struct MapResponse {
    pub success: bool,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}
