use serde::{Deserialize, Serialize};

/// Map operations run by the partition owner. Keys and values travel as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapOperation {
    Put {
        key: String,
        value_json: String,
        /// Entry expiry; `None` keeps the entry until removed.
        ttl_ms: Option<u64>,
    },
    Get {
        key: String,
    },
    Remove {
        key: String,
    },
    /// Resets the expiry of the listed keys that exist on one partition.
    SetExpiryPolicy {
        keys: Vec<String>,
        ttl_ms: Option<u64>,
    },
}

impl MapOperation {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Get { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::Remove { .. } => "remove",
            Self::SetExpiryPolicy { .. } => "set_expiry_policy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub value_json: String,
    /// Epoch millis after which the entry is gone.
    pub expires_at: Option<u64>,
}

impl Record {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
