use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Stable id derived from a member's address, so every node started from the
    /// same static member list agrees on the ids.
    pub fn from_address(address: SocketAddr) -> Self {
        let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, address.to_string().as_bytes());
        Self(id.to_string())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one replica holder: the member and the address it listens on.
///
/// Resolved fresh for every invocation attempt, never cached across retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PartitionReplica {
    pub member: MemberId,
    pub address: SocketAddr,
}

impl PartitionReplica {
    pub fn new(member: MemberId, address: SocketAddr) -> Self {
        Self { member, address }
    }

    pub fn from_address(address: SocketAddr) -> Self {
        Self {
            member: MemberId::from_address(address),
            address,
        }
    }
}
