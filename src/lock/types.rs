use crate::cluster::types::MemberId;
use crate::invocation::types::{CallId, WaitBudget};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// Identity holding a lock: the member plus a session that stands in for the
/// calling thread. Two proxies on the same member are different owners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LockOwner {
    pub member: MemberId,
    pub session: Uuid,
}

impl LockOwner {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            session: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub namespace: String,
    /// Serialized key data.
    pub key: String,
}

impl LockKey {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

/// The replicated part of a lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub owner: LockOwner,
    pub lock_count: u32,
    /// Lease expiry in epoch millis; `None` holds until unlocked.
    pub expires_at: Option<u64>,
}

impl LockRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LockOperation {
    Acquire {
        key: String,
        owner: LockOwner,
        lease_ms: Option<u64>,
        wait: WaitBudget,
    },
    Release {
        key: String,
        owner: LockOwner,
    },
    ForceRelease {
        key: String,
    },
    IsLocked {
        key: String,
        /// When set, only a lock held by this owner counts.
        owner: Option<LockOwner>,
    },
}

impl LockOperation {
    pub fn key(&self) -> &str {
        match self {
            Self::Acquire { key, .. }
            | Self::Release { key, .. }
            | Self::ForceRelease { key }
            | Self::IsLocked { key, .. } => key,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::IsLocked { .. })
    }

    pub fn wait_budget(&self) -> WaitBudget {
        match self {
            Self::Acquire { wait, .. } => *wait,
            _ => WaitBudget::NoWait,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Acquire { .. } => "lock",
            Self::Release { .. } => "unlock",
            Self::ForceRelease { .. } => "force_unlock",
            Self::IsLocked { .. } => "is_locked",
        }
    }
}

/// A parked acquire, answered when the lock is granted or its wait runs out.
#[derive(Debug, Clone)]
pub struct Waiter {
    pub call_id: CallId,
    /// Where the response goes.
    pub caller: SocketAddr,
    pub owner: LockOwner,
    pub lease_ms: Option<u64>,
    /// Epoch millis after which the waiter is answered with `false`.
    pub deadline: Option<u64>,
}

impl Waiter {
    pub fn is_same_call(&self, caller: SocketAddr, call_id: CallId) -> bool {
        self.caller == caller && self.call_id == call_id
    }
}

/// The head waiter that just became owner.
#[derive(Debug, Clone)]
pub struct Grant {
    pub waiter: Waiter,
    pub record: LockRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Acquired fresh or re-entered.
    Acquired,
    /// Held by someone else and the caller would not wait.
    Busy,
    Parked,
}

/// Result of one mutation on a lock, with the side effects the owner still
/// has to carry out.
#[derive(Debug)]
pub struct LockChange<T> {
    pub reply: T,
    pub partition_id: u32,
    /// True when the replicated record changed and must be mirrored.
    pub changed: bool,
    /// Record after the mutation; only meaningful when `changed`.
    pub record: Option<LockRecord>,
    pub granted: Option<Grant>,
    /// Waiters found past their deadline while looking for the next owner.
    pub timed_out: Vec<Waiter>,
}

impl<T> LockChange<T> {
    pub fn unchanged(reply: T, partition_id: u32) -> Self {
        Self {
            reply,
            partition_id,
            changed: false,
            record: None,
            granted: None,
            timed_out: Vec::new(),
        }
    }
}
