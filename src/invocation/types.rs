use crate::cluster::types::MemberId;
use crate::error::{GridError, GridResult};
use crate::lock::types::{LockOperation, LockRecord};
use crate::storage::types::{MapOperation, Record};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Correlation id stamped on an operation at send time.
///
/// Zero means "not stamped yet"; the registry hands out ids starting at one.
pub type CallId = u64;

/// A serializable unit of work targeted at one partition replica.
///
/// Immutable once dispatched, except for the call id which is re-stamped on
/// every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub call_id: CallId,
    pub partition_id: u32,
    /// 0 is the partition owner.
    pub replica_index: usize,
    /// Tenant context, e.g. the map or lock name the operation belongs to.
    pub namespace: String,
    pub read_only: bool,
    pub retryable: bool,
    pub body: OperationBody,
}

impl Operation {
    pub fn new(partition_id: u32, namespace: impl Into<String>, body: OperationBody) -> Self {
        Self {
            call_id: 0,
            partition_id,
            replica_index: 0,
            namespace: namespace.into(),
            read_only: body.is_read_only(),
            retryable: true,
            body,
        }
    }

    pub fn with_replica_index(mut self, replica_index: usize) -> Self {
        self.replica_index = replica_index;
        self
    }

    pub fn name(&self) -> &'static str {
        self.body.name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationBody {
    Lock(LockOperation),
    Map(MapOperation),
    /// Member-targeted diagnostics probe.
    MemberStats,
}

impl OperationBody {
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::Lock(op) => op.is_read_only(),
            Self::Map(op) => op.is_read_only(),
            Self::MemberStats => true,
        }
    }

    /// How long the owner may park this operation before answering.
    pub fn wait_budget(&self) -> WaitBudget {
        match self {
            Self::Lock(op) => op.wait_budget(),
            _ => WaitBudget::NoWait,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock(op) => op.name(),
            Self::Map(op) => op.name(),
            Self::MemberStats => "member_stats",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WaitBudget {
    NoWait,
    Bounded { millis: u64 },
    Unbounded,
}

impl WaitBudget {
    /// Epoch millis at which a parked operation gives up.
    pub fn deadline(&self, now: u64) -> Option<u64> {
        match self {
            Self::NoWait => Some(now),
            Self::Bounded { millis } => Some(now.saturating_add(*millis)),
            Self::Unbounded => None,
        }
    }
}

/// The effect of a primary, re-applied on each backup replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BackupOperation {
    /// Mirror of the owner's replicated lock state; `None` removes it.
    LockState {
        key: String,
        record: Option<LockRecord>,
    },
    PutRecord {
        key: String,
        record: Record,
    },
    RemoveRecord {
        key: String,
    },
    SetExpiryPolicy {
        keys: Vec<String>,
        expires_at: Option<u64>,
    },
}

impl BackupOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LockState { .. } => "lock_state_backup",
            Self::PutRecord { .. } => "put_backup",
            Self::RemoveRecord { .. } => "remove_backup",
            Self::SetExpiryPolicy { .. } => "set_expiry_policy_backup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OperationResult {
    Unit,
    Bool(bool),
    /// A JSON document, absent when nothing is stored.
    Data(Option<String>),
    Stats(MemberStats),
}

impl OperationResult {
    pub fn into_bool(self) -> GridResult<bool> {
        match self {
            Self::Bool(value) => Ok(value),
            other => Err(GridError::internal(format!(
                "expected a boolean response, got {:?}",
                other
            ))),
        }
    }

    pub fn into_data(self) -> GridResult<Option<String>> {
        match self {
            Self::Data(value) => Ok(value),
            other => Err(GridError::internal(format!(
                "expected a data response, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberStats {
    pub member: MemberId,
    pub locked_keys: usize,
    pub records: usize,
    pub pending_invocations: usize,
}

/// What the owner sends back for a primary operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub call_id: CallId,
    pub outcome: Result<OperationResult, GridError>,
    /// Number of backups the owner handed off; the invoker waits for this many acks.
    pub backup_acks: usize,
}

/// Everything an invocation can be told by the dispatcher.
#[derive(Debug, Clone)]
pub enum InvocationEvent {
    Response(Response),
    BackupAck,
    MemberLeft(MemberId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationTarget {
    Partition {
        partition_id: u32,
        replica_index: usize,
    },
    Member(MemberId),
}

impl InvocationTarget {
    pub fn of(op: &Operation) -> Self {
        Self::Partition {
            partition_id: op.partition_id,
            replica_index: op.replica_index,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvocationPolicy {
    pub try_count: u32,
    pub try_pause: Duration,
    pub call_timeout: Duration,
    pub backup_timeout: Duration,
    /// Check that a data payload is well-formed JSON before completing.
    pub deserialize_response: bool,
    pub fail_on_indeterminate_operation_state: bool,
}

impl Default for InvocationPolicy {
    fn default() -> Self {
        crate::config::GridConfig::default().default_policy()
    }
}

/// Serializes a caller-supplied key. A key that serializes to JSON `null` is
/// the null key and is rejected.
pub fn serialize_key<K: Serialize + ?Sized>(key: &K) -> GridResult<String> {
    let data = serde_json::to_string(key)?;
    if data == "null" {
        return Err(GridError::invalid_argument("key can't be null"));
    }
    Ok(data)
}

pub fn now_ms() -> u64 {
    millis_of(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default(),
    )
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis_of(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
