//! Error taxonomy shared by the invocation core and its consumers.
//!
//! Every failure an owner produces travels back to the invoker inside a
//! response packet, so `GridError` is serializable and cloneable. Terminal
//! kinds reach the caller intact; transient kinds are retried inside the
//! invocation and only surface once the retry budget is gone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::types::MemberId;

pub type GridResult<T> = Result<T, GridError>;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum GridError {
    /// Null or malformed input, rejected before anything is dispatched.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// No replica could be resolved for the partition.
    #[error("no target found for partition {partition_id} replica {replica_index}")]
    TargetNotFound {
        partition_id: u32,
        replica_index: usize,
    },

    /// The target left the cluster while the operation was in flight.
    #[error("member {member:?} left the cluster")]
    MemberLeft { member: MemberId },

    /// The overall call deadline elapsed.
    #[error("call {call_id} timed out after {elapsed_ms} ms ({attempts} attempts)")]
    CallTimeout {
        call_id: u64,
        elapsed_ms: u64,
        attempts: u32,
    },

    /// The effect of the operation is unknown to the caller.
    #[error("indeterminate operation state: {message}")]
    IndeterminateOperationState { message: String },

    /// Unlock by a non-owner, or unlock of a key that is not locked.
    #[error("illegal lock state: {message}")]
    IllegalLockState { message: String },

    /// The receiving member no longer owns the partition.
    #[error("member {member:?} is not the owner of partition {partition_id}")]
    WrongTarget { member: MemberId, partition_id: u32 },

    /// The transport could not hand the packet off to the target.
    #[error("target {address} is unreachable: {message}")]
    TargetDisconnected { address: String, message: String },

    /// The caller cancelled the invocation before it completed.
    #[error("invocation was cancelled")]
    Cancelled,

    #[error("serialization failure: {message}")]
    Serialization { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GridError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn illegal_lock_state(message: impl Into<String>) -> Self {
        Self::IllegalLockState {
            message: message.into(),
        }
    }

    pub fn indeterminate(message: impl Into<String>) -> Self {
        Self::IndeterminateOperationState {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short stable label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::TargetNotFound { .. } => "target_not_found",
            Self::MemberLeft { .. } => "member_left",
            Self::CallTimeout { .. } => "call_timeout",
            Self::IndeterminateOperationState { .. } => "indeterminate_operation_state",
            Self::IllegalLockState { .. } => "illegal_lock_state",
            Self::WrongTarget { .. } => "wrong_target",
            Self::TargetDisconnected { .. } => "target_disconnected",
            Self::Cancelled => "cancelled",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<bincode::Error> for GridError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
