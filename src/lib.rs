//! Distributed Grid Library
//!
//! The invocation and replication core of a partitioned in-memory data grid,
//! with a replicated map and distributed locks built on top of it. The binary
//! (`main.rs`) wires one member to HTTP; `embedded` runs many inside a single
//! process.
//!
//! ## Architecture Modules
//! - **`cluster`**: member identities and the `PartitionTable` view of who owns which
//!   partition replica. Membership itself is supplied from outside.
//! - **`invocation`**: the retry/timeout state machine that carries one operation to its
//!   target, the call id registry and backup ack accounting.
//! - **`dispatch`**: the per-member hub that sends operations, runs them on the owner,
//!   ships backups and routes responses and acks back.
//! - **`lock`**: reentrant, leased, fair distributed locks.
//! - **`storage`**: the replicated map.
//! - **`node`**: one member and its proxies; **`embedded`**: several members in one runtime.
//! - **`config`** / **`error`**: settings and the shared error taxonomy.

pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod embedded;
pub mod error;
pub mod invocation;
pub mod lock;
pub mod node;
pub mod storage;
