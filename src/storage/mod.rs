//! Replicated Map Module
//!
//! A partitioned in-memory key-value store whose writes go through the
//! invocation core like every other operation.
//!
//! ## Core Concepts
//! - **Partitioning**: each key belongs to one partition, owned by one member and mirrored
//!   on `backup_count` others.
//! - **Replication**: the owner applies a write, ships one backup per replica and answers with
//!   the number of backups; the caller completes after that many acks.
//! - **Expiry**: entries may carry a TTL and disappear lazily once it passes.
//! - **Access**: `MapProxy` is the typed caller-side handle; `RecordStore` is the storage.

pub mod handlers;
pub mod protocol;
pub mod proxy;
pub mod record_store;
pub mod types;

#[cfg(test)]
mod tests;
