//! Cluster View Module
//!
//! The invocation core never runs a membership protocol of its own. It consumes
//! the cluster as a partition-table oracle: given a partition and a replica
//! index, who currently holds that replica.
//!
//! ## Core Concepts
//! - **Partitioning**: keys hash into a fixed number of partitions.
//! - **Replicas**: each partition has an ordered replica list, index 0 is the owner,
//!   the rest are backups.
//! - **Membership changes**: removing a member promotes its backups in order, so
//!   mirrored state on a backup becomes the owner's state.

pub mod partition;
pub mod types;

#[cfg(test)]
mod tests;
