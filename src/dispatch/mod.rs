//! Dispatch Module
//!
//! Moves operations, responses, backups and acks between members.
//!
//! ## Components
//! - **`dispatcher`**: `OperationDispatcher`, the per-member send/receive hub and the
//!   owner-side execution of operations.
//! - **`protocol`**: the bincode `Packet` envelope.
//! - **`transport`**: the `Transport` seam and its HTTP implementation.
//! - **`memory`**: an in-process network with fault injection, for embedded clusters.
//! - **`handlers`**: the axum endpoint receiving packets.

pub mod dispatcher;
pub mod handlers;
pub mod memory;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod tests;
