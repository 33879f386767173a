//! Invocation Module
//!
//! Executes one logical operation against the replica that should run it and
//! reports exactly one outcome to the caller.
//!
//! ## Lifecycle
//! 1. **Resolve**: the target replica is read from the partition table on every
//!    attempt, never reused from an earlier one.
//! 2. **Register**: a fresh call id is registered in the `InvocationRegistry`
//!    before anything is sent, so a fast response always finds its invocation.
//! 3. **Dispatch**: the `OperationDispatcher` runs the operation in-process when the
//!    target is local, otherwise serializes it and hands it to the transport.
//! 4. **Complete**: the primary response and the backup acks arrive as events on the
//!    invocation's own channel; the `BackupAckTracker` decides when the result may be
//!    released.
//! 5. **Retry or fail**: failures are classified into throw / retry / retry-local.
//!
//! ## Submodules
//! - **`types`**: operations, policies, responses and the events an invocation consumes.
//! - **`registry`**: call id → pending invocation table.
//! - **`backup`**: backup ack accounting.
//! - **`invocation`**: the retry/timeout state machine and exception classification.

pub mod backup;
pub mod invocation;
pub mod registry;
pub mod types;
