//! Distributed Lock Module
//!
//! Reentrant, optionally leased, fair locks keyed by any serializable value.
//!
//! ## Model
//! - The partition owner of a key holds its lock record and the FIFO queue of
//!   parked acquires. Only the record is mirrored to backups, so a promoted
//!   backup knows who holds the lock but not who was waiting.
//! - Ownership is a `(member, session)` pair. Each `LockProxy` opens its own
//!   session; the same session may re-enter any number of times.
//! - Leases run on the owner's clock. A lapsed lease is treated as unlocked
//!   immediately and the head waiter is granted when the lease timer fires or
//!   on the next touch of the key, whichever comes first.
//!
//! ## Submodules
//! - **`types`**: owners, records, operations and the change report.
//! - **`store`**: the owner-side state machine.
//! - **`proxy`**: the caller-side API.
//! - **`protocol`** / **`handlers`**: the HTTP surface.

pub mod handlers;
pub mod protocol;
pub mod proxy;
pub mod store;
pub mod types;
