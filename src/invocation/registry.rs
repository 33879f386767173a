//! Invocation Registry
//!
//! Process-wide table from call id to the invocation waiting on it. One
//! registry exists per node and is handed explicitly to the dispatcher and to
//! every invocation; nothing reaches it through global state.
//!
//! Entries live exactly as long as one attempt: registered before the
//! operation is sent, removed when the attempt finishes (or its
//! `Registration` is dropped). Events for call ids that are no longer
//! registered are logged and dropped, never resurrected.

use super::types::{CallId, InvocationEvent, Response};
use crate::cluster::types::MemberId;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

struct PendingInvocation {
    target: MemberId,
    events: mpsc::UnboundedSender<InvocationEvent>,
    /// Set once the primary response is in; a later departure of the target
    /// no longer concerns this invocation.
    responded: bool,
}

pub struct InvocationRegistry {
    sequence: AtomicU64,
    invocations: DashMap<CallId, PendingInvocation>,
}

/// A live registry entry. Dropping it deregisters the call id.
pub struct Registration {
    pub call_id: CallId,
    pub events: mpsc::UnboundedReceiver<InvocationEvent>,
    registry: Arc<InvocationRegistry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.call_id);
    }
}

impl InvocationRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sequence: AtomicU64::new(0),
            invocations: DashMap::new(),
        })
    }

    /// Allocates a fresh call id and registers an attempt aimed at `target`.
    pub fn register(self: &Arc<Self>, target: MemberId) -> Registration {
        let call_id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();

        self.invocations.insert(
            call_id,
            PendingInvocation {
                target,
                events: sender,
                responded: false,
            },
        );
        tracing::trace!("Registered call {}", call_id);

        Registration {
            call_id,
            events: receiver,
            registry: self.clone(),
        }
    }

    pub fn deregister(&self, call_id: CallId) -> bool {
        let removed = self.invocations.remove(&call_id).is_some();
        if removed {
            tracing::trace!("Deregistered call {}", call_id);
        }
        removed
    }

    pub fn notify_response(&self, response: Response) -> bool {
        let call_id = response.call_id;
        match self.invocations.get_mut(&call_id) {
            Some(mut pending) => {
                pending.responded = true;
                pending
                    .events
                    .send(InvocationEvent::Response(response))
                    .is_ok()
            }
            None => {
                tracing::warn!("Dropping response for unknown call {}", call_id);
                false
            }
        }
    }

    pub fn notify_backup_ack(&self, call_id: CallId) -> bool {
        match self.invocations.get(&call_id) {
            Some(pending) => pending.events.send(InvocationEvent::BackupAck).is_ok(),
            None => {
                tracing::debug!("Dropping backup ack for unknown call {}", call_id);
                false
            }
        }
    }

    /// Tells every attempt still waiting on `member` for a primary response that
    /// the member is gone. Returns how many were notified.
    pub fn on_member_left(&self, member: &MemberId) -> usize {
        let mut notified = 0;
        for entry in self.invocations.iter() {
            let pending = entry.value();
            if &pending.target != member || pending.responded {
                continue;
            }
            if pending
                .events
                .send(InvocationEvent::MemberLeft(member.clone()))
                .is_ok()
            {
                notified += 1;
            }
        }

        if notified > 0 {
            tracing::info!(
                "Member {} left, notified {} pending invocations",
                member,
                notified
            );
        }
        notified
    }

    pub fn contains(&self, call_id: CallId) -> bool {
        self.invocations.contains_key(&call_id)
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}
