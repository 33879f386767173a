//! Owner-side lock state.
//!
//! One `LockState` per locked key, held in a `DashMap` so unrelated keys never
//! contend. The store is purely synchronous: it mutates state and reports what
//! the caller still has to do (answer a granted waiter, mirror the record to
//! backups, answer waiters whose wait ran out). Timers and networking live in
//! the dispatcher.

use super::types::{AcquireOutcome, Grant, LockChange, LockKey, LockOwner, LockRecord, Waiter};
use crate::error::{GridError, GridResult};
use crate::invocation::types::{CallId, WaitBudget};

use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;

#[derive(Debug)]
struct LockState {
    partition_id: u32,
    record: Option<LockRecord>,
    /// Parked acquires in arrival order. Owner-local, never replicated.
    waiters: VecDeque<Waiter>,
}

impl LockState {
    fn new(partition_id: u32) -> Self {
        Self {
            partition_id,
            record: None,
            waiters: VecDeque::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.record.is_none() && self.waiters.is_empty()
    }

    fn live_record(&self, now: u64) -> Option<&LockRecord> {
        self.record.as_ref().filter(|record| !record.is_expired(now))
    }

    /// Drops a lapsed lease and hands the lock to the next waiter.
    fn expire_if_due(&mut self, now: u64, timed_out: &mut Vec<Waiter>) -> (bool, Option<Grant>) {
        if self.record.as_ref().is_some_and(|record| record.is_expired(now)) {
            self.record = None;
            (true, self.grant_next(now, timed_out))
        } else {
            (false, None)
        }
    }

    fn grant_next(&mut self, now: u64, timed_out: &mut Vec<Waiter>) -> Option<Grant> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.deadline.is_some_and(|deadline| deadline <= now) {
                timed_out.push(waiter);
                continue;
            }
            let record = LockRecord {
                owner: waiter.owner.clone(),
                lock_count: 1,
                expires_at: waiter.lease_ms.map(|lease| now.saturating_add(lease)),
            };
            self.record = Some(record.clone());
            return Some(Grant { waiter, record });
        }
        None
    }
}

pub struct LockStore {
    locks: DashMap<LockKey, LockState>,
}

impl Default for LockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStore {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub fn acquire(
        &self,
        partition_id: u32,
        key: &LockKey,
        waiter: Waiter,
        wait: WaitBudget,
        now: u64,
    ) -> LockChange<AcquireOutcome> {
        let mut entry = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| LockState::new(partition_id));
        let state = entry.value_mut();

        let mut timed_out = Vec::new();
        let (mut changed, granted) = state.expire_if_due(now, &mut timed_out);

        let reply = match state.record.as_mut() {
            None => {
                state.record = Some(LockRecord {
                    owner: waiter.owner,
                    lock_count: 1,
                    expires_at: waiter.lease_ms.map(|lease| now.saturating_add(lease)),
                });
                changed = true;
                AcquireOutcome::Acquired
            }
            Some(record) if record.owner == waiter.owner => {
                record.lock_count += 1;
                record.expires_at = waiter.lease_ms.map(|lease| now.saturating_add(lease));
                changed = true;
                AcquireOutcome::Acquired
            }
            Some(_) if wait == WaitBudget::NoWait => AcquireOutcome::Busy,
            Some(_) => {
                tracing::trace!(
                    "Parking call {} on lock {}/{} behind {} waiters",
                    waiter.call_id,
                    key.namespace,
                    key.key,
                    state.waiters.len()
                );
                state.waiters.push_back(waiter);
                AcquireOutcome::Parked
            }
        };

        let change = LockChange {
            reply,
            partition_id: state.partition_id,
            changed,
            record: state.record.clone(),
            granted,
            timed_out,
        };
        drop(entry);
        self.remove_if_idle(key);
        change
    }

    /// Decrements the hold count; the last release frees the lock and grants
    /// it to the head waiter.
    pub fn release(
        &self,
        partition_id: u32,
        key: &LockKey,
        owner: &LockOwner,
        now: u64,
    ) -> LockChange<GridResult<()>> {
        let Some(mut entry) = self.locks.get_mut(key) else {
            return LockChange::unchanged(Err(not_locked()), partition_id);
        };
        let state = entry.value_mut();

        let mut timed_out = Vec::new();
        let (mut changed, mut granted) = state.expire_if_due(now, &mut timed_out);

        let reply = match state.record.as_mut() {
            None => Err(not_locked()),
            Some(record) if &record.owner != owner => Err(GridError::illegal_lock_state(
                "current session is not the owner of the lock",
            )),
            Some(record) => {
                record.lock_count -= 1;
                if record.lock_count == 0 {
                    state.record = None;
                    granted = state.grant_next(now, &mut timed_out);
                }
                changed = true;
                Ok(())
            }
        };

        let change = LockChange {
            reply,
            partition_id: state.partition_id,
            changed,
            record: state.record.clone(),
            granted,
            timed_out,
        };
        drop(entry);
        self.remove_if_idle(key);
        change
    }

    /// Frees the lock whoever holds it. Never fails.
    pub fn force_release(&self, partition_id: u32, key: &LockKey, now: u64) -> LockChange<()> {
        let Some(mut entry) = self.locks.get_mut(key) else {
            return LockChange::unchanged((), partition_id);
        };
        let state = entry.value_mut();

        let mut timed_out = Vec::new();
        let changed = state.record.take().is_some();
        let granted = if changed {
            state.grant_next(now, &mut timed_out)
        } else {
            None
        };

        let change = LockChange {
            reply: (),
            partition_id: state.partition_id,
            changed,
            record: state.record.clone(),
            granted,
            timed_out,
        };
        drop(entry);
        self.remove_if_idle(key);
        change
    }

    /// Called when a lease timer fires. Replies whether a lease actually lapsed.
    pub fn expire(&self, key: &LockKey, now: u64) -> Option<LockChange<bool>> {
        let mut entry = self.locks.get_mut(key)?;
        let state = entry.value_mut();

        let mut timed_out = Vec::new();
        let (changed, granted) = state.expire_if_due(now, &mut timed_out);
        if changed {
            tracing::debug!("Lease on lock {}/{} expired", key.namespace, key.key);
        }

        let change = LockChange {
            reply: changed,
            partition_id: state.partition_id,
            changed,
            record: state.record.clone(),
            granted,
            timed_out,
        };
        drop(entry);
        self.remove_if_idle(key);
        Some(change)
    }

    /// Takes a parked acquire out of the queue once its wait has run out.
    /// `None` if it was granted meanwhile.
    pub fn cancel_waiter(
        &self,
        key: &LockKey,
        caller: SocketAddr,
        call_id: CallId,
    ) -> Option<Waiter> {
        let waiter = {
            let mut state = self.locks.get_mut(key)?;
            let position = state
                .waiters
                .iter()
                .position(|waiter| waiter.is_same_call(caller, call_id))?;
            state.waiters.remove(position)
        };
        self.remove_if_idle(key);
        waiter
    }

    pub fn is_locked(&self, key: &LockKey, owner: Option<&LockOwner>, now: u64) -> bool {
        self.locks.get(key).is_some_and(|state| {
            state
                .live_record(now)
                .is_some_and(|record| owner.is_none_or(|owner| &record.owner == owner))
        })
    }

    /// Mirrors the owner's record on a backup replica.
    pub fn apply_backup(&self, partition_id: u32, key: &LockKey, record: Option<LockRecord>) {
        match record {
            Some(record) => {
                self.locks
                    .entry(key.clone())
                    .or_insert_with(|| LockState::new(partition_id))
                    .record = Some(record);
            }
            None => {
                if let Some(mut state) = self.locks.get_mut(key) {
                    state.record = None;
                }
                self.remove_if_idle(key);
            }
        }
    }

    pub fn record(&self, key: &LockKey) -> Option<LockRecord> {
        self.locks.get(key).and_then(|state| state.record.clone())
    }

    pub fn waiter_count(&self, key: &LockKey) -> usize {
        self.locks.get(key).map(|state| state.waiters.len()).unwrap_or(0)
    }

    /// Keys currently held by a live lease.
    pub fn locked_count(&self, now: u64) -> usize {
        self.locks
            .iter()
            .filter(|entry| entry.value().live_record(now).is_some())
            .count()
    }

    fn remove_if_idle(&self, key: &LockKey) {
        self.locks.remove_if(key, |_, state| state.is_idle());
    }
}

fn not_locked() -> GridError {
    GridError::illegal_lock_state("lock is not locked")
}
