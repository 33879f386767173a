//! Operation Dispatcher
//!
//! Sits between invocations and the transport on every member.
//!
//! ## Responsibilities
//! - **Outbound**: runs an operation in-process when the target is this member, otherwise
//!   encodes it and hands it to the transport exactly once.
//! - **Owner side**: validates ownership, runs the operation against the local stores, ships
//!   its backups to replicas `1..=backup_count` and only then answers the caller with the
//!   number of backups handed off.
//! - **Backup side**: applies backups and acks them straight to the invoker.
//! - **Correlation**: routes inbound responses and acks to the local `InvocationRegistry`.
//! - **Lock timers**: lease expiry and bounded waits are tokio timers owned by the member
//!   that holds the lock.

use super::protocol::{self, BackupPacket, Packet};
use super::transport::Transport;
use crate::cluster::partition::PartitionTable;
use crate::cluster::types::PartitionReplica;
use crate::error::{GridError, GridResult};
use crate::invocation::registry::InvocationRegistry;
use crate::invocation::types::{
    BackupOperation, CallId, MemberStats, Operation, OperationBody, OperationResult, Response,
    now_ms,
};
use crate::lock::store::LockStore;
use crate::lock::types::{AcquireOutcome, Grant, LockChange, LockKey, LockOperation, Waiter};
use crate::storage::record_store::RecordStore;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub struct OperationDispatcher {
    local: PartitionReplica,
    partitions: Arc<dyn PartitionTable>,
    transport: Arc<dyn Transport>,
    registry: Arc<InvocationRegistry>,
    locks: LockStore,
    records: RecordStore,
    backup_count: usize,
}

impl OperationDispatcher {
    pub fn new(
        local: PartitionReplica,
        partitions: Arc<dyn PartitionTable>,
        transport: Arc<dyn Transport>,
        registry: Arc<InvocationRegistry>,
        backup_count: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            partitions,
            transport,
            registry,
            locks: LockStore::new(),
            records: RecordStore::new(),
            backup_count,
        })
    }

    pub fn local(&self) -> &PartitionReplica {
        &self.local
    }

    pub fn locks(&self) -> &LockStore {
        &self.locks
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn stats(&self) -> MemberStats {
        let now = now_ms();
        MemberStats {
            member: self.local.member.clone(),
            locked_keys: self.locks.locked_count(now),
            records: self.records.local_entry_count(now),
            pending_invocations: self.registry.len(),
        }
    }

    /// Sends `op` to `target`. `Err` means the operation never left this
    /// member; the outcome itself arrives through the registry.
    pub async fn send(
        self: &Arc<Self>,
        op: &Operation,
        target: &PartitionReplica,
    ) -> GridResult<()> {
        if target.member == self.local.member {
            self.run_operation(op.clone(), self.local.address).await;
            return Ok(());
        }

        let packet = Packet::Operation {
            caller: self.local.address,
            op: op.clone(),
        };
        self.send_packet(target.address, &packet).await
    }

    /// Entry point for everything the transport delivers.
    pub async fn handle_packet(self: &Arc<Self>, bytes: &[u8]) -> GridResult<()> {
        let packet = protocol::decode(bytes)?;
        self.handle(packet).await;
        Ok(())
    }

    pub async fn handle(self: &Arc<Self>, packet: Packet) {
        tracing::trace!("Member {} received {}", self.local.member, packet.kind());
        match packet {
            Packet::Operation { caller, op } => self.run_operation(op, caller).await,
            Packet::Response(response) => {
                self.registry.notify_response(response);
            }
            Packet::Backup(backup) => self.run_backup(backup).await,
            Packet::BackupAck { call_id } => {
                self.registry.notify_backup_ack(call_id);
            }
        }
    }

    async fn run_operation(self: &Arc<Self>, op: Operation, caller: SocketAddr) {
        if let Err(error) = self.check_owner(&op) {
            tracing::debug!("Rejecting {} call {}: {}", op.name(), op.call_id, error);
            self.respond(
                caller,
                Response {
                    call_id: op.call_id,
                    outcome: Err(error),
                    backup_acks: 0,
                },
            )
            .await;
            return;
        }

        let now = now_ms();
        match &op.body {
            OperationBody::Lock(lock_op) => self.run_lock(&op, lock_op, caller, now).await,
            OperationBody::Map(map_op) => {
                let (result, backups) =
                    self.records.execute(op.partition_id, &op.namespace, map_op, now);
                self.complete(&op, caller, result, backups).await;
            }
            OperationBody::MemberStats => {
                let stats = self.stats();
                self.complete(&op, caller, Ok(OperationResult::Stats(stats)), Vec::new())
                    .await;
            }
        }
    }

    /// Only the replica the operation was aimed at may run it.
    fn check_owner(&self, op: &Operation) -> GridResult<()> {
        if matches!(op.body, OperationBody::MemberStats) {
            return Ok(());
        }
        match self.partitions.replica(op.partition_id, op.replica_index) {
            Some(replica) if replica.member == self.local.member => Ok(()),
            _ => Err(GridError::WrongTarget {
                member: self.local.member.clone(),
                partition_id: op.partition_id,
            }),
        }
    }

    /// Ships the backups of a successful primary, then answers the caller.
    async fn complete(
        &self,
        op: &Operation,
        caller: SocketAddr,
        result: GridResult<OperationResult>,
        backups: Vec<BackupOperation>,
    ) {
        let backup_acks = if result.is_ok() {
            self.send_backups(
                &op.namespace,
                op.partition_id,
                caller,
                Some(op.call_id),
                backups,
            )
            .await
        } else {
            0
        };

        self.respond(
            caller,
            Response {
                call_id: op.call_id,
                outcome: result,
                backup_acks,
            },
        )
        .await;
    }

    /// Returns how many replicas the backups were handed to.
    async fn send_backups(
        &self,
        namespace: &str,
        partition_id: u32,
        origin: SocketAddr,
        call_id: Option<CallId>,
        ops: Vec<BackupOperation>,
    ) -> usize {
        if ops.is_empty() {
            return 0;
        }

        let mut sent = 0;
        for replica_index in 1..=self.backup_count {
            let Some(replica) = self.partitions.replica(partition_id, replica_index) else {
                continue;
            };
            if replica.member == self.local.member {
                continue;
            }

            let packet = Packet::Backup(BackupPacket {
                origin,
                call_id,
                partition_id,
                replica_index,
                namespace: namespace.to_string(),
                ops: ops.clone(),
            });
            match self.send_packet(replica.address, &packet).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(
                        "Backup of partition {} to replica {} failed: {}",
                        partition_id,
                        replica_index,
                        e
                    );
                }
            }
        }
        sent
    }

    async fn run_backup(&self, backup: BackupPacket) {
        for op in &backup.ops {
            match op {
                BackupOperation::LockState { key, record } => {
                    self.locks.apply_backup(
                        backup.partition_id,
                        &LockKey::new(&backup.namespace, key),
                        record.clone(),
                    );
                }
                _ => self
                    .records
                    .apply_backup(backup.partition_id, &backup.namespace, op),
            }
        }
        tracing::trace!(
            "Applied {} backups for partition {} as replica {}",
            backup.ops.len(),
            backup.partition_id,
            backup.replica_index
        );

        let Some(call_id) = backup.call_id else {
            return;
        };
        if backup.origin == self.local.address {
            self.registry.notify_backup_ack(call_id);
        } else if let Err(e) = self
            .send_packet(backup.origin, &Packet::BackupAck { call_id })
            .await
        {
            tracing::warn!("Backup ack for call {} lost: {}", call_id, e);
        }
    }

    async fn respond(&self, caller: SocketAddr, response: Response) {
        if caller == self.local.address {
            self.registry.notify_response(response);
            return;
        }
        let call_id = response.call_id;
        if let Err(e) = self.send_packet(caller, &Packet::Response(response)).await {
            tracing::warn!("Response for call {} to {} lost: {}", call_id, caller, e);
        }
    }

    async fn send_packet(&self, target: SocketAddr, packet: &Packet) -> GridResult<()> {
        let bytes = protocol::encode(packet)?;
        self.transport
            .send_to_target(target, bytes)
            .await
            .map_err(|e| GridError::TargetDisconnected {
                address: target.to_string(),
                message: e.to_string(),
            })
    }

    // ============================================================
    // LOCKS
    // ============================================================

    async fn run_lock(
        self: &Arc<Self>,
        op: &Operation,
        lock_op: &LockOperation,
        caller: SocketAddr,
        now: u64,
    ) {
        let key = LockKey::new(&op.namespace, lock_op.key());
        let partition_id = op.partition_id;

        match lock_op {
            LockOperation::Acquire {
                owner,
                lease_ms,
                wait,
                ..
            } => {
                let deadline = wait.deadline(now);
                let waiter = Waiter {
                    call_id: op.call_id,
                    caller,
                    owner: owner.clone(),
                    lease_ms: *lease_ms,
                    deadline,
                };
                let mut change = self.locks.acquire(partition_id, &key, waiter, *wait, now);
                let backups = lock_backups(&key, &change);

                match change.reply {
                    AcquireOutcome::Acquired => {
                        let expires_at = change.record.as_ref().and_then(|r| r.expires_at);
                        self.schedule_lease_expiry(&key, expires_at);
                        self.complete(op, caller, Ok(OperationResult::Bool(true)), backups)
                            .await;
                    }
                    AcquireOutcome::Busy => {
                        self.complete(op, caller, Ok(OperationResult::Bool(false)), backups)
                            .await;
                    }
                    AcquireOutcome::Parked => {
                        // The holder's lease may predate this member's ownership.
                        let current = self.locks.record(&key).and_then(|r| r.expires_at);
                        self.schedule_lease_expiry(&key, current);
                        self.schedule_wait_timeout(&key, caller, op.call_id, deadline);
                        self.send_backups(
                            &key.namespace,
                            partition_id,
                            self.local.address,
                            None,
                            backups,
                        )
                        .await;
                    }
                }
                self.finish_lock_change(&key, &mut change).await;
            }
            LockOperation::Release { owner, .. } => {
                let mut change = self.locks.release(partition_id, &key, owner, now);
                let backups = lock_backups(&key, &change);
                let result = change
                    .reply
                    .clone()
                    .map(|()| OperationResult::Unit);
                self.complete(op, caller, result, backups).await;
                self.finish_lock_change(&key, &mut change).await;
            }
            LockOperation::ForceRelease { .. } => {
                let mut change = self.locks.force_release(partition_id, &key, now);
                let backups = lock_backups(&key, &change);
                self.complete(op, caller, Ok(OperationResult::Unit), backups)
                    .await;
                self.finish_lock_change(&key, &mut change).await;
            }
            LockOperation::IsLocked { owner, .. } => {
                let locked = self.locks.is_locked(&key, owner.as_ref(), now);
                self.complete(op, caller, Ok(OperationResult::Bool(locked)), Vec::new())
                    .await;
            }
        }
    }

    /// Answers waiters that ran out of time and the waiter that was granted.
    async fn finish_lock_change<T>(self: &Arc<Self>, key: &LockKey, change: &mut LockChange<T>) {
        for waiter in change.timed_out.drain(..) {
            self.respond(
                waiter.caller,
                Response {
                    call_id: waiter.call_id,
                    outcome: Ok(OperationResult::Bool(false)),
                    backup_acks: 0,
                },
            )
            .await;
        }

        if let Some(Grant { waiter, record }) = change.granted.take() {
            tracing::debug!(
                "Lock {}/{} granted to waiting call {}",
                key.namespace,
                key.key,
                waiter.call_id
            );
            self.schedule_lease_expiry(key, record.expires_at);
            let backups = vec![BackupOperation::LockState {
                key: key.key.clone(),
                record: Some(record),
            }];
            let backup_acks = self
                .send_backups(
                    &key.namespace,
                    change.partition_id,
                    waiter.caller,
                    Some(waiter.call_id),
                    backups,
                )
                .await;
            self.respond(
                waiter.caller,
                Response {
                    call_id: waiter.call_id,
                    outcome: Ok(OperationResult::Bool(true)),
                    backup_acks,
                },
            )
            .await;
        }
    }

    fn schedule_lease_expiry(self: &Arc<Self>, key: &LockKey, expires_at: Option<u64>) {
        // A saturated lease never runs out.
        let Some(expires_at) = expires_at.filter(|at| *at < u64::MAX) else {
            return;
        };
        let dispatcher = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let delay = expires_at.saturating_sub(now_ms());
            tokio::time::sleep(Duration::from_millis(delay)).await;
            dispatcher.on_lease_expired(key).await;
        });
    }

    async fn on_lease_expired(self: &Arc<Self>, key: LockKey) {
        // Stale timers find nothing to expire.
        let Some(mut change) = self.locks.expire(&key, now_ms()) else {
            return;
        };
        if change.reply {
            let backups = lock_backups(&key, &change);
            self.send_backups(
                &key.namespace,
                change.partition_id,
                self.local.address,
                None,
                backups,
            )
            .await;
        }
        self.finish_lock_change(&key, &mut change).await;
    }

    fn schedule_wait_timeout(
        self: &Arc<Self>,
        key: &LockKey,
        caller: SocketAddr,
        call_id: CallId,
        deadline: Option<u64>,
    ) {
        let Some(deadline) = deadline.filter(|at| *at < u64::MAX) else {
            return;
        };
        let dispatcher = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let delay = deadline.saturating_sub(now_ms());
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if let Some(waiter) = dispatcher.locks.cancel_waiter(&key, caller, call_id) {
                tracing::debug!(
                    "Wait of call {} on lock {}/{} ran out",
                    call_id,
                    key.namespace,
                    key.key
                );
                dispatcher
                    .respond(
                        waiter.caller,
                        Response {
                            call_id: waiter.call_id,
                            outcome: Ok(OperationResult::Bool(false)),
                            backup_acks: 0,
                        },
                    )
                    .await;
            }
        });
    }
}

fn lock_backups<T>(key: &LockKey, change: &LockChange<T>) -> Vec<BackupOperation> {
    if !change.changed {
        return Vec::new();
    }
    vec![BackupOperation::LockState {
        key: key.key.clone(),
        record: change.record.clone(),
    }]
}
