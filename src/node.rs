//! A grid member: the registry, dispatcher and partition view of one node,
//! plus the proxies callers use on it.

use crate::cluster::partition::PartitionTable;
use crate::cluster::types::{MemberId, PartitionReplica};
use crate::config::GridConfig;
use crate::dispatch::dispatcher::OperationDispatcher;
use crate::dispatch::transport::Transport;
use crate::error::{GridError, GridResult};
use crate::invocation::invocation::{Invocation, InvocationContext, InvocationFuture};
use crate::invocation::registry::InvocationRegistry;
use crate::invocation::types::{
    InvocationPolicy, InvocationTarget, MemberStats, Operation, OperationBody, OperationResult,
};
use crate::lock::proxy::LockProxy;
use crate::storage::proxy::MapProxy;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct GridNode {
    config: GridConfig,
    partitions: Arc<dyn PartitionTable>,
    registry: Arc<InvocationRegistry>,
    dispatcher: Arc<OperationDispatcher>,
}

impl GridNode {
    pub fn new(
        config: GridConfig,
        local: PartitionReplica,
        partitions: Arc<dyn PartitionTable>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let registry = InvocationRegistry::new();
        let dispatcher = OperationDispatcher::new(
            local,
            partitions.clone(),
            transport,
            registry.clone(),
            config.backup_count,
        );

        Arc::new(Self {
            config,
            partitions,
            registry,
            dispatcher,
        })
    }

    pub fn local(&self) -> &PartitionReplica {
        self.dispatcher.local()
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InvocationRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<OperationDispatcher> {
        &self.dispatcher
    }

    pub fn policy(&self) -> InvocationPolicy {
        self.config.default_policy()
    }

    pub fn partition_id(&self, key_data: &str) -> u32 {
        self.partitions.partition_id(key_data)
    }

    pub fn lock_proxy(self: &Arc<Self>, name: impl Into<String>) -> LockProxy {
        LockProxy::new(self.clone(), name)
    }

    pub fn map_proxy<V>(self: &Arc<Self>, name: impl Into<String>) -> MapProxy<V>
    where
        V: Serialize + DeserializeOwned,
    {
        MapProxy::new(self.clone(), name)
    }

    /// Invokes `op` on its partition owner with the default policy.
    pub fn invoke(&self, op: Operation) -> InvocationFuture {
        let target = InvocationTarget::of(&op);
        self.invoke_with(op, target, self.policy())
    }

    pub fn invoke_with(
        &self,
        op: Operation,
        target: InvocationTarget,
        policy: InvocationPolicy,
    ) -> InvocationFuture {
        let context = InvocationContext {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            partitions: self.partitions.clone(),
        };
        Invocation::new(context, op, target, policy).invoke()
    }

    /// Asks one specific member for its counters.
    pub async fn member_stats(&self, member: &MemberId) -> GridResult<MemberStats> {
        let op = Operation::new(0, "", OperationBody::MemberStats);
        let target = InvocationTarget::Member(member.clone());
        match self.invoke_with(op, target, self.policy()).await? {
            OperationResult::Stats(stats) => Ok(stats),
            other => Err(GridError::internal(format!(
                "expected member stats, got {:?}",
                other
            ))),
        }
    }

    pub fn local_stats(&self) -> MemberStats {
        self.dispatcher.stats()
    }

    /// Must be called after the partition table dropped `member`; fails every
    /// invocation still waiting on it for a primary response.
    pub fn on_member_removed(&self, member: &MemberId) -> usize {
        self.registry.on_member_left(member)
    }
}
