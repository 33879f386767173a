//! Embedded Cluster
//!
//! Runs several grid members inside one tokio runtime over an
//! `InMemoryNetwork`. Each member keeps its own `PartitionManager`, and
//! membership changes are applied to every table before any registry hears
//! about them, mirroring how an external membership service would deliver
//! them.

use crate::cluster::partition::{PartitionManager, PartitionTable, partition_for};
use crate::cluster::types::{MemberId, PartitionReplica};
use crate::config::GridConfig;
use crate::dispatch::memory::InMemoryNetwork;
use crate::invocation::types::serialize_key;
use crate::node::GridNode;

use dashmap::DashMap;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

const BASE_PORT: u16 = 5701;

struct ClusterMember {
    node: Arc<GridNode>,
    partitions: Arc<PartitionManager>,
}

pub struct LocalCluster {
    config: GridConfig,
    network: Arc<InMemoryNetwork>,
    members: DashMap<MemberId, ClusterMember>,
    next_port: AtomicU16,
}

impl LocalCluster {
    pub fn start(config: GridConfig, size: usize) -> Self {
        let cluster = Self {
            config,
            network: InMemoryNetwork::new(),
            members: DashMap::new(),
            next_port: AtomicU16::new(BASE_PORT),
        };

        let replicas: Vec<PartitionReplica> = (0..size).map(|_| cluster.next_replica()).collect();
        for replica in &replicas {
            cluster.spawn_member(replica.clone(), replicas.clone());
        }
        tracing::info!("Local cluster started with {} members", size);
        cluster
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    /// Members sorted by id.
    pub fn members(&self) -> Vec<PartitionReplica> {
        let mut members: Vec<PartitionReplica> = self
            .members
            .iter()
            .map(|entry| entry.value().node.local().clone())
            .collect();
        members.sort_by(|a, b| a.member.cmp(&b.member));
        members
    }

    pub fn node(&self, member: &MemberId) -> Option<Arc<GridNode>> {
        self.members.get(member).map(|entry| entry.node.clone())
    }

    pub fn nodes(&self) -> Vec<Arc<GridNode>> {
        self.members()
            .iter()
            .filter_map(|replica| self.node(&replica.member))
            .collect()
    }

    pub fn replica(&self, partition_id: u32, replica_index: usize) -> Option<PartitionReplica> {
        self.members
            .iter()
            .next()
            .and_then(|entry| entry.partitions.replica(partition_id, replica_index))
    }

    pub fn partition_id(&self, key_data: &str) -> u32 {
        partition_for(key_data, self.config.partition_count)
    }

    /// Pins the replica list of one partition on every member.
    pub fn assign_partition(&self, partition_id: u32, replicas: Vec<PartitionReplica>) {
        for entry in self.members.iter() {
            entry.partitions.assign(partition_id, replicas.clone());
        }
    }

    /// Joins a fresh member; it adopts the replica lists the others hold.
    pub fn add_member(&self) -> Arc<GridNode> {
        let replica = self.next_replica();
        let mut members = self.members();
        members.push(replica.clone());

        for entry in self.members.iter() {
            entry.partitions.member_added(replica.clone());
        }
        let template = self
            .members
            .iter()
            .next()
            .map(|entry| entry.partitions.clone());

        let (node, partitions) = self.spawn_member(replica, members);
        if let Some(template) = template {
            for partition_id in 0..self.config.partition_count {
                partitions.assign(partition_id, template.owners(partition_id));
            }
        }
        node
    }

    /// Crashes a member: it stops receiving, the partition tables drop it,
    /// then every surviving registry is told.
    pub fn remove_member(&self, member: &MemberId) -> bool {
        let Some((_, removed)) = self.members.remove(member) else {
            return false;
        };
        self.network.detach(removed.node.local().address);

        for entry in self.members.iter() {
            entry.partitions.member_removed(member);
        }
        for entry in self.members.iter() {
            entry.node.on_member_removed(member);
        }
        true
    }

    pub fn isolate(&self, member: &MemberId) {
        if let Some(node) = self.node(member) {
            self.network.isolate(node.local().address);
        }
    }

    pub fn heal(&self, member: &MemberId) {
        if let Some(node) = self.node(member) {
            self.network.heal(node.local().address);
        }
    }

    pub fn set_delay(&self, member: &MemberId, delay: Duration) {
        if let Some(node) = self.node(member) {
            self.network.set_delay(node.local().address, delay);
        }
    }

    /// Finds a key whose partition is owned by `member`.
    pub fn generate_key_owned_by(&self, member: &MemberId) -> Option<String> {
        (0..100_000).map(|i| format!("key-{}", i)).find(|key| {
            serialize_key(key)
                .map(|data| self.partition_id(&data))
                .ok()
                .and_then(|partition| self.replica(partition, 0))
                .is_some_and(|owner| &owner.member == member)
        })
    }

    /// Partition a proxy routes `key` to.
    pub fn partition_of<K: Serialize + ?Sized>(&self, key: &K) -> Option<u32> {
        serialize_key(key).ok().map(|data| self.partition_id(&data))
    }

    fn next_replica(&self) -> PartitionReplica {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        PartitionReplica::from_address(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    fn spawn_member(
        &self,
        replica: PartitionReplica,
        members: Vec<PartitionReplica>,
    ) -> (Arc<GridNode>, Arc<PartitionManager>) {
        let partitions = PartitionManager::new(
            self.config.partition_count,
            self.config.backup_count,
            members,
        );
        let node = GridNode::new(
            self.config.clone(),
            replica.clone(),
            partitions.clone(),
            self.network.transport(),
        );
        self.network.attach(replica.address, node.dispatcher());
        self.members.insert(
            replica.member.clone(),
            ClusterMember {
                node: node.clone(),
                partitions: partitions.clone(),
            },
        );
        (node, partitions)
    }
}
