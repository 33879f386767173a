use super::types::{MemberId, PartitionReplica};

use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The contract the invocation core consumes from the membership layer.
///
/// Implementations must reflect the latest known membership on every call;
/// callers never cache what they get back.
pub trait PartitionTable: Send + Sync {
    fn partition_count(&self) -> u32;

    fn replica(&self, partition_id: u32, replica_index: usize) -> Option<PartitionReplica>;

    /// Current address of a member, if it is still part of the cluster.
    fn member(&self, member: &MemberId) -> Option<PartitionReplica>;

    fn partition_id(&self, key: &str) -> u32 {
        partition_for(key, self.partition_count())
    }
}

pub fn partition_for(key: &str, partition_count: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partition_count.max(1))) as u32
}

/// Replica assignment driven by an externally supplied member list.
///
/// Initial placement walks the id-sorted member list starting at
/// `partition % members`. Later membership changes are applied incrementally:
/// a departed member is cut out of each replica list (its backups move up one
/// index) and the tail is refilled from the remaining members.
pub struct PartitionManager {
    pub partition_count: u32,
    replica_count: usize,
    members: DashMap<MemberId, PartitionReplica>,
    replicas: DashMap<u32, Vec<PartitionReplica>>,
}

impl PartitionManager {
    pub fn new(
        partition_count: u32,
        backup_count: usize,
        members: Vec<PartitionReplica>,
    ) -> Arc<Self> {
        let manager = Self {
            partition_count,
            replica_count: backup_count + 1,
            members: DashMap::new(),
            replicas: DashMap::new(),
        };
        for member in members {
            manager.members.insert(member.member.clone(), member);
        }

        let sorted = manager.members();
        for partition in 0..partition_count {
            let mut list = Vec::with_capacity(manager.replica_count);
            manager.fill(partition, &mut list, &sorted);
            manager.replicas.insert(partition, list);
        }

        Arc::new(manager)
    }

    /// Members sorted by id.
    pub fn members(&self) -> Vec<PartitionReplica> {
        let mut members: Vec<PartitionReplica> =
            self.members.iter().map(|entry| entry.value().clone()).collect();
        members.sort_by(|a, b| a.member.cmp(&b.member));
        members
    }

    pub fn backup_count(&self) -> usize {
        self.replica_count - 1
    }

    pub fn owners(&self, partition: u32) -> Vec<PartitionReplica> {
        self.replicas
            .get(&partition)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Overrides the replica list of one partition.
    pub fn assign(&self, partition: u32, replicas: Vec<PartitionReplica>) {
        tracing::debug!(
            "Partition {} assigned to {:?}",
            partition,
            replicas.iter().map(|r| &r.member).collect::<Vec<_>>()
        );
        self.replicas.insert(partition, replicas);
    }

    pub fn member_added(&self, replica: PartitionReplica) {
        if self.members.contains_key(&replica.member) {
            return;
        }
        tracing::info!("Member {} joined at {}", replica.member, replica.address);
        self.members.insert(replica.member.clone(), replica);

        let sorted = self.members();
        for mut entry in self.replicas.iter_mut() {
            let partition = *entry.key();
            self.fill(partition, entry.value_mut(), &sorted);
        }
    }

    /// Drops a member and promotes the backups of every partition it held.
    /// Returns false if the member was unknown.
    pub fn member_removed(&self, member: &MemberId) -> bool {
        if self.members.remove(member).is_none() {
            return false;
        }

        let sorted = self.members();
        let mut promoted = 0;
        for mut entry in self.replicas.iter_mut() {
            let partition = *entry.key();
            let list = entry.value_mut();
            if list.first().is_some_and(|owner| &owner.member == member) {
                promoted += 1;
            }
            list.retain(|replica| &replica.member != member);
            self.fill(partition, list, &sorted);
        }

        tracing::info!(
            "Member {} removed, {} partitions promoted a backup, {} members remain",
            member,
            promoted,
            sorted.len()
        );
        true
    }

    pub fn primary_partitions(&self, member: &MemberId) -> Vec<u32> {
        (0..self.partition_count)
            .filter(|&partition| {
                self.replicas
                    .get(&partition)
                    .is_some_and(|list| list.first().is_some_and(|r| &r.member == member))
            })
            .collect()
    }

    pub fn backup_partitions(&self, member: &MemberId) -> Vec<u32> {
        (0..self.partition_count)
            .filter(|&partition| {
                self.replicas
                    .get(&partition)
                    .is_some_and(|list| list.iter().skip(1).any(|r| &r.member == member))
            })
            .collect()
    }

    fn fill(&self, partition: u32, list: &mut Vec<PartitionReplica>, sorted: &[PartitionReplica]) {
        if sorted.is_empty() {
            return;
        }
        let start = partition as usize % sorted.len();
        for offset in 0..sorted.len() {
            if list.len() >= self.replica_count {
                break;
            }
            let candidate = &sorted[(start + offset) % sorted.len()];
            if !list.iter().any(|r| r.member == candidate.member) {
                list.push(candidate.clone());
            }
        }
    }
}

impl PartitionTable for PartitionManager {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    fn replica(&self, partition_id: u32, replica_index: usize) -> Option<PartitionReplica> {
        self.replicas
            .get(&partition_id)
            .and_then(|list| list.get(replica_index).cloned())
    }

    fn member(&self, member: &MemberId) -> Option<PartitionReplica> {
        self.members.get(member).map(|entry| entry.value().clone())
    }
}
