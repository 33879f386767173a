use super::types::{MapOperation, Record};
use crate::error::GridResult;
use crate::invocation::types::{BackupOperation, OperationResult};

use dashmap::DashMap;

/// `(namespace, serialized key)`
type EntryKey = (String, String);

/// Partition-sharded record storage. The same store serves as primary copy
/// for owned partitions and as mirror for backed-up ones.
pub struct RecordStore {
    local_data: DashMap<u32, DashMap<EntryKey, Record>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            local_data: DashMap::new(),
        }
    }

    /// Runs a primary operation and returns its result plus the backups it
    /// produced.
    pub fn execute(
        &self,
        partition: u32,
        namespace: &str,
        op: &MapOperation,
        now: u64,
    ) -> (GridResult<OperationResult>, Vec<BackupOperation>) {
        match op {
            MapOperation::Put {
                key,
                value_json,
                ttl_ms,
            } => {
                let record = Record {
                    value_json: value_json.clone(),
                    expires_at: ttl_ms.map(|ttl| now.saturating_add(ttl)),
                };
                let previous = self.store_local(partition, namespace, key, record.clone());
                let previous = previous
                    .filter(|previous| !previous.is_expired(now))
                    .map(|previous| previous.value_json);
                (
                    Ok(OperationResult::Data(previous)),
                    vec![BackupOperation::PutRecord {
                        key: key.clone(),
                        record,
                    }],
                )
            }
            MapOperation::Get { key } => {
                let value = self
                    .get_local(partition, namespace, key, now)
                    .map(|record| record.value_json);
                (Ok(OperationResult::Data(value)), Vec::new())
            }
            MapOperation::Remove { key } => match self.remove_local(partition, namespace, key) {
                Some(previous) => {
                    let value = (!previous.is_expired(now)).then_some(previous.value_json);
                    (
                        Ok(OperationResult::Data(value)),
                        vec![BackupOperation::RemoveRecord { key: key.clone() }],
                    )
                }
                None => (Ok(OperationResult::Data(None)), Vec::new()),
            },
            MapOperation::SetExpiryPolicy { keys, ttl_ms } => {
                let expires_at = ttl_ms.map(|ttl| now.saturating_add(ttl));
                let updated = self.set_expiry(partition, namespace, keys, expires_at, now);
                let backups = if updated.is_empty() {
                    Vec::new()
                } else {
                    vec![BackupOperation::SetExpiryPolicy {
                        keys: updated.clone(),
                        expires_at,
                    }]
                };
                (Ok(OperationResult::Bool(!updated.is_empty())), backups)
            }
        }
    }

    /// Replays a backup produced by the partition owner.
    pub fn apply_backup(&self, partition: u32, namespace: &str, op: &BackupOperation) {
        match op {
            BackupOperation::PutRecord { key, record } => {
                self.store_local(partition, namespace, key, record.clone());
            }
            BackupOperation::RemoveRecord { key } => {
                self.remove_local(partition, namespace, key);
            }
            BackupOperation::SetExpiryPolicy { keys, expires_at } => {
                if let Some(partition_map) = self.local_data.get(&partition) {
                    for key in keys {
                        if let Some(mut record) =
                            partition_map.get_mut(&(namespace.to_string(), key.clone()))
                        {
                            record.expires_at = *expires_at;
                        }
                    }
                }
            }
            BackupOperation::LockState { .. } => {
                tracing::warn!("Record store ignoring {} backup", op.name());
            }
        }
    }

    pub fn store_local(
        &self,
        partition: u32,
        namespace: &str,
        key: &str,
        record: Record,
    ) -> Option<Record> {
        let partition_map = self.local_data.entry(partition).or_default();
        partition_map.insert((namespace.to_string(), key.to_string()), record)
    }

    pub fn get_local(
        &self,
        partition: u32,
        namespace: &str,
        key: &str,
        now: u64,
    ) -> Option<Record> {
        if let Some(partition_map) = self.local_data.get(&partition)
            && let Some(record) = partition_map.get(&(namespace.to_string(), key.to_string()))
            && !record.is_expired(now)
        {
            return Some(record.clone());
        }
        None
    }

    pub fn remove_local(&self, partition: u32, namespace: &str, key: &str) -> Option<Record> {
        self.local_data.get(&partition).and_then(|partition_map| {
            partition_map
                .remove(&(namespace.to_string(), key.to_string()))
                .map(|(_, record)| record)
        })
    }

    /// Returns the keys whose expiry was reset.
    fn set_expiry(
        &self,
        partition: u32,
        namespace: &str,
        keys: &[String],
        expires_at: Option<u64>,
        now: u64,
    ) -> Vec<String> {
        let Some(partition_map) = self.local_data.get(&partition) else {
            return Vec::new();
        };

        let mut updated = Vec::new();
        for key in keys {
            if let Some(mut record) = partition_map.get_mut(&(namespace.to_string(), key.clone()))
                && !record.is_expired(now)
            {
                record.expires_at = expires_at;
                updated.push(key.clone());
            }
        }
        updated
    }

    pub fn local_partition_count(&self) -> usize {
        self.local_data
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .count()
    }

    /// Live entries across every partition held here, owned or backed up.
    pub fn local_entry_count(&self, now: u64) -> usize {
        self.local_data
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|record| !record.value().is_expired(now))
                    .count()
            })
            .sum()
    }
}
