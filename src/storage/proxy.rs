use super::types::MapOperation;
use crate::error::GridResult;
use crate::invocation::invocation::InvocationFuture;
use crate::invocation::types::{
    InvocationPolicy, InvocationTarget, Operation, OperationBody, OperationResult, millis_of,
    serialize_key,
};
use crate::node::GridNode;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Typed handle on a named distributed map.
///
/// Every call becomes one invocation against the key's partition owner;
/// writes complete only after the owner's backups acknowledged them.
pub struct MapProxy<V> {
    name: String,
    node: Arc<GridNode>,
    policy: InvocationPolicy,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for MapProxy<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            node: self.node.clone(),
            policy: self.policy.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> MapProxy<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(node: Arc<GridNode>, name: impl Into<String>) -> Self {
        let policy = node.policy();
        Self {
            name: name.into(),
            node,
            policy,
            _value: PhantomData,
        }
    }

    pub fn with_policy(mut self, policy: InvocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores `value` and returns the previous one.
    pub async fn put<K: Serialize + ?Sized>(&self, key: &K, value: &V) -> GridResult<Option<V>> {
        self.put_with_ttl(key, value, None).await
    }

    pub async fn put_with_ttl<K: Serialize + ?Sized>(
        &self,
        key: &K,
        value: &V,
        ttl: Option<Duration>,
    ) -> GridResult<Option<V>> {
        let key = serialize_key(key)?;
        let value_json = serde_json::to_string(value)?;
        let op = MapOperation::Put {
            key: key.clone(),
            value_json,
            ttl_ms: ttl.map(millis_of),
        };
        let result = self.invoke(&key, op).await?;
        decode(result)
    }

    pub async fn get<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<Option<V>> {
        let key = serialize_key(key)?;
        let result = self.invoke(&key, MapOperation::Get { key: key.clone() }).await?;
        decode(result)
    }

    pub async fn remove<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<Option<V>> {
        let key = serialize_key(key)?;
        let result = self
            .invoke(&key, MapOperation::Remove { key: key.clone() })
            .await?;
        decode(result)
    }

    /// Resets the expiry of existing entries; `None` makes them permanent.
    ///
    /// Keys are grouped by partition and each group runs as its own
    /// invocation. Returns true if any entry was updated.
    pub async fn set_expiry_policy<K: Serialize>(
        &self,
        keys: &[K],
        ttl: Option<Duration>,
    ) -> GridResult<bool> {
        let mut by_partition: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for key in keys {
            let key = serialize_key(key)?;
            by_partition
                .entry(self.node.partition_id(&key))
                .or_default()
                .push(key);
        }

        let ttl_ms = ttl.map(millis_of);
        let futures: Vec<InvocationFuture> = by_partition
            .into_iter()
            .map(|(partition_id, keys)| {
                self.start(partition_id, MapOperation::SetExpiryPolicy { keys, ttl_ms })
            })
            .collect();

        let mut updated = false;
        for future in futures {
            updated |= future.await?.into_bool()?;
        }
        Ok(updated)
    }

    async fn invoke(&self, key: &str, op: MapOperation) -> GridResult<OperationResult> {
        self.start(self.node.partition_id(key), op).await
    }

    fn start(&self, partition_id: u32, op: MapOperation) -> InvocationFuture {
        let op = Operation::new(partition_id, self.name.clone(), OperationBody::Map(op));
        let target = InvocationTarget::of(&op);
        self.node.invoke_with(op, target, self.policy.clone())
    }
}

fn decode<V: DeserializeOwned>(result: OperationResult) -> GridResult<Option<V>> {
    match result.into_data()? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}
