use super::types::{LockOperation, LockOwner};
use crate::error::{GridError, GridResult};
use crate::invocation::types::{
    InvocationPolicy, InvocationTarget, Operation, OperationBody, OperationResult, WaitBudget,
    millis_of, serialize_key,
};
use crate::node::GridNode;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Caller-side handle on a named family of distributed locks.
///
/// Every proxy carries its own session, so ownership is per proxy rather than
/// per member. Clones share the session.
#[derive(Clone)]
pub struct LockProxy {
    name: String,
    node: Arc<GridNode>,
    owner: LockOwner,
    policy: InvocationPolicy,
}

impl LockProxy {
    pub fn new(node: Arc<GridNode>, name: impl Into<String>) -> Self {
        let owner = LockOwner::new(node.local().member.clone());
        let policy = node.policy();
        Self {
            name: name.into(),
            node,
            owner,
            policy,
        }
    }

    /// A proxy acting for an externally chosen session on this member.
    pub fn for_session(node: Arc<GridNode>, name: impl Into<String>, session: Uuid) -> Self {
        let mut proxy = Self::new(node, name);
        proxy.owner.session = session;
        proxy
    }

    pub fn with_policy(mut self, policy: InvocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Blocks until the lock is held.
    pub async fn lock<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<()> {
        self.acquire(key, None, WaitBudget::Unbounded).await?;
        Ok(())
    }

    /// Blocks until the lock is held; the hold lapses after `ttl`.
    pub async fn lock_with_ttl<K: Serialize + ?Sized>(
        &self,
        key: &K,
        ttl: Duration,
    ) -> GridResult<()> {
        let lease = lease_millis(ttl)?;
        self.acquire(key, Some(lease), WaitBudget::Unbounded).await?;
        Ok(())
    }

    pub async fn try_lock<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<bool> {
        self.acquire(key, None, WaitBudget::NoWait).await
    }

    /// Waits at most `timeout` for the lock.
    pub async fn try_lock_with_timeout<K: Serialize + ?Sized>(
        &self,
        key: &K,
        timeout: Duration,
    ) -> GridResult<bool> {
        self.acquire(key, None, wait_budget(timeout)).await
    }

    pub async fn try_lock_with_lease<K: Serialize + ?Sized>(
        &self,
        key: &K,
        timeout: Duration,
        lease: Duration,
    ) -> GridResult<bool> {
        let lease = lease_millis(lease)?;
        self.acquire(key, Some(lease), wait_budget(timeout)).await
    }

    pub async fn unlock<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<()> {
        let key = serialize_key(key)?;
        let op = LockOperation::Release {
            key: key.clone(),
            owner: self.owner.clone(),
        };
        self.invoke(&key, op).await?;
        Ok(())
    }

    /// Releases the lock regardless of who holds it.
    pub async fn force_unlock<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<()> {
        let key = serialize_key(key)?;
        self.invoke(&key, LockOperation::ForceRelease { key: key.clone() })
            .await?;
        Ok(())
    }

    pub async fn is_locked<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<bool> {
        let key = serialize_key(key)?;
        let op = LockOperation::IsLocked {
            key: key.clone(),
            owner: None,
        };
        self.invoke(&key, op).await?.into_bool()
    }

    pub async fn is_locked_by_me<K: Serialize + ?Sized>(&self, key: &K) -> GridResult<bool> {
        let key = serialize_key(key)?;
        let op = LockOperation::IsLocked {
            key: key.clone(),
            owner: Some(self.owner.clone()),
        };
        self.invoke(&key, op).await?.into_bool()
    }

    async fn acquire<K: Serialize + ?Sized>(
        &self,
        key: &K,
        lease_ms: Option<u64>,
        wait: WaitBudget,
    ) -> GridResult<bool> {
        let key = serialize_key(key)?;
        let op = LockOperation::Acquire {
            key: key.clone(),
            owner: self.owner.clone(),
            lease_ms,
            wait,
        };
        self.invoke(&key, op).await?.into_bool()
    }

    async fn invoke(&self, key: &str, op: LockOperation) -> GridResult<OperationResult> {
        let partition_id = self.node.partition_id(key);
        let op = Operation::new(partition_id, self.name.clone(), OperationBody::Lock(op));
        let target = InvocationTarget::of(&op);
        self.node
            .invoke_with(op, target, self.policy.clone())
            .await
    }
}

/// A timeout too long to count in millis waits forever.
fn wait_budget(timeout: Duration) -> WaitBudget {
    if timeout.is_zero() {
        return WaitBudget::NoWait;
    }
    match millis_of(timeout) {
        u64::MAX => WaitBudget::Unbounded,
        millis => WaitBudget::Bounded {
            millis: millis.max(1),
        },
    }
}

fn lease_millis(lease: Duration) -> GridResult<u64> {
    if lease.is_zero() {
        return Err(GridError::invalid_argument("lease time must be positive"));
    }
    Ok(millis_of(lease).max(1))
}
