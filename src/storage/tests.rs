//! Storage Module Tests
//!
//! ## Test Scopes
//! - **RecordStore**: local put/get/remove, expiry and backup replay.
//! - **MapProxy**: typed access through invocations, replication to backups and expiry
//!   policies spanning several partitions.

#[cfg(test)]
mod tests {
    use crate::config::GridConfig;
    use crate::embedded::LocalCluster;
    use crate::error::GridError;
    use crate::invocation::types::{BackupOperation, OperationResult, now_ms, serialize_key};
    use crate::storage::record_store::RecordStore;
    use crate::storage::types::{MapOperation, Record};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestBook {
        id: String,
        title: String,
        author: String,
    }

    fn book(id: &str) -> TestBook {
        TestBook {
            id: id.to_string(),
            title: format!("Title {}", id),
            author: "Author".to_string(),
        }
    }

    fn config() -> GridConfig {
        let mut config = GridConfig::default();
        config.partition_count = 11;
        config.invocation.try_pause_ms = 50;
        config.invocation.call_timeout_ms = 5_000;
        config.invocation.backup_timeout_ms = 1_000;
        config
    }

    // ============================================================
    // RECORD STORE TESTS
    // ============================================================

    #[test]
    fn test_put_returns_previous_and_emits_backup() {
        let store = RecordStore::new();
        let put = |value: &str| MapOperation::Put {
            key: "\"k\"".into(),
            value_json: value.into(),
            ttl_ms: None,
        };

        let (first, backups) = store.execute(1, "books", &put("1"), 0);
        assert_eq!(first, Ok(OperationResult::Data(None)));
        assert_eq!(backups.len(), 1);

        let (second, _) = store.execute(1, "books", &put("2"), 0);
        assert_eq!(second, Ok(OperationResult::Data(Some("1".into()))));
        assert_eq!(store.local_entry_count(0), 1);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let store = RecordStore::new();
        let record = Record {
            value_json: "1".into(),
            expires_at: None,
        };

        store.store_local(1, "a", "k", record);

        assert!(store.get_local(1, "a", "k", 0).is_some());
        assert!(store.get_local(1, "b", "k", 0).is_none());
        assert!(store.get_local(2, "a", "k", 0).is_none());
    }

    #[test]
    fn test_expired_records_are_invisible() {
        let store = RecordStore::new();
        let put = MapOperation::Put {
            key: "k".into(),
            value_json: "1".into(),
            ttl_ms: Some(100),
        };
        store.execute(1, "m", &put, 0);

        assert!(store.get_local(1, "m", "k", 99).is_some());
        assert!(store.get_local(1, "m", "k", 100).is_none());
        assert_eq!(store.local_entry_count(100), 0);

        let remove = MapOperation::Remove { key: "k".into() };
        let (removed, backups) = store.execute(1, "m", &remove, 200);
        assert_eq!(removed, Ok(OperationResult::Data(None)));
        assert_eq!(backups.len(), 1, "The stale entry is still removed on backups");
    }

    #[test]
    fn test_maximal_ttl_saturates() {
        let store = RecordStore::new();
        let put = MapOperation::Put {
            key: "k".into(),
            value_json: "1".into(),
            ttl_ms: Some(u64::MAX),
        };
        let expire = MapOperation::SetExpiryPolicy {
            keys: vec!["k".into()],
            ttl_ms: Some(u64::MAX),
        };

        store.execute(1, "m", &put, 5_000);
        assert!(store.get_local(1, "m", "k", u64::MAX - 1).is_some());

        let (result, _) = store.execute(1, "m", &expire, 5_000);
        assert_eq!(result, Ok(OperationResult::Bool(true)));
        let record = store.get_local(1, "m", "k", 5_000).unwrap();
        assert_eq!(record.expires_at, Some(u64::MAX));
    }

    #[test]
    fn test_set_expiry_policy_only_touches_live_keys() {
        let store = RecordStore::new();
        store.execute(
            1,
            "m",
            &MapOperation::Put {
                key: "a".into(),
                value_json: "1".into(),
                ttl_ms: None,
            },
            0,
        );

        let op = MapOperation::SetExpiryPolicy {
            keys: vec!["a".into(), "missing".into()],
            ttl_ms: Some(50),
        };
        let (result, backups) = store.execute(1, "m", &op, 0);

        assert_eq!(result, Ok(OperationResult::Bool(true)));
        assert_eq!(
            backups,
            vec![BackupOperation::SetExpiryPolicy {
                keys: vec!["a".into()],
                expires_at: Some(50),
            }]
        );
        assert!(store.get_local(1, "m", "a", 50).is_none());
    }

    #[test]
    fn test_apply_backup_replays_owner_effects() {
        let store = RecordStore::new();
        let record = Record {
            value_json: "\"v\"".into(),
            expires_at: None,
        };

        store.apply_backup(
            3,
            "m",
            &BackupOperation::PutRecord {
                key: "k".into(),
                record: record.clone(),
            },
        );
        assert_eq!(store.get_local(3, "m", "k", 0), Some(record));

        store.apply_backup(
            3,
            "m",
            &BackupOperation::SetExpiryPolicy {
                keys: vec!["k".into()],
                expires_at: Some(10),
            },
        );
        assert!(store.get_local(3, "m", "k", 10).is_none());

        store.apply_backup(3, "m", &BackupOperation::RemoveRecord { key: "k".into() });
        assert!(store.remove_local(3, "m", "k").is_none());
        assert_eq!(store.local_partition_count(), 0);
    }

    // ============================================================
    // MAP PROXY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_put_get_remove() {
        let cluster = LocalCluster::start(config(), 3);
        let nodes = cluster.nodes();
        let writer = nodes[0].map_proxy::<TestBook>("books");
        let reader = nodes[2].map_proxy::<TestBook>("books");

        assert_eq!(writer.put("book_1", &book("1")).await, Ok(None));
        assert_eq!(writer.put("book_1", &book("2")).await, Ok(Some(book("1"))));
        assert_eq!(reader.get("book_1").await, Ok(Some(book("2"))));

        assert_eq!(reader.remove("book_1").await, Ok(Some(book("2"))));
        assert_eq!(writer.get("book_1").await, Ok(None));
    }

    #[tokio::test]
    async fn test_write_is_on_backup_when_put_returns() {
        let cluster = LocalCluster::start(config(), 3);
        let map = cluster.nodes()[1].map_proxy::<TestBook>("books");

        map.put("book_7", &book("7")).await.unwrap();

        let key = serialize_key("book_7").unwrap();
        let partition = cluster.partition_of("book_7").unwrap();
        let backup = cluster.replica(partition, 1).unwrap();
        let stored = cluster
            .node(&backup.member)
            .unwrap()
            .dispatcher()
            .records()
            .get_local(partition, "books", &key, now_ms());
        assert!(stored.is_some(), "Put completes only after the backup applied it");
    }

    #[tokio::test]
    async fn test_put_with_ttl_expires() {
        let cluster = LocalCluster::start(config(), 2);
        let map = cluster.nodes()[0].map_proxy::<String>("session");

        map.put_with_ttl("token", &"abc".to_string(), Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(map.get("token").await, Ok(Some("abc".to_string())));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(map.get("token").await, Ok(None));
    }

    #[tokio::test]
    async fn test_put_with_maximal_ttl_is_kept() {
        let cluster = LocalCluster::start(config(), 2);
        let map = cluster.nodes()[0].map_proxy::<String>("session");

        map.put_with_ttl("token", &"abc".to_string(), Some(Duration::MAX))
            .await
            .unwrap();

        assert_eq!(map.get("token").await, Ok(Some("abc".to_string())));
        assert_eq!(
            map.set_expiry_policy(&["token"], Some(Duration::MAX)).await,
            Ok(true)
        );
        assert_eq!(map.get("token").await, Ok(Some("abc".to_string())));
    }

    #[tokio::test]
    async fn test_set_expiry_policy_across_partitions() {
        let cluster = LocalCluster::start(config(), 3);
        let map = cluster.nodes()[0].map_proxy::<u32>("counters");
        let keys: Vec<String> = (0..20).map(|i| format!("counter_{}", i)).collect();
        for (i, key) in keys.iter().enumerate() {
            map.put(key, &(i as u32)).await.unwrap();
        }

        let updated = map
            .set_expiry_policy(&keys, Some(Duration::from_millis(200)))
            .await;
        assert_eq!(updated, Ok(true));

        tokio::time::sleep(Duration::from_millis(300)).await;
        for key in &keys {
            assert_eq!(map.get(key).await, Ok(None));
        }
        assert_eq!(map.set_expiry_policy(&keys, None).await, Ok(false));
    }

    #[tokio::test]
    async fn test_null_key_rejected() {
        let cluster = LocalCluster::start(config(), 1);
        let map = cluster.nodes()[0].map_proxy::<String>("m");
        let null: Option<u32> = None;

        assert!(matches!(
            map.put(&null, &"v".to_string()).await,
            Err(GridError::InvalidArgument { .. })
        ));
        assert!(matches!(map.get(&null).await, Err(GridError::InvalidArgument { .. })));
        assert!(matches!(
            map.set_expiry_policy(&[null], None).await,
            Err(GridError::InvalidArgument { .. })
        ));
    }
}
