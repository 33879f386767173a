//! Dispatch Module Tests
//!
//! ## Test Scopes
//! - **Protocol**: packet framing and rejection of garbage.
//! - **Owner validation**: members that disagree about ownership answer `WrongTarget`
//!   until their tables converge.
//! - **Transport faults**: packets that never leave the member are retried at once.
//! - **Stats**: the counters a member reports about itself.

#[cfg(test)]
mod tests {
    use crate::cluster::partition::PartitionManager;
    use crate::cluster::types::PartitionReplica;
    use crate::config::GridConfig;
    use crate::dispatch::memory::InMemoryNetwork;
    use crate::dispatch::protocol::{self, Packet};
    use crate::embedded::LocalCluster;
    use crate::error::GridError;
    use crate::invocation::types::{Operation, OperationBody, OperationResult};
    use crate::node::GridNode;
    use crate::storage::types::MapOperation;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn replica(port: u16) -> PartitionReplica {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        PartitionReplica::from_address(addr)
    }

    fn config(try_count: u32, try_pause_ms: u64) -> GridConfig {
        let mut config = GridConfig::default();
        config.partition_count = 4;
        config.backup_count = 0;
        config.invocation.try_count = try_count;
        config.invocation.try_pause_ms = try_pause_ms;
        config.invocation.call_timeout_ms = 5_000;
        config
    }

    fn get_op() -> Operation {
        Operation::new(
            0,
            "m",
            OperationBody::Map(MapOperation::Get {
                key: "\"k\"".into(),
            }),
        )
    }

    /// Two members wired by hand, each with its own table.
    fn pair(
        config: GridConfig,
    ) -> (
        Arc<InMemoryNetwork>,
        (Arc<GridNode>, Arc<PartitionManager>),
        (Arc<GridNode>, Arc<PartitionManager>),
    ) {
        let network = InMemoryNetwork::new();
        let members = vec![replica(6001), replica(6002)];
        let mut built = Vec::new();
        for local in &members {
            let table = PartitionManager::new(config.partition_count, 0, members.clone());
            let node = GridNode::new(
                config.clone(),
                local.clone(),
                table.clone(),
                network.transport(),
            );
            network.attach(local.address, node.dispatcher());
            built.push((node, table));
        }
        let second = built.remove(1);
        let first = built.remove(0);
        (network, first, second)
    }

    // ============================================================
    // PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_packet_framing() {
        let packet = Packet::Operation {
            caller: "127.0.0.1:6001".parse().unwrap(),
            op: get_op(),
        };

        let bytes = protocol::encode(&packet).unwrap();
        let decoded = protocol::decode(&bytes).unwrap();

        assert_eq!(decoded.kind(), "operation");
        assert!(protocol::decode(&[0xff, 0xff, 0xff]).is_err());
    }

    #[tokio::test]
    async fn test_garbage_packet_rejected() {
        let cluster = LocalCluster::start(GridConfig::default(), 1);
        let node = cluster.nodes().remove(0);

        let result = node.dispatcher().handle_packet(b"not a packet").await;

        assert!(matches!(result, Err(GridError::Serialization { .. })));
    }

    // ============================================================
    // OWNER VALIDATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_wrong_target_retried_until_tables_agree() {
        let (_network, (node_a, table_a), (node_b, table_b)) = pair(config(20, 50));
        let (a, b) = (node_a.local().clone(), node_b.local().clone());

        // ARRANGE: A routes partition 0 to B, B still thinks A owns it
        table_a.assign(0, vec![b.clone()]);
        table_b.assign(0, vec![a]);
        let fix = table_b.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            fix.assign(0, vec![b]);
        });

        // ACT
        let result = node_a.invoke(get_op()).await;

        // ASSERT
        assert_eq!(result, Ok(OperationResult::Data(None)));
    }

    #[tokio::test]
    async fn test_wrong_target_surfaces_after_try_count() {
        let (_network, (node_a, table_a), (node_b, table_b)) = pair(config(3, 10));
        let (a, b) = (node_a.local().clone(), node_b.local().clone());
        table_a.assign(0, vec![b.clone()]);
        table_b.assign(0, vec![a]);

        let result = node_a.invoke(get_op()).await;

        assert_eq!(
            result,
            Err(GridError::WrongTarget {
                member: b.member,
                partition_id: 0
            })
        );
    }

    // ============================================================
    // TRANSPORT FAULT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unreachable_target_retried_without_pause() {
        let (network, (node_a, table_a), (node_b, _)) = pair(config(3, 1_000));
        table_a.assign(0, vec![node_b.local().clone()]);
        network.detach(node_b.local().address);

        let started = Instant::now();
        let result = node_a.invoke(get_op()).await;

        assert!(
            matches!(result, Err(GridError::TargetDisconnected { .. })),
            "Got {:?}",
            result
        );
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "Local retries must not pause"
        );
        assert!(node_a.registry().is_empty());
    }

    // ============================================================
    // STATS TESTS
    // ============================================================

    #[tokio::test]
    async fn test_local_stats_count_locks_and_records() {
        let mut config = GridConfig::default();
        config.partition_count = 11;
        let cluster = LocalCluster::start(config, 1);
        let node = cluster.nodes().remove(0);

        node.lock_proxy("locks").lock("a").await.unwrap();
        node.map_proxy::<u32>("m").put("b", &1).await.unwrap();

        let stats = node.local_stats();
        assert_eq!(stats.member, node.local().member);
        assert_eq!(stats.locked_keys, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.pending_invocations, 0);
    }
}
