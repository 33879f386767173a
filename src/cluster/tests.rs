//! Cluster Module Tests
//!
//! ## Test Scopes
//! - **Identities**: uniqueness and determinism of member ids.
//! - **Placement**: deterministic hashing and initial replica assignment.
//! - **Membership changes**: backup promotion and refill on member removal.

#[cfg(test)]
mod tests {
    use crate::cluster::partition::{PartitionManager, PartitionTable, partition_for};
    use crate::cluster::types::{MemberId, PartitionReplica};
    use std::net::SocketAddr;

    fn replica(port: u16) -> PartitionReplica {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        PartitionReplica::from_address(addr)
    }

    // ============================================================
    // MEMBER ID TESTS
    // ============================================================

    #[test]
    fn test_member_id_is_unique() {
        let id1 = MemberId::new();
        let id2 = MemberId::new();

        assert_ne!(id1, id2, "Each random MemberId should be unique");
    }

    #[test]
    fn test_member_id_from_address_is_stable() {
        let addr: SocketAddr = "10.0.0.7:5701".parse().unwrap();

        assert_eq!(MemberId::from_address(addr), MemberId::from_address(addr));
        assert_ne!(
            MemberId::from_address(addr),
            MemberId::from_address("10.0.0.7:5702".parse().unwrap())
        );
    }

    // ============================================================
    // PLACEMENT TESTS
    // ============================================================

    #[test]
    fn test_partition_is_deterministic_and_in_range() {
        for i in 0..1000 {
            let key = format!("key_{}", i);
            let p1 = partition_for(&key, 271);
            let p2 = partition_for(&key, 271);
            assert_eq!(p1, p2);
            assert!(p1 < 271);
        }
    }

    #[test]
    fn test_partition_distribution() {
        let mut used = std::collections::HashSet::new();
        for i in 0..10_000 {
            used.insert(partition_for(&format!("key_{}", i), 271));
        }

        assert!(used.len() > 200, "Only {} partitions used", used.len());
    }

    #[test]
    fn test_single_member_owns_everything() {
        let manager = PartitionManager::new(16, 1, vec![replica(5701)]);

        for partition in 0..16 {
            let owners = manager.owners(partition);
            assert_eq!(owners.len(), 1, "Replica count is capped by member count");
        }
        assert_eq!(manager.primary_partitions(&replica(5701).member).len(), 16);
        assert!(manager.replica(0, 1).is_none());
    }

    #[test]
    fn test_owner_and_backup_are_distinct() {
        let manager = PartitionManager::new(32, 2, vec![replica(1), replica(2), replica(3)]);

        for partition in 0..32 {
            let owners = manager.owners(partition);
            assert_eq!(owners.len(), 3);
            assert_ne!(owners[0].member, owners[1].member);
            assert_ne!(owners[1].member, owners[2].member);
            assert_ne!(owners[0].member, owners[2].member);
        }
    }

    #[test]
    fn test_every_member_owns_some_partitions() {
        let members = vec![replica(1), replica(2), replica(3)];
        let manager = PartitionManager::new(30, 1, members.clone());

        for member in &members {
            assert_eq!(manager.primary_partitions(&member.member).len(), 10);
            assert_eq!(manager.backup_partitions(&member.member).len(), 10);
        }
    }

    // ============================================================
    // MEMBERSHIP CHANGE TESTS
    // ============================================================

    #[test]
    fn test_member_removed_promotes_backup() {
        let manager = PartitionManager::new(16, 1, vec![replica(1), replica(2), replica(3)]);
        let before: Vec<Vec<PartitionReplica>> = (0..16).map(|p| manager.owners(p)).collect();
        let leaving = before[0][0].member.clone();

        assert!(manager.member_removed(&leaving));

        for (partition, old) in before.iter().enumerate() {
            let now = manager.owners(partition as u32);
            assert_eq!(now.len(), 2);
            assert!(now.iter().all(|r| r.member != leaving));
            if old[0].member == leaving {
                assert_eq!(now[0], old[1], "First backup must become owner");
            } else {
                assert_eq!(now[0], old[0], "Unaffected owners stay put");
            }
        }
        assert!(manager.member(&leaving).is_none());
    }

    #[test]
    fn test_member_removed_unknown_is_noop() {
        let manager = PartitionManager::new(4, 1, vec![replica(1)]);

        assert!(!manager.member_removed(&MemberId::new()));
        assert_eq!(manager.owners(0).len(), 1);
    }

    #[test]
    fn test_last_member_removed_leaves_no_target() {
        let only = replica(1);
        let manager = PartitionManager::new(4, 1, vec![only.clone()]);

        manager.member_removed(&only.member);

        assert!(manager.replica(0, 0).is_none());
    }

    #[test]
    fn test_member_added_fills_missing_backups() {
        let manager = PartitionManager::new(8, 1, vec![replica(1)]);
        assert!(manager.replica(3, 1).is_none());

        manager.member_added(replica(2));

        for partition in 0..8 {
            assert_eq!(manager.owners(partition).len(), 2);
            assert_eq!(manager.replica(partition, 0), Some(replica(1)));
        }
    }

    #[test]
    fn test_assign_overrides_replicas() {
        let manager = PartitionManager::new(4, 1, vec![replica(1), replica(2)]);

        manager.assign(2, vec![replica(2), replica(1)]);

        assert_eq!(manager.replica(2, 0), Some(replica(2)));
        assert_eq!(manager.replica(2, 1), Some(replica(1)));
    }
}
