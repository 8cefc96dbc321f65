//! Replication Module Tests
//!
//! ## Test Scopes
//! - **Requests**: validation of write kinds and key placement.
//! - **Single Node**: the full read/write surface and the operation log.
//! - **Clusters**: owner routing, chain replication, tombstones, background
//!   repair and hand-off, load-driven migration, and a replica restarting
//!   empty.

#[cfg(test)]
mod tests {
    use crate::clock::{SystemClock, wall_nanos};
    use crate::error::StoreError;
    use crate::hash::Position;
    use crate::replication::protocol::{ENDPOINT_DESCRIBE, ENDPOINT_LOAD};
    use crate::replication::{Coordinator, Description, Range, WriteKind, WriteRequest, stored_key};
    use crate::ring::Ring;
    use crate::testutil::{ManualClock, assert_within, fast_config, spread};
    use crate::tree::{Operation, OperationLog, SafeTree, Stamp};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(15);

    async fn started(pos: Option<Position>) -> Arc<Coordinator> {
        let coordinator = Coordinator::new(fast_config(pos)).unwrap();
        coordinator.start().await.unwrap();
        coordinator
    }

    async fn cluster(n: usize) -> Vec<Arc<Coordinator>> {
        let mut nodes: Vec<Arc<Coordinator>> = Vec::new();
        for i in 0..n {
            let node = started(Some(spread(i, n))).await;
            if let Some(first) = nodes.first() {
                node.join(&first.node().addr()).await.unwrap();
            }
            nodes.push(node);
        }
        assert_within!(WINDOW, "converged rings", converged(&nodes));
        nodes
    }

    fn converged(nodes: &[Arc<Coordinator>]) -> bool {
        let hash = nodes[0].node().ring_hash();
        nodes.iter().all(|n| {
            n.node().ring().len() == nodes.len() && n.node().ring_hash() == hash
        })
    }

    async fn stop_all(nodes: &[Arc<Coordinator>]) {
        for node in nodes {
            node.stop().await;
        }
    }

    /// Addresses that should hold `key`: its owner and the next
    /// `redundancy - 1` members.
    fn expected_holders(nodes: &[Arc<Coordinator>], key: &[u8]) -> BTreeSet<String> {
        let ring = Ring::with_nodes(3, nodes.iter().map(|n| n.node().remote()).collect());
        let (_, at, successor) = ring.remotes(&Position::of(key));
        let mut member = at.or(successor).unwrap();
        let mut out = BTreeSet::new();
        for _ in 0..ring.redundancy() {
            out.insert(member.addr.clone());
            member = ring.successor(&member).unwrap();
        }
        out
    }

    fn owner_of<'a>(nodes: &'a [Arc<Coordinator>], key: &[u8]) -> &'a Arc<Coordinator> {
        let ring = Ring::with_nodes(3, nodes.iter().map(|n| n.node().remote()).collect());
        let (_, at, successor) = ring.remotes(&Position::of(key));
        by_addr(nodes, &at.or(successor).unwrap().addr)
    }

    /// A member that should not hold `key` at all.
    fn outsider_for<'a>(nodes: &'a [Arc<Coordinator>], key: &[u8]) -> &'a Arc<Coordinator> {
        let expected = expected_holders(nodes, key);
        nodes
            .iter()
            .find(|n| !expected.contains(&n.node().addr()))
            .unwrap()
    }

    fn holders(nodes: &[Arc<Coordinator>], key: &[u8]) -> BTreeSet<String> {
        nodes
            .iter()
            .filter(|n| n.tree().get(&stored_key(key)).is_some())
            .map(|n| n.node().addr())
            .collect()
    }

    fn by_addr<'a>(nodes: &'a [Arc<Coordinator>], addr: &str) -> &'a Arc<Coordinator> {
        nodes.iter().find(|n| n.node().addr() == addr).unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Operation>>);

    impl OperationLog for Recorder {
        fn record(&self, operation: &Operation) {
            self.0.lock().push(operation.clone());
        }
    }

    // ============================================================
    // REQUEST TESTS
    // ============================================================

    #[test]
    fn test_write_request_validation() {
        assert!(WriteRequest::put(b"k", b"v").validate().is_ok());
        assert!(WriteRequest::del(b"k").validate().is_ok());
        assert!(WriteRequest::sub_put(b"k", b"s", b"v").validate().is_ok());
        assert!(WriteRequest::sub_del(b"k", b"s").validate().is_ok());
        assert!(WriteRequest::sub_clear(b"k").validate().is_ok());

        assert!(WriteRequest::put(b"", b"v").validate().is_err());

        let mut missing_sub_key = WriteRequest::sub_put(b"k", b"s", b"v");
        missing_sub_key.item.sub_key = None;
        assert!(missing_sub_key.validate().is_err());

        let mut put_without_value = WriteRequest::put(b"k", b"v");
        put_without_value.item.exists = false;
        assert!(put_without_value.validate().is_err());

        let mut clear_with_sub_key = WriteRequest::sub_del(b"k", b"s");
        clear_with_sub_key.kind = WriteKind::SubClear;
        assert!(clear_with_sub_key.validate().is_err());
    }

    #[test]
    fn test_stored_key_is_prefixed_by_position() {
        let stored = stored_key(b"apple");
        assert_eq!(&stored[..16], Position::of(b"apple").as_bytes());
        assert_eq!(&stored[16..], b"apple");
        assert_eq!(Position::from_prefix(&stored), Position::of(b"apple"));
    }

    // ============================================================
    // SINGLE NODE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_single_node_put_get_del() {
        let node = started(None).await;

        node.put(b"k", b"v1").await.unwrap();
        let (value, first) = node.get(b"k").await.unwrap().unwrap();
        assert_eq!(value, b"v1");

        node.put(b"k", b"v2").await.unwrap();
        let (value, second) = node.get(b"k").await.unwrap().unwrap();
        assert_eq!(value, b"v2");
        assert!(second > first);
        assert_eq!(node.held(), 1);
        assert_eq!(node.owned(), 1);

        node.del(b"k").await.unwrap();
        assert_eq!(node.get(b"k").await.unwrap(), None);
        let stamp = node.tree().read(|t| t.get_timestamp(&stored_key(b"k"))).unwrap();
        assert_eq!(stamp.value, None);
        assert!(stamp.timestamp > second);
        assert_eq!(node.held(), 0);

        assert_eq!(node.get(b"missing").await.unwrap(), None);
        node.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_write_is_rejected() {
        let node = started(None).await;

        let err = node.put(b"", b"v").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidRequest(_))
        ));
        assert_eq!(node.held(), 0);
        node.stop().await;
    }

    #[tokio::test]
    async fn test_sub_tree_reads() {
        let node = started(None).await;
        for (name, score) in [("alice", "1"), ("bob", "2"), ("carol", "3"), ("dave", "4")] {
            node.sub_put(b"scores", name.as_bytes(), score.as_bytes())
                .await
                .unwrap();
        }
        let keys = |entries: Vec<(Vec<u8>, Vec<u8>, i64)>| -> Vec<String> {
            entries
                .into_iter()
                .map(|(k, _, _)| String::from_utf8(k).unwrap())
                .collect()
        };

        let (score, _) = node.sub_get(b"scores", b"bob").await.unwrap().unwrap();
        assert_eq!(score, b"2");
        assert_eq!(
            keys(node.slice(b"scores", Range::between(b"b", b"d", true, false)).await.unwrap()),
            vec!["bob", "carol"]
        );
        assert_eq!(
            keys(node.reverse_slice(b"scores", Range::all()).await.unwrap()),
            vec!["dave", "carol", "bob", "alice"]
        );
        assert_eq!(
            keys(node.slice_index(b"scores", Some(1), Some(2)).await.unwrap()),
            vec!["bob", "carol"]
        );
        assert_eq!(
            keys(node.reverse_slice_index(b"scores", Some(0), Some(0)).await.unwrap()),
            vec!["dave"]
        );
        assert_eq!(
            keys(node.slice_len(b"scores", Some(b"bob".as_slice()), false, 2).await.unwrap()),
            vec!["carol", "dave"]
        );
        assert_eq!(node.index_of(b"scores", b"carol").await.unwrap(), (2, true));
        assert_eq!(node.index_of(b"scores", b"bz").await.unwrap(), (2, false));
        assert_eq!(node.reverse_index_of(b"scores", b"carol").await.unwrap(), (1, true));
        assert_eq!(node.count(b"scores", Range::all()).await.unwrap(), 4);
        assert_eq!(node.sub_size(b"scores").await.unwrap(), 4);
        assert_eq!(node.first(b"scores").await.unwrap().unwrap().0, b"alice");
        assert_eq!(node.last(b"scores").await.unwrap().unwrap().0, b"dave");
        assert_eq!(node.next(b"scores", b"bob").await.unwrap().unwrap().0, b"carol");
        assert_eq!(node.prev(b"scores", b"bob").await.unwrap().unwrap().0, b"alice");
        assert_eq!(node.first(b"nothing").await.unwrap(), None);

        node.sub_del(b"scores", b"bob").await.unwrap();
        assert_eq!(node.sub_get(b"scores", b"bob").await.unwrap(), None);
        assert_eq!(node.sub_size(b"scores").await.unwrap(), 3);

        node.sub_clear(b"scores").await.unwrap();
        assert_eq!(node.sub_size(b"scores").await.unwrap(), 0);
        assert_eq!(node.first(b"scores").await.unwrap(), None);
        node.stop().await;
    }

    #[tokio::test]
    async fn test_operation_log_replays_to_same_tree() {
        let recorder = Arc::new(Recorder::default());
        let log: Arc<dyn OperationLog> = recorder.clone();
        let node = Coordinator::with_parts(fast_config(None), Arc::new(SystemClock::new()), Some(log))
            .unwrap();
        node.start().await.unwrap();

        node.put(b"a", b"1").await.unwrap();
        node.put(b"b", b"2").await.unwrap();
        node.del(b"a").await.unwrap();
        node.sub_put(b"set", b"x", b"").await.unwrap();
        node.sub_put(b"set", b"y", b"").await.unwrap();
        node.sub_clear(b"set").await.unwrap();

        let operations = recorder.0.lock().clone();
        assert_eq!(operations.len(), 7);
        assert!(!operations[2].put);

        let replayed = SafeTree::new();
        for operation in &operations {
            replayed.apply(operation);
        }
        assert_eq!(replayed.hash(), node.tree().hash());
        node.stop().await;
    }

    #[tokio::test]
    async fn test_deletes_keep_tombstones_under_a_logical_clock() {
        let clock = ManualClock::at(1_000);
        let node = Coordinator::with_parts(fast_config(None), clock.clone(), None).unwrap();
        node.start().await.unwrap();

        node.put(b"k", b"v").await.unwrap();
        node.del(b"k").await.unwrap();

        let stamp = node.tree().read(|t| t.get_timestamp(&stored_key(b"k")));
        assert_eq!(
            stamp,
            Some(Stamp {
                value: None,
                timestamp: 1_002
            })
        );

        // a replica still holding the old value cannot bring it back
        let stale = node
            .tree()
            .write(|t| t.write_if_newer(&stored_key(b"k"), Some(b"v".to_vec()), 1_001));
        assert!(!stale);
        assert_eq!(node.get(b"k").await.unwrap(), None);
        node.stop().await;
    }

    // ============================================================
    // CLUSTER TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_synchronous_write_reaches_exactly_redundancy_nodes() {
        let nodes = cluster(6).await;
        let key = [0u8];

        nodes[0]
            .write(WriteRequest::put(&key, &[0]).synchronous())
            .await
            .unwrap();

        let expected = expected_holders(&nodes, &key);
        assert_eq!(expected.len(), 3);
        assert_eq!(holders(&nodes, &key), expected);

        let stamps: BTreeSet<Option<(Vec<u8>, i64)>> = nodes
            .iter()
            .filter(|n| expected.contains(&n.node().addr()))
            .map(|n| n.tree().get(&stored_key(&key)))
            .collect();
        assert_eq!(stamps.len(), 1, "replicas disagree: {:?}", stamps);

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_and_writes_route_to_owner_from_any_node() {
        let nodes = cluster(4).await;

        for (i, node) in nodes.iter().enumerate() {
            let key = format!("key-{}", i);
            node.write(WriteRequest::put(key.as_bytes(), b"v").synchronous())
                .await
                .unwrap();
        }
        for i in 0..nodes.len() {
            let key = format!("key-{}", i);
            assert_eq!(holders(&nodes, key.as_bytes()), expected_holders(&nodes, key.as_bytes()));
            for node in &nodes {
                let (value, _) = node.get(key.as_bytes()).await.unwrap().unwrap();
                assert_eq!(value, b"v");
            }
        }

        nodes[3]
            .write(WriteRequest::sub_put(b"set", b"m", b"1").synchronous())
            .await
            .unwrap();
        for node in &nodes {
            assert_eq!(node.sub_size(b"set").await.unwrap(), 1);
            assert_eq!(node.first(b"set").await.unwrap().unwrap().0, b"m");
        }

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_replicates_tombstone() {
        let nodes = cluster(4).await;
        let key = b"doomed";

        nodes[1]
            .write(WriteRequest::put(key, b"v").synchronous())
            .await
            .unwrap();
        nodes[2]
            .write(WriteRequest::del(key).synchronous())
            .await
            .unwrap();

        for addr in expected_holders(&nodes, key) {
            let stamp = by_addr(&nodes, &addr)
                .tree()
                .read(|t| t.get_timestamp(&stored_key(key)))
                .unwrap();
            assert_eq!(stamp.value, None, "{} still has a value", addr);
        }
        for node in &nodes {
            assert_eq!(node.get(key).await.unwrap(), None);
        }

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_background_sync_fills_missing_replicas() {
        let nodes = cluster(5).await;
        let key = b"written-behind-the-back";
        let expected = expected_holders(&nodes, key);
        let (_, at, successor) = nodes[0].node().ring().remotes(&Position::of(key));
        let owner = by_addr(&nodes, &at.or(successor).unwrap().addr);

        // bypass replication entirely; only the periodic sync can spread it
        owner.tree().put(&stored_key(key), b"v".to_vec(), 42);

        assert_within!(WINDOW, "replicas repaired", holders(&nodes, key) == expected);
        for addr in &expected {
            assert_eq!(
                by_addr(&nodes, addr).tree().get(&stored_key(key)),
                Some((b"v".to_vec(), 42))
            );
        }

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clean_hands_misplaced_keys_to_owner() {
        let nodes = cluster(5).await;
        let key = b"lost-and-found";
        let expected = expected_holders(&nodes, key);
        let outsider = nodes
            .iter()
            .find(|n| !expected.contains(&n.node().addr()))
            .unwrap();

        outsider.tree().put(&stored_key(key), b"v".to_vec(), 7);

        assert_within!(WINDOW, "key moved to its replicas", holders(&nodes, key) == expected);
        assert_eq!(outsider.tree().read(|t| t.get_timestamp(&stored_key(key))), None);

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clean_hands_off_tombstones_and_sub_trees() {
        let nodes = cluster(5).await;
        let (set, gone) = (b"only-a-set".as_slice(), b"only-a-tombstone".as_slice());

        let set_holder = outsider_for(&nodes, set);
        set_holder
            .tree()
            .sub_put(&stored_key(set), b"member", b"1".to_vec(), 7);
        let stamp = wall_nanos();
        let gone_holder = outsider_for(&nodes, gone);
        gone_holder
            .tree()
            .write(|t| t.fake_del(&stored_key(gone), stamp));
        assert!(set_holder.held() >= 1);

        assert_within!(
            WINDOW,
            "sub-tree moved to its owner",
            set_holder.tree().read(|t| t.sub_tree(&stored_key(set)).is_none())
                && owner_of(&nodes, set).tree().sub_get(&stored_key(set), b"member")
                    == Some((b"1".to_vec(), 7))
        );
        assert_within!(
            WINDOW,
            "tombstone moved to its owner",
            gone_holder.tree().read(|t| t.get_timestamp(&stored_key(gone)).is_none())
                && owner_of(&nodes, gone).tree().read(|t| t.get_timestamp(&stored_key(gone)))
                    == Some(Stamp {
                        value: None,
                        timestamp: stamp
                    })
        );

        stop_all(&nodes).await;
    }

    /// Two members where `a` owns every key but the one at position 1.
    async fn lopsided_pair(migrate: bool) -> (Arc<Coordinator>, Arc<Coordinator>) {
        let mut config = fast_config(Some(Position::ZERO));
        config.migrate = migrate;
        let a = Coordinator::new(config).unwrap();
        a.start().await.unwrap();
        let b = started(Some(Position::from_u128(1))).await;
        b.join(&a.node().addr()).await.unwrap();
        let pair = [a.clone(), b.clone()];
        assert_within!(WINDOW, "converged rings", converged(&pair));
        (a, b)
    }

    fn keys(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("load-{:03}", i).into_bytes()).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_load_and_positions_in_the_owned_arc() {
        let (a, b) = lopsided_pair(false).await;
        for key in keys(40) {
            a.put(&key, b"v").await.unwrap();
        }
        assert_within!(WINDOW, "predecessors known", a.load() == 40 && b.load() == 0);

        let mut positions: Vec<Position> = keys(40).iter().map(|k| Position::of(k)).collect();
        positions.sort();
        assert_eq!(a.position_at(0), Some(positions[0]));
        assert_eq!(a.position_at(39), Some(positions[39]));
        assert_eq!(a.position_at(40), None);
        assert_eq!(b.position_at(0), None);

        let load: usize = b
            .node()
            .switchboard()
            .call(&a.node().addr(), ENDPOINT_LOAD, &())
            .await
            .unwrap();
        assert_eq!(load, 40);

        stop_all(&[a, b]).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overloaded_member_migrates_towards_balance() {
        let (a, b) = lopsided_pair(true).await;
        for key in keys(40) {
            a.put(&key, b"v").await.unwrap();
        }

        assert_within!(WINDOW, "loads evened out", {
            let (mine, theirs) = (a.load(), b.load());
            a.node().position() != Position::ZERO
                && mine + theirs == 40
                && mine <= 2 * theirs
                && theirs <= 2 * mine
        });
        for key in keys(40) {
            assert_eq!(b.get(&key).await.unwrap().map(|(v, _)| v), Some(b"v".to_vec()));
        }

        stop_all(&[a, b]).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_describe_over_rpc() {
        let nodes = cluster(3).await;
        nodes[0].put(b"k", b"v").await.unwrap();
        assert_within!(WINDOW, "replicated", holders(&nodes, b"k").len() == 3);

        let description: Description = nodes[1]
            .node()
            .switchboard()
            .call(&nodes[2].node().addr(), ENDPOINT_DESCRIBE, &())
            .await
            .unwrap();

        assert_eq!(description.remote, nodes[2].node().remote());
        assert_eq!(description.ring.len(), 3);
        assert_eq!(description.redundancy, 3);
        assert_eq!(description.held, 1);
        assert_eq!(description.tree_hash, nodes[2].tree().hash());

        let owned: usize = nodes.iter().map(|n| n.owned()).sum();
        assert_eq!(owned, 1);

        stop_all(&nodes).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_restarted_replica_is_repopulated() {
        let nodes = cluster(6).await;
        let key = [0u8];
        nodes[0].put(&key, &[0]).await.unwrap();

        let expected = expected_holders(&nodes, &key);
        assert_within!(WINDOW, "initial replication", holders(&nodes, &key) == expected);
        let (_, at, successor) = nodes[0].node().ring().remotes(&Position::of(&key));
        let owner_addr = at.or(successor).unwrap().addr;
        let original: Stamp = by_addr(&nodes, &owner_addr)
            .tree()
            .read(|t| t.get_timestamp(&stored_key(&key)))
            .unwrap();

        // kill a replica that is not the owner
        let victim_addr = expected.iter().find(|a| **a != owner_addr).unwrap().clone();
        let victim = by_addr(&nodes, &victim_addr).clone();
        let victim_pos = victim.node().position();
        victim.stop().await;
        let survivors: Vec<Arc<Coordinator>> = nodes
            .iter()
            .filter(|n| n.node().addr() != victim_addr)
            .cloned()
            .collect();
        assert_within!(
            WINDOW,
            "victim dropped from every ring",
            survivors.iter().all(|n| !n.node().ring().contains(&victim_addr))
        );

        // bring it back empty, at the same place
        let mut config = fast_config(Some(victim_pos));
        config.addr = victim_addr.clone();
        let revived = Coordinator::new(config).unwrap();
        revived.start().await.unwrap();
        revived.join(&owner_addr).await.unwrap();
        assert_eq!(revived.held(), 0);

        let mut everyone = survivors.clone();
        everyone.push(revived.clone());
        assert_within!(
            WINDOW,
            "revived replica repopulated",
            revived.tree().read(|t| t.get_timestamp(&stored_key(&key))) == Some(original.clone())
        );
        assert_within!(WINDOW, "replica set restored", holders(&everyone, &key) == expected);

        stop_all(&everyone).await;
    }
}
