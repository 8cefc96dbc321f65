//! Ring Tests
//!
//! Covers the lookup primitive, arc trimming, slot selection and the ordering
//! invariant under arbitrary membership churn.

#[cfg(test)]
mod tests {
    use crate::hash::Position;
    use crate::ring::{Remote, Ring};
    use proptest::prelude::*;

    fn remote(pos: u8, addr: &str) -> Remote {
        Remote::new(Position::from_prefix(&[pos]), addr)
    }

    fn pos(byte: u8) -> Position {
        Position::from_prefix(&[byte])
    }

    fn build_ring() -> (Ring, Vec<Remote>) {
        let ring = Ring::new(3);
        let mut expected = Vec::new();
        for (p, addr) in [(0, "a"), (1, "b"), (2, "c"), (3, "d"), (4, "e"), (6, "f"), (7, "g")] {
            ring.add(remote(p, addr));
            expected.push(remote(p, addr));
        }
        (ring, expected)
    }

    fn assert_remotes(ring: &Ring, at: u8, before: Option<u8>, matched: Option<u8>, after: Option<u8>) {
        let (b, m, a) = ring.remotes(&pos(at));
        assert_eq!(b.map(|r| r.pos), before.map(pos), "predecessor of {}", at);
        assert_eq!(m.map(|r| r.pos), matched.map(pos), "match of {}", at);
        assert_eq!(a.map(|r| r.pos), after.map(pos), "successor of {}", at);
    }

    // ============================================================
    // LOOKUP TESTS
    // ============================================================

    #[test]
    fn test_remotes_around_every_position() {
        let (ring, _) = build_ring();
        assert_remotes(&ring, 0, Some(7), Some(0), Some(1));
        assert_remotes(&ring, 1, Some(0), Some(1), Some(2));
        assert_remotes(&ring, 2, Some(1), Some(2), Some(3));
        assert_remotes(&ring, 3, Some(2), Some(3), Some(4));
        assert_remotes(&ring, 4, Some(3), Some(4), Some(6));
        assert_remotes(&ring, 5, Some(4), None, Some(6));
        assert_remotes(&ring, 6, Some(4), Some(6), Some(7));
        assert_remotes(&ring, 7, Some(6), Some(7), Some(0));
    }

    #[test]
    fn test_remotes_past_the_last_member_wraps() {
        let ring = Ring::new(3);
        ring.add(remote(2, "a"));
        ring.add(remote(4, "b"));
        assert_remotes(&ring, 9, Some(4), None, Some(2));
    }

    #[test]
    fn test_remotes_on_empty_ring() {
        let ring = Ring::new(3);
        assert_eq!(ring.remotes(&pos(1)), (None, None, None));
        assert!(ring.get_slot().is_none());
    }

    #[test]
    fn test_equal_positions() {
        let ring = Ring::new(3);
        let (ra, rb, rc, rd, re) = (
            remote(0, "a"),
            remote(2, "b"),
            remote(2, "c"),
            remote(4, "d"),
            remote(5, "e"),
        );
        for r in [&ra, &rb, &rc, &rd, &re] {
            ring.add(r.clone());
        }

        assert_eq!(ring.successor(&ra), Some(rb.clone()));
        assert_eq!(ring.successor(&rb), Some(rc.clone()));
        assert_eq!(ring.successor(&rc), Some(rd.clone()));
        assert_eq!(ring.successor(&rd), Some(re.clone()));
        assert_eq!(ring.successor(&re), Some(ra.clone()));
        assert_eq!(ring.predecessor(&ra), Some(re.clone()));
        assert_eq!(ring.predecessor(&rc), Some(rb.clone()));

        let (b, m, a) = ring.remotes(&pos(2));
        assert_eq!((b, m, a), (Some(ra.clone()), Some(rb.clone()), Some(rd.clone())));
        let (b, m, a) = ring.remotes(&pos(3));
        assert_eq!((b, m, a), (Some(rc.clone()), None, Some(rd.clone())));
        let (b, m, a) = ring.remotes(&pos(4));
        assert_eq!((b, m, a), (Some(rc), Some(rd), Some(re)));
    }

    // ============================================================
    // MUTATION TESTS
    // ============================================================

    #[test]
    fn test_add_moves_existing_address() {
        let (ring, _) = build_ring();
        ring.add(remote(5, "a"));
        assert_eq!(ring.len(), 7);
        let nodes = ring.nodes();
        assert_eq!(nodes[0], remote(1, "b"));
        assert_eq!(nodes[4], remote(5, "a"));
        ring.validate();
    }

    #[test]
    fn test_add_identical_is_noop() {
        let (ring, expected) = build_ring();
        let before = ring.hash();
        ring.add(remote(3, "d"));
        assert_eq!(ring.nodes(), expected);
        assert_eq!(ring.hash(), before);
    }

    #[test]
    fn test_remove_by_address() {
        let (ring, mut expected) = build_ring();
        ring.remove(&remote(9, "c"));
        expected.remove(2);
        assert_eq!(ring.nodes(), expected);

        ring.remove(&remote(0, "unknown"));
        assert_eq!(ring.nodes(), expected);
    }

    #[test]
    #[should_panic]
    fn test_remove_last_member_panics() {
        let ring = Ring::new(3);
        ring.add(remote(1, "a"));
        ring.remove(&remote(1, "a"));
    }

    #[test]
    fn test_set_nodes_sorts_and_dedups() {
        let ring = Ring::new(3);
        ring.set_nodes(vec![remote(4, "x"), remote(1, "y"), remote(2, "x")]);
        assert_eq!(ring.nodes(), vec![remote(1, "y"), remote(2, "x")]);
    }

    #[test]
    fn test_clone_is_independent() {
        let (ring, _) = build_ring();
        let snapshot = ring.clone();
        ring.remove(&remote(0, "a"));
        assert_eq!(snapshot.len(), 7);
        assert_eq!(ring.len(), 6);
        assert_ne!(snapshot.hash(), ring.hash());
    }

    #[test]
    fn test_redundancy_capped_by_size() {
        let ring = Ring::new(3);
        ring.add(remote(1, "a"));
        assert_eq!(ring.redundancy(), 1);
        ring.add(remote(2, "b"));
        assert_eq!(ring.redundancy(), 2);
        ring.add(remote(3, "c"));
        ring.add(remote(4, "d"));
        assert_eq!(ring.redundancy(), 3);
    }

    #[test]
    fn test_validate_accepts_well_formed_ring() {
        let (ring, _) = build_ring();
        ring.validate();
    }

    // ============================================================
    // CLEAN TESTS
    // ============================================================

    #[test]
    fn test_clean() {
        // (predecessor, successor, indices of the members that survive)
        let cases: Vec<(u8, u8, Vec<usize>)> = vec![
            (0, 2, vec![0, 2, 3, 4, 5, 6]),
            (0, 1, vec![0, 1, 2, 3, 4, 5, 6]),
            (4, 6, vec![0, 1, 2, 3, 4, 5, 6]),
            (7, 0, vec![0, 1, 2, 3, 4, 5, 6]),
            (7, 1, vec![1, 2, 3, 4, 5, 6]),
            (6, 0, vec![0, 1, 2, 3, 4, 5]),
            (3, 3, vec![3]),
        ];
        for (predecessor, successor, kept) in cases {
            let (ring, all) = build_ring();
            ring.clean(&pos(predecessor), &pos(successor));
            let expected: Vec<Remote> = kept.iter().map(|&i| all[i].clone()).collect();
            assert_eq!(ring.nodes(), expected, "clean({}, {})", predecessor, successor);
        }
    }

    // ============================================================
    // SLOT TESTS
    // ============================================================

    #[test]
    fn test_get_slot_picks_widest_gap() {
        let ring = Ring::new(3);
        ring.add(Remote::new(Position::from_u128(0), "a"));
        ring.add(Remote::new(Position::from_u128(1 << 100), "b"));
        ring.add(Remote::new(Position::from_u128(u128::MAX - (1 << 100)), "c"));
        // widest arc is b..c
        let slot = ring.get_slot().unwrap().as_u128();
        let b = 1u128 << 100;
        let c = u128::MAX - (1 << 100);
        assert_eq!(slot, b + (c - b) / 2);
    }

    #[test]
    fn test_get_slot_uses_wrap_gap() {
        let ring = Ring::new(3);
        ring.add(Remote::new(Position::from_u128(1 << 126), "a"));
        ring.add(Remote::new(Position::from_u128(1 << 127), "b"));
        // wrap arc from b round to a spans 3/4 of the circle
        let slot = ring.get_slot().unwrap().as_u128();
        let gap = (1u128 << 126).wrapping_sub(1 << 127);
        assert_eq!(slot, (1u128 << 127).wrapping_add(gap / 2));
    }

    #[test]
    fn test_get_slot_single_member_is_opposite() {
        let ring = Ring::new(3);
        ring.add(Remote::new(Position::ZERO, "a"));
        assert_eq!(ring.get_slot(), Some(Position::from_u128(1 << 127)));
    }

    // ============================================================
    // PROPERTIES
    // ============================================================

    #[derive(Debug, Clone)]
    enum Churn {
        Add(u8, u8),
        Remove(u8),
    }

    fn churn() -> impl Strategy<Value = Churn> {
        prop_oneof![
            (any::<u8>(), 0u8..12).prop_map(|(p, a)| Churn::Add(p, a)),
            (0u8..12).prop_map(Churn::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_ring_stays_sorted_and_unique(ops in prop::collection::vec(churn(), 1..64)) {
            let ring = Ring::new(3);
            for op in ops {
                match op {
                    Churn::Add(p, a) => ring.add(remote(p, &format!("n{}", a))),
                    Churn::Remove(a) => {
                        if ring.len() > 1 {
                            ring.remove(&remote(0, &format!("n{}", a)));
                        }
                    }
                }
            }
            let nodes = ring.nodes();
            prop_assert!(nodes.windows(2).all(|w| w[0] <= w[1]));
            let mut addrs: Vec<_> = nodes.iter().map(|r| r.addr.clone()).collect();
            addrs.sort();
            addrs.dedup();
            prop_assert_eq!(addrs.len(), nodes.len());
        }
    }
}
