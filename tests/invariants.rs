//! Property-based invariant tests (§8 "Universal invariants").

use proptest::prelude::*;
use shardgraph::{id, Database, DatabaseConfig, Direction, TypeFilter};

proptest! {
    /// Id round-trip: `encode(shard_of(id), type_of(id), offset_of(id)) == id`
    /// for every value representable within each field's bit width.
    #[test]
    fn id_round_trips_for_any_valid_fields(
        shard in 0u16..1024,
        type_id in 0u16..u16::MAX,
        offset in 0u64..(1u64 << id::OFFSET_BITS),
    ) {
        let encoded = id::encode(shard, type_id, offset);
        prop_assert_eq!(id::decode(encoded), (shard, type_id, offset));
        prop_assert_eq!(id::shard_of(encoded), shard);
        prop_assert_eq!(id::type_of(encoded), type_id);
        prop_assert_eq!(id::offset_of(encoded), offset);
    }

    /// Adjacency symmetry: for every relationship `a -> b` added to a random
    /// small graph, `a`'s outgoing neighbor set contains `b` exactly as many
    /// times as `b`'s incoming neighbor set contains `a`.
    #[test]
    fn adjacency_stays_symmetric_under_random_inserts_and_removals(
        ops in prop::collection::vec(0u8..3, 1..40),
        shard_count in 1u16..5,
    ) {
        let db = Database::new(DatabaseConfig { shard_count, ..DatabaseConfig::default() });
        let mut nodes = Vec::new();
        let mut rels = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            match op {
                0 => {
                    let id = db.node_add_empty("N", &format!("n{i}")).unwrap();
                    nodes.push(id);
                }
                1 if nodes.len() >= 2 => {
                    let a = nodes[i % nodes.len()];
                    let b = nodes[(i / 2) % nodes.len()];
                    if let Ok(rel) = db.relationship_add("E", a, b, Default::default()) {
                        if rel != 0 {
                            rels.push((rel, a, b));
                        }
                    }
                }
                2 if !rels.is_empty() => {
                    let (rel, _, _) = rels.remove(i % rels.len());
                    db.relationship_remove(rel).unwrap();
                }
                _ => {}
            }

            for &a in &nodes {
                let out = db.node_get_neighbor_ids(a, Direction::Out, TypeFilter::Any).unwrap();
                for &b in &out {
                    let incoming = db.node_get_neighbor_ids(b, Direction::In, TypeFilter::Any).unwrap();
                    let occurrences = incoming.iter().filter(|&&x| x == a).count();
                    let expected = out.iter().filter(|&&x| x == b).count();
                    prop_assert_eq!(occurrences, expected, "symmetry broken between {a} and {b}");
                }
            }
        }
        db.shutdown();
    }
}
