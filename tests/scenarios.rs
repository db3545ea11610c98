//! End-to-end scenarios against the public `Database` API.
//!
//! Each scenario below corresponds to one of the concrete worked examples in
//! the design spec. Literal external ids that depend on the original spec's
//! hash function are not reproduced bit-for-bit (this crate hashes shard
//! routing with `xxh3_64`, not `std::hash<string>`; see DESIGN.md) — those
//! scenarios instead assert the same structural outcome using whatever ids
//! this implementation actually hands back.

use serde_json::json;
use shardgraph::{Database, DatabaseConfig, Direction, Operator, TypeFilter};

fn db(shard_count: u16) -> Database {
    Database::new(DatabaseConfig { shard_count, ..DatabaseConfig::default() })
}

#[test]
fn scenario_single_shard_triangle() {
    let db = db(4);

    let node_type = db.node_type_insert("Node").unwrap();
    assert_eq!(node_type, 1);

    let four = db.node_add_empty("Node", "four").unwrap();
    let five = db.node_add_empty("Node", "five").unwrap();
    let six = db.node_add_empty("Node", "six").unwrap();
    for id in [four, five, six] {
        let (shard, type_id, offset) = shardgraph::id::decode(id);
        assert_eq!(shardgraph::id::encode(shard, type_id, offset), id);
        assert_eq!(type_id, node_type);
    }
    let _ = six;

    let friends = db.relationship_type_insert("FRIENDS").unwrap();
    let enemies = db.relationship_type_insert("ENEMIES").unwrap();
    assert_eq!(friends, 1);
    assert_eq!(enemies, 2);

    db.relationship_add("FRIENDS", four, five, Default::default()).unwrap();
    db.relationship_add("ENEMIES", five, four, Default::default()).unwrap();

    assert_eq!(db.node_get_degree(four, Direction::Both, TypeFilter::Any).unwrap(), 2);
    assert_eq!(db.node_get_degree(four, Direction::In, TypeFilter::Any).unwrap(), 1);
    assert_eq!(db.node_get_degree(four, Direction::Out, TypeFilter::Any).unwrap(), 1);
    assert_eq!(db.node_get_degree(four, Direction::In, TypeFilter::One(enemies)).unwrap(), 1);
    assert_eq!(db.node_get_degree(four, Direction::Out, TypeFilter::One(enemies)).unwrap(), 0);
    assert_eq!(
        db.node_get_degree(four, Direction::Both, TypeFilter::Set(vec![friends, enemies])).unwrap(),
        2
    );
}

#[test]
fn scenario_cross_shard_route() {
    let db = db(4);
    db.node_type_insert("User").unwrap();

    let keys = ["maxdemarzi", "helene", "alejandro", "tyler", "maxdemarzi1"];
    let mut shards = Vec::new();
    for key in keys {
        let id = db.node_add_empty("User", key).unwrap();
        assert_ne!(id, 0);
        shards.push(shardgraph::id::shard_of(id));
        assert_eq!(shardgraph::id::shard_of(id), shardgraph::id::shard_for_key("User", key, 4));
    }
    // Not every key collapses onto the same shard.
    assert!(shards.iter().collect::<std::collections::HashSet<_>>().len() > 1);

    // Looking a key up from any caller must resolve the same id regardless of
    // which shard the lookup is issued against internally.
    let helene = db.node_get_id("User", "helene").unwrap();
    assert_ne!(helene, 0);
    assert_eq!(shardgraph::id::shard_of(helene), shardgraph::id::shard_for_key("User", "helene", 4));
}

#[test]
fn scenario_property_filter() {
    let db = db(4);
    let person = db.node_type_insert("Person").unwrap();
    db.node_property_type_add(person, "name", shardgraph::ScalarKind::String).unwrap();
    db.node_property_type_add(person, "age", shardgraph::ScalarKind::Int64).unwrap();
    db.node_property_type_add(person, "weight", shardgraph::ScalarKind::Double).unwrap();
    db.node_property_type_add(person, "active", shardgraph::ScalarKind::Bool).unwrap();
    db.node_property_type_add(person, "vector", shardgraph::ScalarKind::ListInt64).unwrap();

    let people = [
        ("p1", "max", 99, 230.5, true, json!([1, 2, 3, 4])),
        ("p2", "max", 99, 230.5, true, json!([1, 2, 3, 4])),
        ("p3", "alex", 55, 199.0, false, json!([1, 2])),
        ("p4", "alex", 55, 199.0, false, json!([3, 4])),
    ];
    for (key, name, age, weight, active, vector) in people {
        let props = json!({
            "name": name,
            "age": age,
            "weight": weight,
            "active": active,
            "vector": vector,
        });
        db.node_add("Person", key, props.as_object().unwrap().clone()).unwrap();
    }

    let count = |op: Operator, value: serde_json::Value| db.find_node_count(person, "age", op, value).unwrap();
    assert_eq!(count(Operator::Eq, json!(55)), 2);
    assert_eq!(count(Operator::Gt, json!(55)), 2);
    assert_eq!(count(Operator::Gte, json!(55)), 4);
    assert_eq!(count(Operator::Lte, json!(55)), 2);
    assert_eq!(db.find_node_count(person, "name", Operator::StartsWith, json!("a")).unwrap(), 2);
    assert_eq!(db.find_node_count(person, "name", Operator::EndsWith, json!("x")).unwrap(), 4);
    assert_eq!(db.find_node_count(person, "name", Operator::Contains, json!("a")).unwrap(), 4);
}

#[test]
fn scenario_relationship_remove_reuses_offset() {
    let db = db(4);
    let a = db.node_add_empty("Account", "a").unwrap();
    let b = db.node_add_empty("Account", "b").unwrap();

    let first = db.relationship_add("KNOWS", a, b, Default::default()).unwrap();
    assert_ne!(first, 0);
    assert!(db.relationship_remove(first).unwrap());

    let second = db.relationship_add("KNOWS", a, b, Default::default()).unwrap();
    assert_eq!(second, first, "deleted relationship offset should be recycled");
}

#[test]
fn scenario_schema_safety() {
    let db = db(2);
    let first = db.node_type_insert("Person").unwrap();
    let second = db.node_type_insert("Person").unwrap();
    assert_eq!(first, second, "re-inserting an existing type name must return the original id");

    // No instances yet: delete succeeds.
    db.node_type_delete("Person").unwrap();

    // Re-declare and populate, then deletion must fail while in use. The
    // reinserted type gets a fresh id: the deleted one is never reused.
    let reinserted = db.node_type_insert("Person").unwrap();
    assert_ne!(reinserted, first);
    db.node_add_empty("Person", "only-instance").unwrap();
    let err = db.node_type_delete("Person").unwrap_err();
    assert!(matches!(err, shardgraph::Error::TypeInUse(name) if name == "Person"));
}

#[test]
fn scenario_k_hop_correctness() {
    let db = db(4);
    let a = db.node_add_empty("N", "a").unwrap();
    let b = db.node_add_empty("N", "b").unwrap();
    let c = db.node_add_empty("N", "c").unwrap();
    let d = db.node_add_empty("N", "d").unwrap();
    db.relationship_add("NEXT", a, b, Default::default()).unwrap();
    db.relationship_add("NEXT", b, c, Default::default()).unwrap();
    db.relationship_add("NEXT", c, d, Default::default()).unwrap();

    let as_set = |ids: roaring::RoaringTreemap| ids.iter().collect::<std::collections::HashSet<_>>();

    assert_eq!(as_set(db.k_hop_ids(a, 1, Direction::Out, TypeFilter::Any).unwrap()), [b].into_iter().collect());
    assert_eq!(
        as_set(db.k_hop_ids(a, 2, Direction::Out, TypeFilter::Any).unwrap()),
        [b, c].into_iter().collect()
    );
    assert_eq!(
        as_set(db.k_hop_ids(a, 3, Direction::Out, TypeFilter::Any).unwrap()),
        [b, c, d].into_iter().collect()
    );
    assert_eq!(db.k_hop_count(a, 3, Direction::Out, TypeFilter::Any).unwrap(), 3);
}

#[test]
fn node_add_empty_then_remove_preserves_type_count() {
    let db = db(1);
    let before = db.node_type_insert("Widget").map(|t| db.node_type_count(t).unwrap()).unwrap();
    let id = db.node_add_empty("Widget", "w1").unwrap();
    db.node_remove(id).unwrap();
    let type_id = db.node_type_get("Widget").unwrap().unwrap();
    assert_eq!(db.node_type_count(type_id).unwrap(), before);
}

#[test]
fn relationship_add_then_remove_restores_adjacency() {
    let db = db(1);
    let a = db.node_add_empty("N", "a").unwrap();
    let b = db.node_add_empty("N", "b").unwrap();
    let before = db.node_get_degree(a, Direction::Both, TypeFilter::Any).unwrap();
    let rel = db.relationship_add("LINK", a, b, Default::default()).unwrap();
    db.relationship_remove(rel).unwrap();
    assert_eq!(db.node_get_degree(a, Direction::Both, TypeFilter::Any).unwrap(), before);
    assert_eq!(db.node_get_neighbor_ids(a, Direction::Both, TypeFilter::Any).unwrap(), Vec::<u64>::new());
}

#[test]
fn node_add_many_keeps_only_first_duplicate() {
    let db = db(2);
    db.node_type_insert("Tag").unwrap();
    let ids = db
        .node_add_many(
            "Tag",
            vec![
                ("dup".to_string(), Default::default()),
                ("unique".to_string(), Default::default()),
                ("dup".to_string(), Default::default()),
            ],
        )
        .unwrap();
    assert_ne!(ids[0], 0);
    assert_ne!(ids[1], 0);
    assert_eq!(ids[2], 0);
}

#[test]
fn k_hop_zero_is_empty() {
    let db = db(2);
    let a = db.node_add_empty("N", "a").unwrap();
    db.node_add_empty("N", "b").unwrap();
    assert!(db.k_hop_ids(a, 0, Direction::Out, TypeFilter::Any).unwrap().is_empty());
}

#[test]
fn find_nodes_is_null_matches_tombstoned_column() {
    let db = db(2);
    let t = db.node_type_insert("Profile").unwrap();
    db.node_property_type_add(t, "bio", shardgraph::ScalarKind::String).unwrap();
    let with_bio = db.node_add("Profile", "has-bio", json!({"bio": "hi"}).as_object().unwrap().clone()).unwrap();
    let without_bio = db.node_add_empty("Profile", "no-bio").unwrap();

    let missing = db.find_node_ids(t, "bio", Operator::IsNull, json!(null), 0, usize::MAX).unwrap();
    assert!(missing.contains(&without_bio));
    assert!(!missing.contains(&with_bio));
}
