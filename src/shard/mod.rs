//! The shard runtime: one OS thread per shard, a FIFO command channel, and a
//! big match over [`ShardCommand`] that is the only thing allowed to touch
//! that shard's stores. No lock ever guards a shard's data — the single
//! thread executing this loop is the only writer and the only reader.

use std::collections::HashMap;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde_json::{Map, Value as Json};

use crate::catalog::TypeRegistry;
use crate::id;
use crate::model::{Direction, NodeRecord, RelationshipRecord, TypeFilter};
use crate::storage::adjacency::Link;
use crate::storage::node_store::NodeStore;
use crate::storage::relationship_store::RelationshipStore;
use crate::value::{self, PropertyValue, ScalarKind};

/// Which type namespace a schema command targets. Node types and
/// relationship types are disjoint registries that happen to share the
/// command plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Node,
    Relationship,
}

type Reply<T> = Sender<T>;

/// Every operation a shard thread can execute, one variant per RPC. `reply`
/// is a rendezvous channel the caller blocks on; the shard always sends
/// exactly one reply before moving to the next command.
pub enum ShardCommand {
    GetOrInsertType { namespace: Namespace, name: String, reply: Reply<u16> },
    ApplyTypeInsert { namespace: Namespace, name: String, id: u16, reply: Reply<()> },
    ReadTypeId { namespace: Namespace, name: String, reply: Reply<Option<u16>> },
    ReadTypeName { namespace: Namespace, type_id: u16, reply: Reply<Option<String>> },
    ReadTypeNames { namespace: Namespace, reply: Reply<Vec<String>> },
    IsTypeInUse { namespace: Namespace, type_id: u16, reply: Reply<bool> },
    ApplyTypeDelete { namespace: Namespace, type_id: u16, reply: Reply<()> },

    DeclareProperty {
        namespace: Namespace,
        type_id: u16,
        name: String,
        kind: ScalarKind,
        reply: Reply<crate::error::Result<()>>,
    },
    ReadPropertyKind {
        namespace: Namespace,
        type_id: u16,
        name: String,
        reply: Reply<Option<ScalarKind>>,
    },
    ApplyDeleteProperty { namespace: Namespace, type_id: u16, name: String, reply: Reply<()> },

    NodeTypeCount { type_id: u16, reply: Reply<usize> },
    RelTypeCount { type_id: u16, reply: Reply<usize> },

    NodeAdd {
        type_id: u16,
        key: String,
        props: Map<String, Json>,
        reply: Reply<crate::error::Result<u64>>,
    },
    NodeGetById { id: u64, reply: Reply<Option<NodeRecord>> },
    NodeGetIdByKey { type_id: u16, key: String, reply: Reply<Option<u64>> },
    NodeGetKey { id: u64, reply: Reply<Option<String>> },
    NodeGetProperty { id: u64, property: String, reply: Reply<PropertyValue> },
    NodeSetProperty {
        id: u64,
        property: String,
        kind: ScalarKind,
        value: Json,
        reply: Reply<bool>,
    },
    NodeSetPropertiesFromJson { id: u64, values: Vec<(String, ScalarKind, Json)>, reply: Reply<()> },
    NodeResetPropertiesFromJson { id: u64, values: Vec<(String, ScalarKind, Json)>, reply: Reply<()> },
    NodeDeleteProperty { id: u64, property: String, reply: Reply<bool> },
    NodeDeleteProperties { id: u64, reply: Reply<()> },
    NodeGetDegree { id: u64, direction: Direction, rel_type: TypeFilter, reply: Reply<usize> },
    NodeNeighborIds { id: u64, direction: Direction, rel_type: TypeFilter, reply: Reply<Vec<u64>> },
    NodeCollectLinksForRemoval {
        id: u64,
        reply: Reply<(Vec<(u16, Vec<Link>)>, Vec<(u16, Vec<Link>)>)>,
    },
    NodeFinalizeRemoval { id: u64, reply: Reply<()> },
    RemoveIncomingLink { at_node: u64, rel_type: u16, peer: u64, rel_id: u64, reply: Reply<()> },
    RemoveOutgoingLinkAndTombstoneRel {
        at_node: u64,
        rel_type: u16,
        peer: u64,
        rel_id: u64,
        reply: Reply<()>,
    },

    RelAddLocal {
        rel_type: u16,
        id1: u64,
        id2: u64,
        props: Map<String, Json>,
        reply: Reply<crate::error::Result<u64>>,
    },
    RelPreflight { id2: u64, reply: Reply<bool> },
    RelCreateAndOutgoing {
        rel_type: u16,
        id1: u64,
        id2: u64,
        props: Map<String, Json>,
        reply: Reply<u64>,
    },
    RelAddIncoming { id2: u64, rel_type: u16, rel_id: u64, id1: u64, reply: Reply<bool> },
    RelGet { rel_id: u64, reply: Reply<Option<RelationshipRecord>> },
    RelGetProperty { rel_id: u64, property: String, reply: Reply<PropertyValue> },
    RelSetProperty {
        rel_id: u64,
        property: String,
        kind: ScalarKind,
        value: Json,
        reply: Reply<bool>,
    },
    RelSetPropertiesFromJson { rel_id: u64, values: Vec<(String, ScalarKind, Json)>, reply: Reply<()> },
    RelResetPropertiesFromJson { rel_id: u64, values: Vec<(String, ScalarKind, Json)>, reply: Reply<()> },
    RelDeleteProperty { rel_id: u64, property: String, reply: Reply<bool> },
    RelDeleteProperties { rel_id: u64, reply: Reply<()> },
    RelRemoveStep1 { rel_id: u64, reply: Reply<Option<(u16, u64, u64)>> },
    RelRemoveStep2 { id2: u64, rel_type: u16, id1: u64, rel_id: u64, reply: Reply<()> },

    NeighborIdsBulk {
        ids: Vec<u64>,
        direction: Direction,
        rel_type: TypeFilter,
        reply: Reply<roaring::RoaringTreemap>,
    },
    OutsInsSnapshot {
        rel_type: u16,
        reply: Reply<(HashMap<u64, Vec<u64>>, HashMap<u64, Vec<u64>>)>,
    },

    FindIdsLocal {
        type_id: u16,
        property: String,
        op: crate::filter::Operator,
        value: Json,
        budget: usize,
        reply: Reply<Vec<u64>>,
    },

    Shutdown,
}

/// A handle the router holds for one shard: its id and command sender.
pub struct ShardHandle {
    pub id: u16,
    pub sender: Sender<ShardCommand>,
    pub join: Option<JoinHandle<()>>,
}

/// Shard-local state. Owns exactly one `NodeStore` and `RelationshipStore`
/// per type id and a replica of both type registries.
struct Shard {
    id: u16,
    shard_count: u16,
    node_types: TypeRegistry,
    rel_types: TypeRegistry,
    nodes: HashMap<u16, NodeStore>,
    rels: HashMap<u16, RelationshipStore>,
    yield_every: usize,
}

/// Spawn a shard thread bound to `id`, returning its handle. `channel_capacity`
/// bounds the command channel; `yield_every` controls how many frontier
/// elements a bulk scan processes before cooperatively yielding.
pub fn spawn(id: u16, shard_count: u16, channel_capacity: usize, yield_every: usize) -> ShardHandle {
    let (tx, rx): (Sender<ShardCommand>, Receiver<ShardCommand>) =
        crossbeam_channel::bounded(channel_capacity);
    let join = std::thread::Builder::new()
        .name(format!("shard-{id}"))
        .spawn(move || {
            tracing::debug!(shard = id, shard_count, "shard thread started");
            let mut shard = Shard {
                id,
                shard_count,
                node_types: TypeRegistry::new(),
                rel_types: TypeRegistry::new(),
                nodes: HashMap::new(),
                rels: HashMap::new(),
                yield_every,
            };
            for cmd in rx.iter() {
                if matches!(cmd, ShardCommand::Shutdown) {
                    break;
                }
                shard.handle(cmd);
            }
        })
        .expect("failed to spawn shard thread");
    ShardHandle { id, sender: tx, join: Some(join) }
}

impl Shard {
    fn registry(&mut self, ns: Namespace) -> &mut TypeRegistry {
        match ns {
            Namespace::Node => &mut self.node_types,
            Namespace::Relationship => &mut self.rel_types,
        }
    }

    fn handle(&mut self, cmd: ShardCommand) {
        use ShardCommand::*;
        match cmd {
            Shutdown => {}

            GetOrInsertType { namespace, name, reply } => {
                let id = self.registry(namespace).get_or_insert(&name);
                let _ = reply.send(id);
            }
            ApplyTypeInsert { namespace, name, id, reply } => {
                let got = self.registry(namespace).get_or_insert(&name);
                debug_assert_eq!(got, id, "type id diverged across shards for {name:?}");
                let _ = reply.send(());
            }
            ReadTypeId { namespace, name, reply } => {
                let _ = reply.send(self.registry(namespace).id_of(&name));
            }
            ReadTypeName { namespace, type_id, reply } => {
                let _ = reply.send(self.registry(namespace).name_of(type_id).map(str::to_string));
            }
            ReadTypeNames { namespace, reply } => {
                let names = self.registry(namespace).names().iter().map(|s| s.to_string()).collect();
                let _ = reply.send(names);
            }
            IsTypeInUse { namespace, type_id, reply } => {
                let in_use = match namespace {
                    Namespace::Node => self.nodes.get(&type_id).map(|s| s.count() > 0).unwrap_or(false),
                    Namespace::Relationship => {
                        self.rels.get(&type_id).map(|s| s.count() > 0).unwrap_or(false)
                    }
                };
                let _ = reply.send(in_use);
            }
            ApplyTypeDelete { namespace, type_id, reply } => {
                self.registry(namespace).delete(type_id);
                let _ = reply.send(());
            }

            DeclareProperty { namespace, type_id, name, kind, reply } => {
                let result = self.registry(namespace).declare_property(type_id, &name, kind);
                let _ = reply.send(result);
            }
            ReadPropertyKind { namespace, type_id, name, reply } => {
                let _ = reply.send(self.registry(namespace).property_kind(type_id, &name));
            }
            ApplyDeleteProperty { namespace, type_id, name, reply } => {
                match namespace {
                    Namespace::Node => {
                        if let Some(store) = self.nodes.get_mut(&type_id) {
                            store.properties.clear_column(&name);
                        }
                        self.node_types.remove_property(type_id, &name);
                    }
                    Namespace::Relationship => {
                        if let Some(store) = self.rels.get_mut(&type_id) {
                            store.properties.clear_column(&name);
                        }
                        self.rel_types.remove_property(type_id, &name);
                    }
                }
                let _ = reply.send(());
            }

            NodeTypeCount { type_id, reply } => {
                let _ = reply.send(self.nodes.get(&type_id).map(|s| s.count()).unwrap_or(0));
            }
            RelTypeCount { type_id, reply } => {
                let _ = reply.send(self.rels.get(&type_id).map(|s| s.count()).unwrap_or(0));
            }

            NodeAdd { type_id, key, props, reply } => {
                let result = if self.nodes.entry(type_id).or_default().offset_of(&key).is_some() {
                    Err(crate::error::Error::DuplicateKey {
                        type_name: self.node_types.name_of(type_id).unwrap_or("?").to_string(),
                        key: key.clone(),
                    })
                } else {
                    let resolved: Vec<(String, value::ScalarKind, Json)> = props
                        .iter()
                        .filter_map(|(k, v)| {
                            let kind = self
                                .node_types
                                .property_kind(type_id, k)
                                .or_else(|| value::infer_kind(v));
                            kind.map(|kind| (k.clone(), kind, v.clone()))
                        })
                        .collect();
                    let store = self.nodes.get_mut(&type_id).unwrap();
                    let offset = store.insert(&key);
                    for (k, kind, v) in &resolved {
                        store.properties.set(k, *kind, offset, v);
                    }
                    self.node_types.mark_in_use(type_id);
                    Ok(id::encode(self.id, type_id, offset as u64))
                };
                let _ = reply.send(result);
            }
            NodeGetById { id, reply } => {
                let record = self.read_node_record(id);
                let _ = reply.send(record);
            }
            NodeGetIdByKey { type_id, key, reply } => {
                let offset = self.nodes.get(&type_id).and_then(|s| s.offset_of(&key));
                let _ = reply.send(offset.map(|o| id::encode(self.id, type_id, o as u64)));
            }
            NodeGetKey { id, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let key = self.nodes.get(&type_id).and_then(|s| s.key_of(offset as u32)).map(str::to_string);
                let _ = reply.send(key);
            }
            NodeGetProperty { id, property, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let value = self
                    .nodes
                    .get(&type_id)
                    .map(|s| s.properties.get(&property, offset as u32))
                    .unwrap_or(PropertyValue::Null);
                let _ = reply.send(value);
            }
            NodeSetProperty { id, property, kind, value, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let ok = self
                    .nodes
                    .get_mut(&type_id)
                    .map(|s| s.properties.set(&property, kind, offset as u32, &value))
                    .unwrap_or(false);
                let _ = reply.send(ok);
            }
            NodeSetPropertiesFromJson { id, values, reply } => {
                let (_, type_id, offset) = id::decode(id);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    for (name, kind, value) in values {
                        store.properties.set(&name, kind, offset as u32, &value);
                    }
                }
                let _ = reply.send(());
            }
            NodeResetPropertiesFromJson { id, values, reply } => {
                let (_, type_id, offset) = id::decode(id);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    store.properties.clear_all(offset as u32);
                    for (name, kind, value) in values {
                        store.properties.set(&name, kind, offset as u32, &value);
                    }
                }
                let _ = reply.send(());
            }
            NodeDeleteProperty { id, property, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let existed = self
                    .nodes
                    .get_mut(&type_id)
                    .map(|s| s.properties.clear_all_for(&property, offset as u32))
                    .unwrap_or(false);
                let _ = reply.send(existed);
            }
            NodeDeleteProperties { id, reply } => {
                let (_, type_id, offset) = id::decode(id);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    store.properties.clear_all(offset as u32);
                }
                let _ = reply.send(());
            }
            NodeGetDegree { id, direction, rel_type, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let degree = self
                    .nodes
                    .get(&type_id)
                    .map(|s| degree_for(s, offset as u32, direction, &rel_type))
                    .unwrap_or(0);
                let _ = reply.send(degree);
            }
            NodeNeighborIds { id, direction, rel_type, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let ids = self
                    .nodes
                    .get(&type_id)
                    .map(|s| neighbor_ids_for(s, offset as u32, direction, &rel_type))
                    .unwrap_or_default();
                let _ = reply.send(ids);
            }
            NodeCollectLinksForRemoval { id, reply } => {
                let (_, type_id, offset) = id::decode(id);
                let result = self.nodes.get(&type_id).map(|s| {
                    let out = s.outgoing.groups(offset as u32, None).iter().map(|g| (g.rel_type, g.links.clone())).collect();
                    let inn = s.incoming.groups(offset as u32, None).iter().map(|g| (g.rel_type, g.links.clone())).collect();
                    (out, inn)
                }).unwrap_or_default();
                let _ = reply.send(result);
            }
            NodeFinalizeRemoval { id, reply } => {
                let (_, type_id, offset) = id::decode(id);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    store.delete(offset as u32);
                    if store.count() == 0 {
                        self.node_types.clear_in_use(type_id);
                    }
                }
                let _ = reply.send(());
            }
            RemoveIncomingLink { at_node, rel_type, peer, rel_id, reply } => {
                let (_, type_id, offset) = id::decode(at_node);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    let _ = store.incoming.remove(offset as u32, rel_type, rel_id);
                    let _ = peer;
                }
                let _ = reply.send(());
            }
            RemoveOutgoingLinkAndTombstoneRel { at_node, rel_type, peer, rel_id, reply } => {
                let (_, type_id, offset) = id::decode(at_node);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    let _ = store.outgoing.remove(offset as u32, rel_type, rel_id);
                }
                let (_, rt_id, rel_offset) = id::decode(rel_id);
                debug_assert_eq!(rt_id, rel_type);
                if let Some(store) = self.rels.get_mut(&rel_type) {
                    store.delete(rel_offset as u32);
                    if store.count() == 0 {
                        self.rel_types.clear_in_use(rel_type);
                    }
                }
                let _ = peer;
                let _ = reply.send(());
            }

            RelAddLocal { rel_type, id1, id2, props, reply } => {
                let result = self.add_relationship_local(rel_type, id1, id2, &props);
                let _ = reply.send(result);
            }
            RelPreflight { id2, reply } => {
                let (_, type_id, offset) = id::decode(id2);
                let live = self.nodes.get(&type_id).map(|s| s.is_live(offset as u32)).unwrap_or(false);
                let _ = reply.send(live);
            }
            RelCreateAndOutgoing { rel_type, id1, id2, props, reply } => {
                let (_, type_id, offset) = id::decode(id1);
                let id1_live = self.nodes.get(&type_id).map(|s| s.is_live(offset as u32)).unwrap_or(false);
                let new_id = if id1_live {
                    let resolved: Vec<(String, value::ScalarKind, Json)> = props
                        .iter()
                        .filter_map(|(k, v)| {
                            let kind = self
                                .rel_types
                                .property_kind(rel_type, k)
                                .or_else(|| value::infer_kind(v));
                            kind.map(|kind| (k.clone(), kind, v.clone()))
                        })
                        .collect();
                    let store = self.rels.entry(rel_type).or_default();
                    let rel_offset = store.insert(id1, id2);
                    for (k, kind, v) in &resolved {
                        store.properties.set(k, *kind, rel_offset, v);
                    }
                    self.rel_types.mark_in_use(rel_type);
                    let rel_id = id::encode(self.id, rel_type, rel_offset as u64);
                    if let Some(node_store) = self.nodes.get_mut(&type_id) {
                        node_store.outgoing.add(offset as u32, rel_type, Link { peer: id2, rel_id });
                    }
                    rel_id
                } else {
                    0
                };
                let _ = reply.send(new_id);
            }
            RelAddIncoming { id2, rel_type, rel_id, id1, reply } => {
                let (_, type_id, offset) = id::decode(id2);
                let ok = if let Some(store) = self.nodes.get_mut(&type_id) {
                    if store.is_live(offset as u32) {
                        store.incoming.add(offset as u32, rel_type, Link { peer: id1, rel_id });
                        true
                    } else {
                        false
                    }
                } else {
                    false
                };
                let _ = reply.send(ok);
            }
            RelGet { rel_id, reply } => {
                let record = self.read_rel_record(rel_id);
                let _ = reply.send(record);
            }
            RelGetProperty { rel_id, property, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                let value = self
                    .rels
                    .get(&type_id)
                    .map(|s| s.properties.get(&property, offset as u32))
                    .unwrap_or(PropertyValue::Null);
                let _ = reply.send(value);
            }
            RelSetProperty { rel_id, property, kind, value, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                let ok = self
                    .rels
                    .get_mut(&type_id)
                    .map(|s| s.properties.set(&property, kind, offset as u32, &value))
                    .unwrap_or(false);
                let _ = reply.send(ok);
            }
            RelSetPropertiesFromJson { rel_id, values, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                if let Some(store) = self.rels.get_mut(&type_id) {
                    for (name, kind, value) in values {
                        store.properties.set(&name, kind, offset as u32, &value);
                    }
                }
                let _ = reply.send(());
            }
            RelResetPropertiesFromJson { rel_id, values, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                if let Some(store) = self.rels.get_mut(&type_id) {
                    store.properties.clear_all(offset as u32);
                    for (name, kind, value) in values {
                        store.properties.set(&name, kind, offset as u32, &value);
                    }
                }
                let _ = reply.send(());
            }
            RelDeleteProperty { rel_id, property, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                let existed = self
                    .rels
                    .get_mut(&type_id)
                    .map(|s| s.properties.clear_all_for(&property, offset as u32))
                    .unwrap_or(false);
                let _ = reply.send(existed);
            }
            RelDeleteProperties { rel_id, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                if let Some(store) = self.rels.get_mut(&type_id) {
                    store.properties.clear_all(offset as u32);
                }
                let _ = reply.send(());
            }
            RelRemoveStep1 { rel_id, reply } => {
                let (_, type_id, offset) = id::decode(rel_id);
                let result = self.rels.get_mut(&type_id).and_then(|store| {
                    let endpoints = store.endpoints_of(offset as u32)?;
                    store.delete(offset as u32);
                    if store.count() == 0 {
                        self.rel_types.clear_in_use(type_id);
                    }
                    let (id1, id2) = endpoints;
                    let (_, t1, o1) = id::decode(id1);
                    if let Some(node_store) = self.nodes.get_mut(&t1) {
                        node_store.outgoing.remove(o1 as u32, type_id, rel_id);
                    }
                    Some((type_id, id1, id2))
                });
                let _ = reply.send(result);
            }
            RelRemoveStep2 { id2, rel_type, id1, rel_id, reply } => {
                let (_, type_id, offset) = id::decode(id2);
                if let Some(store) = self.nodes.get_mut(&type_id) {
                    store.incoming.remove(offset as u32, rel_type, rel_id);
                }
                let _ = id1;
                let _ = reply.send(());
            }

            NeighborIdsBulk { ids, direction, rel_type, reply } => {
                let mut result = roaring::RoaringTreemap::new();
                for (i, node_id) in ids.iter().enumerate() {
                    let (_, type_id, offset) = id::decode(*node_id);
                    if let Some(store) = self.nodes.get(&type_id) {
                        for peer in neighbor_ids_for(store, offset as u32, direction, &rel_type) {
                            result.insert(peer);
                        }
                    }
                    if i % self.yield_every == 0 {
                        std::thread::yield_now();
                    }
                }
                let _ = reply.send(result);
            }
            OutsInsSnapshot { rel_type, reply } => {
                let mut outs = HashMap::new();
                let mut ins = HashMap::new();
                for (type_id, store) in self.nodes.iter() {
                    for offset in store.live_offsets() {
                        let node_id = id::encode(self.id, *type_id, offset as u64);
                        let out_peers: Vec<u64> = store
                            .outgoing
                            .groups(offset, Some(rel_type))
                            .iter()
                            .flat_map(|g| g.links.iter().map(|l| l.peer))
                            .collect();
                        if !out_peers.is_empty() {
                            outs.insert(node_id, out_peers);
                        }
                        let in_peers: Vec<u64> = store
                            .incoming
                            .groups(offset, Some(rel_type))
                            .iter()
                            .flat_map(|g| g.links.iter().map(|l| l.peer))
                            .collect();
                        if !in_peers.is_empty() {
                            ins.insert(node_id, in_peers);
                        }
                    }
                }
                let _ = reply.send((outs, ins));
            }

            FindIdsLocal { type_id, property, op, value, budget, reply } => {
                let mut matches = Vec::new();
                if let Some(store) = self.nodes.get(&type_id) {
                    let kind = store.properties.kind_of(&property);
                    for offset in store.live_offsets() {
                        if matches.len() >= budget {
                            break;
                        }
                        let current = store.properties.get(&property, offset);
                        if crate::filter::evaluate(op, kind, &current, &value) {
                            matches.push(id::encode(self.id, type_id, offset as u64));
                        }
                    }
                }
                let _ = reply.send(matches);
            }
        }
    }

    fn read_node_record(&self, id: u64) -> Option<NodeRecord> {
        let (_, type_id, offset) = id::decode(id);
        let store = self.nodes.get(&type_id)?;
        let key = store.key_of(offset as u32)?.to_string();
        let type_name = self.node_types.name_of(type_id).unwrap_or("?").to_string();
        Some(NodeRecord { id, type_name, key, properties: store.properties.get_all(offset as u32) })
    }

    fn read_rel_record(&self, rel_id: u64) -> Option<RelationshipRecord> {
        let (_, type_id, offset) = id::decode(rel_id);
        let store = self.rels.get(&type_id)?;
        let (id1, id2) = store.endpoints_of(offset as u32)?;
        let type_name = self.rel_types.name_of(type_id).unwrap_or("?").to_string();
        Some(RelationshipRecord {
            id: rel_id,
            type_name,
            starting_node_id: id1,
            ending_node_id: id2,
            properties: store.properties.get_all(offset as u32),
        })
    }

    fn add_relationship_local(
        &mut self,
        rel_type: u16,
        id1: u64,
        id2: u64,
        props: &Map<String, Json>,
    ) -> crate::error::Result<u64> {
        let (_, t1, o1) = id::decode(id1);
        let (_, t2, o2) = id::decode(id2);
        let id1_live = self.nodes.get(&t1).map(|s| s.is_live(o1 as u32)).unwrap_or(false);
        let id2_live = self.nodes.get(&t2).map(|s| s.is_live(o2 as u32)).unwrap_or(false);
        if !id1_live || !id2_live {
            return Err(crate::error::Error::invalid_id(format!("{id1} or {id2} not live")));
        }
        let resolved: Vec<(String, value::ScalarKind, Json)> = props
            .iter()
            .filter_map(|(k, v)| {
                let kind = self.rel_types.property_kind(rel_type, k).or_else(|| value::infer_kind(v));
                kind.map(|kind| (k.clone(), kind, v.clone()))
            })
            .collect();
        let store = self.rels.entry(rel_type).or_default();
        let rel_offset = store.insert(id1, id2);
        for (k, kind, v) in &resolved {
            store.properties.set(k, *kind, rel_offset, v);
        }
        self.rel_types.mark_in_use(rel_type);
        let rel_id = id::encode(self.id, rel_type, rel_offset as u64);
        self.nodes.get_mut(&t1).unwrap().outgoing.add(o1 as u32, rel_type, Link { peer: id2, rel_id });
        self.nodes.get_mut(&t2).unwrap().incoming.add(o2 as u32, rel_type, Link { peer: id1, rel_id });
        Ok(rel_id)
    }
}

fn neighbor_ids_for(store: &NodeStore, offset: u32, direction: Direction, rel_type: &TypeFilter) -> Vec<u64> {
    let matches = |t: u16| rel_type.matches(t);
    let mut out = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        for g in store.outgoing.groups(offset, None) {
            if matches(g.rel_type) {
                out.extend(g.links.iter().map(|l| l.peer));
            }
        }
    }
    if matches!(direction, Direction::In | Direction::Both) {
        for g in store.incoming.groups(offset, None) {
            if matches(g.rel_type) {
                out.extend(g.links.iter().map(|l| l.peer));
            }
        }
    }
    out
}

fn degree_for(store: &NodeStore, offset: u32, direction: Direction, rel_type: &TypeFilter) -> usize {
    let mut total = 0;
    if matches!(direction, Direction::Out | Direction::Both) {
        for g in store.outgoing.groups(offset, None) {
            if rel_type.matches(g.rel_type) {
                total += g.links.len();
            }
        }
    }
    if matches!(direction, Direction::In | Direction::Both) {
        for g in store.incoming.groups(offset, None) {
            if rel_type.matches(g.rel_type) {
                total += g.links.len();
            }
        }
    }
    total
}
