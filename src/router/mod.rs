//! `Database`: the peered router that turns client calls into local shard
//! commands or multi-step cross-shard protocols.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Sender};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::id;
use crate::model::{Direction, NodeRecord, RelationshipRecord, TypeFilter};
use crate::shard::{self, Namespace, ShardCommand, ShardHandle};
use crate::value::{self, ScalarKind};

/// Tunables with no single prescribed value in the spec (see DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct DatabaseConfig {
    /// Number of shards; defaults to the host's core count.
    pub shard_count: u16,
    /// Bound on each shard's command channel.
    pub channel_capacity: usize,
    /// How many frontier elements a bulk scan processes before yielding.
    pub yield_every: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            shard_count: num_cpus::get().clamp(1, 1023) as u16,
            channel_capacity: 4096,
            yield_every: 4096,
        }
    }
}

/// The shard-per-core graph database. Cheap to clone-share via `&Database`;
/// all mutable state lives on the shard threads, not here.
pub struct Database {
    handles: Vec<ShardHandle>,
    shard_count: u16,
}

impl Database {
    /// Start `config.shard_count` shard threads.
    pub fn new(config: DatabaseConfig) -> Self {
        let handles = (0..config.shard_count)
            .map(|id| shard::spawn(id, config.shard_count, config.channel_capacity, config.yield_every))
            .collect();
        Database { handles, shard_count: config.shard_count }
    }

    pub fn shard_count(&self) -> u16 {
        self.shard_count
    }

    /// Shut every shard thread down and join it. Blocks until all threads
    /// have exited.
    pub fn shutdown(mut self) {
        for handle in &self.handles {
            let _ = handle.sender.send(ShardCommand::Shutdown);
        }
        for handle in &mut self.handles {
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
        }
    }

    fn call<T: Send + 'static>(
        &self,
        shard: u16,
        build: impl FnOnce(Sender<T>) -> ShardCommand,
    ) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.handles[shard as usize]
            .sender
            .send(build(tx))
            .map_err(|_| Error::ShardUnavailable(shard))?;
        rx.recv().map_err(|_| Error::ShardUnavailable(shard))
    }

    fn broadcast<F>(&self, mut build: F) -> Result<()>
    where
        F: FnMut(Sender<()>) -> ShardCommand,
    {
        for shard in 0..self.shard_count {
            self.call(shard, |reply| build(reply))?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Type management
    // ---------------------------------------------------------------

    fn type_insert(&self, namespace: Namespace, name: &str) -> Result<u16> {
        let id = self.call(0, |reply| ShardCommand::GetOrInsertType {
            namespace,
            name: name.to_string(),
            reply,
        })?;
        self.broadcast(|reply| ShardCommand::ApplyTypeInsert {
            namespace,
            name: name.to_string(),
            id,
            reply,
        })?;
        Ok(id)
    }

    fn type_get(&self, namespace: Namespace, name: &str) -> Result<Option<u16>> {
        self.call(0, |reply| ShardCommand::ReadTypeId { namespace, name: name.to_string(), reply })
    }

    fn type_name(&self, namespace: Namespace, type_id: u16) -> Result<Option<String>> {
        self.call(0, |reply| ShardCommand::ReadTypeName { namespace, type_id, reply })
    }

    fn type_names(&self, namespace: Namespace) -> Result<Vec<String>> {
        self.call(0, |reply| ShardCommand::ReadTypeNames { namespace, reply })
    }

    fn type_count(&self, namespace: Namespace, type_id: u16) -> Result<usize> {
        let mut total = 0;
        for shard in 0..self.shard_count {
            total += match namespace {
                Namespace::Node => self.call(shard, |reply| ShardCommand::NodeTypeCount { type_id, reply })?,
                Namespace::Relationship => {
                    self.call(shard, |reply| ShardCommand::RelTypeCount { type_id, reply })?
                }
            };
        }
        Ok(total)
    }

    fn type_delete(&self, namespace: Namespace, name: &str) -> Result<()> {
        let type_id = self.type_get(namespace, name)?.ok_or_else(|| Error::unknown_type(name))?;
        for shard in 0..self.shard_count {
            if self.call(shard, |reply| ShardCommand::IsTypeInUse { namespace, type_id, reply })? {
                return Err(Error::TypeInUse(name.to_string()));
            }
        }
        tracing::debug!(name, type_id, "deleting type");
        self.broadcast(|reply| ShardCommand::ApplyTypeDelete { namespace, type_id, reply })
    }

    pub fn node_type_insert(&self, name: &str) -> Result<u16> {
        self.type_insert(Namespace::Node, name)
    }

    pub fn node_type_get(&self, name: &str) -> Result<Option<u16>> {
        self.type_get(Namespace::Node, name)
    }

    pub fn node_type_name(&self, type_id: u16) -> Result<Option<String>> {
        self.type_name(Namespace::Node, type_id)
    }

    pub fn node_type_names(&self) -> Result<Vec<String>> {
        self.type_names(Namespace::Node)
    }

    pub fn node_type_count(&self, type_id: u16) -> Result<usize> {
        self.type_count(Namespace::Node, type_id)
    }

    pub fn node_type_delete(&self, name: &str) -> Result<()> {
        self.type_delete(Namespace::Node, name)
    }

    pub fn relationship_type_insert(&self, name: &str) -> Result<u16> {
        self.type_insert(Namespace::Relationship, name)
    }

    pub fn relationship_type_get(&self, name: &str) -> Result<Option<u16>> {
        self.type_get(Namespace::Relationship, name)
    }

    pub fn relationship_type_name(&self, type_id: u16) -> Result<Option<String>> {
        self.type_name(Namespace::Relationship, type_id)
    }

    pub fn relationship_type_names(&self) -> Result<Vec<String>> {
        self.type_names(Namespace::Relationship)
    }

    pub fn relationship_type_count(&self, type_id: u16) -> Result<usize> {
        self.type_count(Namespace::Relationship, type_id)
    }

    pub fn relationship_type_delete(&self, name: &str) -> Result<()> {
        self.type_delete(Namespace::Relationship, name)
    }

    // ---------------------------------------------------------------
    // Property schema
    // ---------------------------------------------------------------

    fn property_type_add(&self, namespace: Namespace, type_id: u16, name: &str, kind: ScalarKind) -> Result<()> {
        // The coordinator is authoritative for conflict detection; a
        // schema-conflict here aborts before any shard is touched.
        self.call(0, |reply| ShardCommand::DeclareProperty {
            namespace,
            type_id,
            name: name.to_string(),
            kind,
            reply,
        })??;
        for shard in 1..self.shard_count {
            self.call(shard, |reply| ShardCommand::DeclareProperty {
                namespace,
                type_id,
                name: name.to_string(),
                kind,
                reply,
            })??;
        }
        Ok(())
    }

    fn property_kind(&self, namespace: Namespace, type_id: u16, name: &str) -> Result<Option<ScalarKind>> {
        self.call(0, |reply| ShardCommand::ReadPropertyKind {
            namespace,
            type_id,
            name: name.to_string(),
            reply,
        })
    }

    /// Resolve `name`'s declared kind, or infer and declare one from
    /// `value`'s shape if this is the first time it's been written.
    fn ensure_property(&self, namespace: Namespace, type_id: u16, name: &str, value: &Json) -> Result<Option<ScalarKind>> {
        if let Some(kind) = self.property_kind(namespace, type_id, name)? {
            return Ok(Some(kind));
        }
        match value::infer_kind(value) {
            Some(kind) => {
                self.property_type_add(namespace, type_id, name, kind)?;
                Ok(Some(kind))
            }
            None => Ok(None),
        }
    }

    fn property_type_delete(&self, namespace: Namespace, type_id: u16, name: &str) -> Result<()> {
        self.broadcast(|reply| ShardCommand::ApplyDeleteProperty {
            namespace,
            type_id,
            name: name.to_string(),
            reply,
        })
    }

    pub fn node_property_type_add(&self, type_id: u16, name: &str, kind: ScalarKind) -> Result<()> {
        self.property_type_add(Namespace::Node, type_id, name, kind)
    }

    pub fn node_property_type_get(&self, type_id: u16, name: &str) -> Result<Option<ScalarKind>> {
        self.property_kind(Namespace::Node, type_id, name)
    }

    pub fn node_property_type_delete(&self, type_id: u16, name: &str) -> Result<()> {
        self.property_type_delete(Namespace::Node, type_id, name)
    }

    pub fn relationship_property_type_add(&self, type_id: u16, name: &str, kind: ScalarKind) -> Result<()> {
        self.property_type_add(Namespace::Relationship, type_id, name, kind)
    }

    pub fn relationship_property_type_get(&self, type_id: u16, name: &str) -> Result<Option<ScalarKind>> {
        self.property_kind(Namespace::Relationship, type_id, name)
    }

    pub fn relationship_property_type_delete(&self, type_id: u16, name: &str) -> Result<()> {
        self.property_type_delete(Namespace::Relationship, type_id, name)
    }

    fn resolve_properties(&self, namespace: Namespace, type_id: u16, props: &Map<String, Json>) -> Result<Vec<(String, ScalarKind, Json)>> {
        let mut out = Vec::with_capacity(props.len());
        for (name, value) in props.iter() {
            if let Some(kind) = self.ensure_property(namespace, type_id, name, value)? {
                out.push((name.clone(), kind, value.clone()));
            }
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Node CRUD
    // ---------------------------------------------------------------

    pub fn node_add(&self, type_name: &str, key: &str, props: Map<String, Json>) -> Result<u64> {
        let type_id = self.node_type_insert(type_name)?;
        let resolved = self.resolve_properties(Namespace::Node, type_id, &props)?;
        let mut json_props = Map::new();
        for (name, _, value) in resolved {
            json_props.insert(name, value);
        }
        let shard = id::shard_for_key(type_name, key, self.shard_count);
        self.call(shard, |reply| ShardCommand::NodeAdd { type_id, key: key.to_string(), props: json_props, reply })?
    }

    pub fn node_add_empty(&self, type_name: &str, key: &str) -> Result<u64> {
        self.node_add(type_name, key, Map::new())
    }

    /// Add many `(key, props)` pairs of `type_name`. Duplicate keys within
    /// the batch keep only the first insert; later duplicates yield `0`.
    pub fn node_add_many(&self, type_name: &str, entries: Vec<(String, Map<String, Json>)>) -> Result<Vec<u64>> {
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::with_capacity(entries.len());
        for (key, props) in entries {
            if !seen.insert(key.clone()) {
                ids.push(0);
                continue;
            }
            ids.push(self.node_add(type_name, &key, props).unwrap_or(0));
        }
        Ok(ids)
    }

    pub fn node_get(&self, id: u64) -> Result<Option<NodeRecord>> {
        if id == 0 {
            return Ok(None);
        }
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeGetById { id, reply })
    }

    pub fn node_get_id(&self, type_name: &str, key: &str) -> Result<u64> {
        let Some(type_id) = self.node_type_get(type_name)? else { return Ok(0) };
        let shard = id::shard_for_key(type_name, key, self.shard_count);
        let got = self.call(shard, |reply| ShardCommand::NodeGetIdByKey { type_id, key: key.to_string(), reply })?;
        Ok(got.unwrap_or(0))
    }

    pub fn node_get_key(&self, id: u64) -> Result<Option<String>> {
        if id == 0 {
            return Ok(None);
        }
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeGetKey { id, reply })
    }

    pub fn node_get_type_id(&self, id: u64) -> u16 {
        crate::id::type_of(id)
    }

    pub fn node_get_property(&self, id: u64, property: &str) -> Result<value::PropertyValue> {
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeGetProperty {
            id,
            property: property.to_string(),
            reply,
        })
    }

    pub fn node_set_property(&self, id: u64, property: &str, value: Json) -> Result<bool> {
        let type_id = crate::id::type_of(id);
        let Some(kind) = self.ensure_property(Namespace::Node, type_id, property, &value)? else { return Ok(false) };
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeSetProperty {
            id,
            property: property.to_string(),
            kind,
            value,
            reply,
        })
    }

    pub fn node_set_properties_from_json(&self, id: u64, props: Map<String, Json>) -> Result<()> {
        let type_id = crate::id::type_of(id);
        let resolved = self.resolve_properties(Namespace::Node, type_id, &props)?;
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeSetPropertiesFromJson { id, values: resolved, reply })
    }

    pub fn node_reset_properties_from_json(&self, id: u64, props: Map<String, Json>) -> Result<()> {
        let type_id = crate::id::type_of(id);
        let resolved = self.resolve_properties(Namespace::Node, type_id, &props)?;
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeResetPropertiesFromJson { id, values: resolved, reply })
    }

    pub fn node_delete_property(&self, id: u64, property: &str) -> Result<bool> {
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeDeleteProperty {
            id,
            property: property.to_string(),
            reply,
        })
    }

    pub fn node_delete_properties(&self, id: u64) -> Result<()> {
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeDeleteProperties { id, reply })
    }

    pub fn node_get_degree(&self, id: u64, direction: Direction, rel_type: TypeFilter) -> Result<usize> {
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeGetDegree { id, direction, rel_type, reply })
    }

    pub fn node_get_neighbor_ids(&self, id: u64, direction: Direction, rel_type: TypeFilter) -> Result<Vec<u64>> {
        self.call(crate::id::shard_of(id), |reply| ShardCommand::NodeNeighborIds { id, direction, rel_type, reply })
    }

    /// Four-step cross-shard node removal (§4.7): collect the node's links,
    /// tell every peer shard to drop its half of each link (tombstoning the
    /// relationship record wherever it lives), then tombstone the node
    /// itself. Returns `false` if `id` was already gone.
    pub fn node_remove(&self, id: u64) -> Result<bool> {
        if id == 0 {
            return Ok(false);
        }
        if self.node_get(id)?.is_none() {
            return Ok(false);
        }
        let owner = crate::id::shard_of(id);
        let (outgoing, incoming) = self.call(owner, |reply| ShardCommand::NodeCollectLinksForRemoval { id, reply })?;

        for (rel_type, links) in &outgoing {
            for link in links {
                let peer_shard = crate::id::shard_of(link.peer);
                self.call(peer_shard, |reply| ShardCommand::RemoveIncomingLink {
                    at_node: link.peer,
                    rel_type: *rel_type,
                    peer: id,
                    rel_id: link.rel_id,
                    reply,
                })?;
            }
        }

        for (rel_type, links) in &incoming {
            for link in links {
                let peer_shard = crate::id::shard_of(link.peer);
                self.call(peer_shard, |reply| ShardCommand::RemoveOutgoingLinkAndTombstoneRel {
                    at_node: link.peer,
                    rel_type: *rel_type,
                    peer: id,
                    rel_id: link.rel_id,
                    reply,
                })?;
            }
        }

        self.call(owner, |reply| ShardCommand::NodeFinalizeRemoval { id, reply })?;
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Relationship CRUD
    // ---------------------------------------------------------------

    pub fn relationship_add(&self, type_name: &str, id1: u64, id2: u64, props: Map<String, Json>) -> Result<u64> {
        let type_id = self.relationship_type_insert(type_name)?;
        let resolved = self.resolve_properties(Namespace::Relationship, type_id, &props)?;
        let mut json_props = Map::new();
        for (name, _, value) in resolved {
            json_props.insert(name, value);
        }

        let shard1 = crate::id::shard_of(id1);
        let shard2 = crate::id::shard_of(id2);
        if shard1 == shard2 {
            return self.call(shard1, |reply| ShardCommand::RelAddLocal {
                rel_type: type_id,
                id1,
                id2,
                props: json_props,
                reply,
            })?;
        }

        if !self.call(shard2, |reply| ShardCommand::RelPreflight { id2, reply })? {
            return Ok(0);
        }
        let rel_id = self.call(shard1, |reply| ShardCommand::RelCreateAndOutgoing {
            rel_type: type_id,
            id1,
            id2,
            props: json_props,
            reply,
        })?;
        if rel_id == 0 {
            return Ok(0);
        }
        let ok = self.call(shard2, |reply| ShardCommand::RelAddIncoming { id2, rel_type: type_id, rel_id, id1, reply })?;
        if !ok {
            tracing::warn!(rel_id, shard1, shard2, "half-relationship left behind: incoming side failed");
            return Err(Error::PartialCrossShardFailure(format!(
                "relationship {rel_id} created on shard {shard1} but incoming side on shard {shard2} failed; re-issue RelationshipRemove({rel_id}) to clean up"
            )));
        }
        Ok(rel_id)
    }

    pub fn relationship_get(&self, rel_id: u64) -> Result<Option<RelationshipRecord>> {
        if rel_id == 0 {
            return Ok(None);
        }
        self.call(crate::id::shard_of(rel_id), |reply| ShardCommand::RelGet { rel_id, reply })
    }

    pub fn relationship_get_property(&self, rel_id: u64, property: &str) -> Result<value::PropertyValue> {
        self.call(crate::id::shard_of(rel_id), |reply| ShardCommand::RelGetProperty {
            rel_id,
            property: property.to_string(),
            reply,
        })
    }

    pub fn relationship_set_property(&self, rel_id: u64, property: &str, value: Json) -> Result<bool> {
        let type_id = crate::id::type_of(rel_id);
        let Some(kind) = self.ensure_property(Namespace::Relationship, type_id, property, &value)? else { return Ok(false) };
        self.call(crate::id::shard_of(rel_id), |reply| ShardCommand::RelSetProperty {
            rel_id,
            property: property.to_string(),
            kind,
            value,
            reply,
        })
    }

    pub fn relationship_delete_property(&self, rel_id: u64, property: &str) -> Result<bool> {
        self.call(crate::id::shard_of(rel_id), |reply| ShardCommand::RelDeleteProperty {
            rel_id,
            property: property.to_string(),
            reply,
        })
    }

    pub fn relationship_delete_properties(&self, rel_id: u64) -> Result<()> {
        self.call(crate::id::shard_of(rel_id), |reply| ShardCommand::RelDeleteProperties { rel_id, reply })
    }

    /// Two-step cross-shard relationship removal (§4.7).
    pub fn relationship_remove(&self, rel_id: u64) -> Result<bool> {
        if rel_id == 0 {
            return Ok(false);
        }
        let shard1 = crate::id::shard_of(rel_id);
        let Some((rel_type, id1, id2)) = self.call(shard1, |reply| ShardCommand::RelRemoveStep1 { rel_id, reply })? else {
            return Ok(false);
        };
        let shard2 = crate::id::shard_of(id2);
        self.call(shard2, |reply| ShardCommand::RelRemoveStep2 { id2, rel_type, id1, rel_id, reply })?;
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    /// Neighbor ids reachable from `ids` in one hop, merged via bitmap union.
    fn neighbors_of(&self, frontier: &roaring::RoaringTreemap, direction: Direction, rel_type: &TypeFilter) -> Result<roaring::RoaringTreemap> {
        let mut by_shard: HashMap<u16, Vec<u64>> = HashMap::new();
        for node_id in frontier.iter() {
            by_shard.entry(crate::id::shard_of(node_id)).or_default().push(node_id);
        }
        let mut result = roaring::RoaringTreemap::new();
        for (shard, ids) in by_shard {
            let got = self.call(shard, |reply| ShardCommand::NeighborIdsBulk {
                ids,
                direction,
                rel_type: rel_type.clone(),
                reply,
            })?;
            result |= got;
        }
        Ok(result)
    }

    /// `KHopIds(start, hops, direction, rel_type)`: nodes reachable in
    /// 1..=hops hops, excluding `start`.
    pub fn k_hop_ids(&self, start: u64, hops: u32, direction: Direction, rel_type: TypeFilter) -> Result<roaring::RoaringTreemap> {
        let mut seen = roaring::RoaringTreemap::new();
        let mut current = roaring::RoaringTreemap::new();
        current.insert(start);
        for _ in 0..hops {
            current -= &seen;
            if current.is_empty() {
                break;
            }
            seen |= &current;
            current = self.neighbors_of(&current, direction, &rel_type)?;
            std::thread::yield_now();
        }
        let mut result = seen | current;
        result.remove(start);
        Ok(result)
    }

    pub fn k_hop_count(&self, start: u64, hops: u32, direction: Direction, rel_type: TypeFilter) -> Result<u64> {
        Ok(self.k_hop_ids(start, hops, direction, rel_type)?.len())
    }

    /// Illustrative combinator-style triangle count for `rel_type`: builds
    /// global `outs`/`ins` maps across every shard, then for each `v` and
    /// `b` in `outs[v]`, adds `|outs[b] ∩ ins[v]|`.
    pub fn triangle_count(&self, rel_type: u16) -> Result<u64> {
        let mut outs: HashMap<u64, Vec<u64>> = HashMap::new();
        let mut ins: HashMap<u64, Vec<u64>> = HashMap::new();
        for shard in 0..self.shard_count {
            let (shard_outs, shard_ins) = self.call(shard, |reply| ShardCommand::OutsInsSnapshot { rel_type, reply })?;
            outs.extend(shard_outs);
            ins.extend(shard_ins);
        }
        for v in outs.values_mut() {
            v.sort_unstable();
        }
        for v in ins.values_mut() {
            v.sort_unstable();
        }
        let mut count = 0u64;
        for (v, out_v) in &outs {
            for b in out_v {
                if let (Some(out_b), Some(in_v)) = (outs.get(b), ins.get(v)) {
                    count += intersection_len(out_b, in_v);
                }
            }
        }
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Filter
    // ---------------------------------------------------------------

    /// `FindNodeIds(type, property, op, value, skip, limit)`: scans every
    /// shard's column, each shard stopping once it has `skip+limit` matches,
    /// then the initiator concatenates in shard order and applies the global
    /// skip/limit.
    pub fn find_node_ids(
        &self,
        type_id: u16,
        property: &str,
        op: crate::filter::Operator,
        value: Json,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let budget = skip.saturating_add(limit);
        let mut all = Vec::new();
        for shard in 0..self.shard_count {
            let got = self.call(shard, |reply| ShardCommand::FindIdsLocal {
                type_id,
                property: property.to_string(),
                op,
                value: value.clone(),
                budget,
                reply,
            })?;
            all.extend(got);
        }
        Ok(all.into_iter().skip(skip).take(limit).collect())
    }

    pub fn find_node_count(&self, type_id: u16, property: &str, op: crate::filter::Operator, value: Json) -> Result<usize> {
        Ok(self.find_node_ids(type_id, property, op, value, 0, usize::MAX)?.len())
    }
}

fn intersection_len(sorted_a: &[u64], sorted_b: &[u64]) -> u64 {
    let (mut i, mut j, mut count) = (0usize, 0usize, 0u64);
    while i < sorted_a.len() && j < sorted_b.len() {
        match sorted_a[i].cmp(&sorted_b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}
