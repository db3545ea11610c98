//! Per-type node storage: keys, property columns, and adjacency lists.
//!
//! Deleted offsets are tracked in a [`RoaringBitmap`] and the lowest deleted
//! offset is always reused first, so long-lived shards don't grow the
//! backing vectors past their live node count.

use std::collections::HashMap;

use roaring::RoaringBitmap;

use super::adjacency::Adjacency;
use super::property_store::PropertyStore;

/// All state for one node type on one shard.
#[derive(Debug)]
pub struct NodeStore {
    keys: Vec<Option<String>>,
    key_to_offset: HashMap<String, u32>,
    deleted: RoaringBitmap,
    pub properties: PropertyStore,
    pub outgoing: Adjacency,
    pub incoming: Adjacency,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            key_to_offset: HashMap::new(),
            deleted: RoaringBitmap::new(),
            properties: PropertyStore::new(),
            outgoing: Adjacency::new(),
            incoming: Adjacency::new(),
        }
    }

    /// Offset already assigned to `key`, if it exists and is live.
    pub fn offset_of(&self, key: &str) -> Option<u32> {
        self.key_to_offset.get(key).copied()
    }

    /// Key assigned to `offset`, if live.
    pub fn key_of(&self, offset: u32) -> Option<&str> {
        self.keys.get(offset as usize).and_then(|k| k.as_deref())
    }

    /// Allocate a fresh offset for `key`, reusing the lowest deleted offset
    /// if one is available. Caller must have already checked `key` is
    /// unused via [`Self::offset_of`].
    pub fn insert(&mut self, key: &str) -> u32 {
        let offset = match self.deleted.min() {
            Some(off) => {
                self.deleted.remove(off);
                off
            }
            None => self.keys.len() as u32,
        };
        if offset as usize >= self.keys.len() {
            self.keys.resize(offset as usize + 1, None);
        }
        self.keys[offset as usize] = Some(key.to_string());
        self.key_to_offset.insert(key.to_string(), offset);
        offset
    }

    /// Tombstone `offset`: clears its key mapping, properties, and
    /// adjacency, and marks it for reuse. The caller is responsible for
    /// having already detached cross-references (links from peer nodes).
    pub fn delete(&mut self, offset: u32) {
        if let Some(key) = self.keys.get_mut(offset as usize).and_then(Option::take) {
            self.key_to_offset.remove(&key);
        }
        self.properties.clear_all(offset);
        self.outgoing.clear(offset);
        self.incoming.clear(offset);
        self.deleted.insert(offset);
    }

    /// Whether `offset` currently holds a live node.
    pub fn is_live(&self, offset: u32) -> bool {
        self.keys.get(offset as usize).map(Option::is_some).unwrap_or(false)
    }

    /// Number of live nodes of this type.
    pub fn count(&self) -> usize {
        self.keys.iter().filter(|k| k.is_some()).count()
    }

    /// Live offsets in ascending order.
    pub fn live_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.as_ref().map(|_| i as u32))
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}
