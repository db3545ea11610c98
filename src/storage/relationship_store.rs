//! Per-type relationship storage: endpoint pairs and property columns.
//!
//! Unlike nodes, relationships have no user-facing key — only the pair of
//! endpoint ids and the relationship's own external id, the latter minted by
//! [`Self::insert`] the same way node offsets are: lowest deleted offset
//! first.

use roaring::RoaringBitmap;

use super::property_store::PropertyStore;

#[derive(Debug, Clone, Copy)]
struct Endpoints {
    node1: u64,
    node2: u64,
}

/// All state for one relationship type on one shard.
#[derive(Debug)]
pub struct RelationshipStore {
    endpoints: Vec<Option<Endpoints>>,
    deleted: RoaringBitmap,
    pub properties: PropertyStore,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            deleted: RoaringBitmap::new(),
            properties: PropertyStore::new(),
        }
    }

    /// Allocate a relationship offset between `node1` and `node2`.
    pub fn insert(&mut self, node1: u64, node2: u64) -> u32 {
        let offset = match self.deleted.min() {
            Some(off) => {
                self.deleted.remove(off);
                off
            }
            None => self.endpoints.len() as u32,
        };
        if offset as usize >= self.endpoints.len() {
            self.endpoints.resize(offset as usize + 1, None);
        }
        self.endpoints[offset as usize] = Some(Endpoints { node1, node2 });
        offset
    }

    /// The `(node1, node2)` pair for a live relationship offset.
    pub fn endpoints_of(&self, offset: u32) -> Option<(u64, u64)> {
        self.endpoints.get(offset as usize)?.map(|e| (e.node1, e.node2))
    }

    /// Tombstone a relationship offset, clearing its properties.
    pub fn delete(&mut self, offset: u32) {
        if offset as usize < self.endpoints.len() {
            self.endpoints[offset as usize] = None;
        }
        self.properties.clear_all(offset);
        self.deleted.insert(offset);
    }

    pub fn is_live(&self, offset: u32) -> bool {
        self.endpoints.get(offset as usize).map(Option::is_some).unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_some()).count()
    }
}

impl Default for RelationshipStore {
    fn default() -> Self {
        Self::new()
    }
}
