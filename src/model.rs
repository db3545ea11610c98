//! Shared record and enum types used across the shard, router, and
//! traversal/filter layers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Adjacency direction filter used throughout traversal and degree queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// An optional relationship-type filter: none, a single type, or a set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    Any,
    One(u16),
    Set(Vec<u16>),
}

impl TypeFilter {
    pub fn matches(&self, rel_type: u16) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::One(t) => *t == rel_type,
            TypeFilter::Set(ts) => ts.contains(&rel_type),
        }
    }
}

/// A fully materialized node, as returned at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub type_name: String,
    pub key: String,
    pub properties: HashMap<String, Json>,
}

/// A fully materialized relationship, as returned at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: u64,
    pub type_name: String,
    pub starting_node_id: u64,
    pub ending_node_id: u64,
    pub properties: HashMap<String, Json>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_filter_any_matches_everything() {
        assert!(TypeFilter::Any.matches(0));
        assert!(TypeFilter::Any.matches(7));
    }

    #[test]
    fn type_filter_set_matches_members_only() {
        let f = TypeFilter::Set(vec![1, 3]);
        assert!(f.matches(1));
        assert!(!f.matches(2));
    }
}
