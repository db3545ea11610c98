//! Shard-local storage: adjacency lists, node/relationship stores, and
//! columnar property storage.

pub mod adjacency;
pub mod node_store;
pub mod property_store;
pub mod relationship_store;
