//! An in-memory, shard-per-core labeled property graph engine.
//!
//! Data is partitioned across independent single-threaded shards, one per
//! CPU core by default, that cooperate only by asynchronous message
//! passing — there is no shared mutable state across shards. Clients create
//! nodes and relationships with typed properties, traverse by direction and
//! relationship type, filter by property predicate, and run bounded k-hop
//! neighborhood queries, all through the single entry point [`Database`].
//!
//! ```no_run
//! use shardgraph::{Database, DatabaseConfig};
//! use serde_json::json;
//!
//! let db = Database::new(DatabaseConfig::default());
//! let max = db.node_add("Person", "max", json!({"age": 99}).as_object().unwrap().clone()).unwrap();
//! let alex = db.node_add("Person", "alex", Default::default()).unwrap();
//! db.relationship_add("KNOWS", max, alex, Default::default()).unwrap();
//! assert_eq!(db.node_get_degree(max, shardgraph::Direction::Out, Default::default()).unwrap(), 1);
//! ```

pub mod catalog;
pub mod error;
pub mod filter;
pub mod id;
pub mod model;
pub mod router;
pub mod shard;
pub mod storage;
pub mod value;

pub use error::{Error, Result};
pub use filter::Operator;
pub use model::{Direction, NodeRecord, RelationshipRecord, TypeFilter};
pub use router::{Database, DatabaseConfig};
pub use value::{PropertyValue, ScalarKind};
