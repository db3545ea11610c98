//! Error types for the graph engine.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the graph core.
///
/// Every fallible public operation returns one of these kinds rather than a
/// generic/boxed error; "not found" is represented by a sentinel value (0 id,
/// empty vector, empty record) at the call site, not by an `Error` variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// External id malformed, shard mismatch, or tombstoned.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// Type name has no id on this shard.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// `NodeAdd` with a key that already exists in the type.
    #[error("duplicate key {key:?} for type {type_name:?}")]
    DuplicateKey {
        /// Type the key collided on.
        type_name: String,
        /// The colliding key.
        key: String,
    },

    /// Property redeclared with a different scalar kind.
    #[error("schema conflict on {type_name:?}.{property:?}: already {existing}, got {attempted}")]
    SchemaConflict {
        /// Type the property belongs to.
        type_name: String,
        /// Property name.
        property: String,
        /// Kind already on file.
        existing: String,
        /// Kind the caller attempted to declare.
        attempted: String,
    },

    /// Property value could not be coerced to the declared column kind. The
    /// cell is tombstoned as a side effect of this failure.
    #[error("cannot coerce value for {type_name:?}.{property:?} into {kind}")]
    CoercionFailure {
        /// Type the property belongs to.
        type_name: String,
        /// Property name.
        property: String,
        /// Declared scalar kind the value could not be coerced into.
        kind: String,
    },

    /// Attempt to delete a type with live nodes or relationships.
    #[error("type {0:?} is in use")]
    TypeInUse(String),

    /// A cross-shard protocol aborted partway through; see the protocol step
    /// that failed for whether a half-relationship was left behind.
    #[error("partial cross-shard failure: {0}")]
    PartialCrossShardFailure(String),

    /// The target shard's command channel is closed (its thread ended).
    #[error("shard {0} unavailable")]
    ShardUnavailable(u16),

    /// An invariant was violated in a way callers cannot provoke directly
    /// (e.g. a reply channel dropped without a response).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::InvalidId`].
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Build an [`Error::UnknownType`].
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType(name.into())
    }

    /// Build an [`Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_includes_type_and_key() {
        let err = Error::DuplicateKey {
            type_name: "Person".to_string(),
            key: "max".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Person"));
        assert!(msg.contains("max"));
    }

    #[test]
    fn shard_unavailable_includes_shard_id() {
        let err = Error::ShardUnavailable(7);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn constructors_produce_expected_variants() {
        assert!(matches!(Error::invalid_id("x"), Error::InvalidId(_)));
        assert!(matches!(Error::unknown_type("x"), Error::UnknownType(_)));
        assert!(matches!(Error::internal("x"), Error::Internal(_)));
    }
}
