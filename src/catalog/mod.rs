//! Type and property-schema registries.
//!
//! Node types and relationship types live in two disjoint [`TypeRegistry`]
//! instances: a name may be reused across the two namespaces without
//! collision. Type id `0` is reserved and never handed out — it marks "no
//! type" in contexts that need a sentinel.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::ScalarKind;

/// Bidirectional name <-> id map for one namespace (node types or
/// relationship types). Ids are assigned densely starting at 1 in
/// registration order and are never reused, even after a type is dropped.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    name_to_id: HashMap<String, u16>,
    id_to_name: Vec<String>,
    /// Property schemas per type id, indexed by `type_id - 1`.
    schemas: Vec<HashMap<String, ScalarKind>>,
    /// Types with at least one live node/relationship; `TypeInUse` blocks
    /// removal while true. Indexed like `schemas`.
    in_use: Vec<bool>,
    /// Types removed via `delete`. The id is never reissued; `id_of`/`names`
    /// hide deleted types but `name_of` still resolves them for internal
    /// bookkeeping. Indexed like `schemas`.
    deleted: Vec<bool>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an existing, non-deleted type id by name.
    pub fn id_of(&self, name: &str) -> Option<u16> {
        let id = *self.name_to_id.get(name)?;
        if self.deleted[id as usize - 1] {
            None
        } else {
            Some(id)
        }
    }

    /// Look up a type's name by id.
    pub fn name_of(&self, type_id: u16) -> Option<&str> {
        if type_id == 0 {
            return None;
        }
        self.id_to_name.get(type_id as usize - 1).map(String::as_str)
    }

    /// Register `name` if unseen, returning its id either way. Registering a
    /// name whose previous id was [`delete`](Self::delete)d mints a fresh id
    /// rather than resurrecting the old one — ids are never reused, so a
    /// stale external id from before the delete can never resolve against
    /// whatever is created under the name afterward.
    pub fn get_or_insert(&mut self, name: &str) -> u16 {
        if let Some(&id) = self.name_to_id.get(name) {
            if !self.deleted[id as usize - 1] {
                return id;
            }
        }
        self.id_to_name.push(name.to_string());
        self.schemas.push(HashMap::new());
        self.in_use.push(false);
        self.deleted.push(false);
        let id = self.id_to_name.len() as u16;
        self.name_to_id.insert(name.to_string(), id);
        id
    }

    /// All registered, non-deleted type names, in assignment order.
    pub fn names(&self) -> Vec<&str> {
        self.id_to_name
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.deleted[*i])
            .map(|(_, n)| n.as_str())
            .collect()
    }

    /// Mark `type_id`'s slot empty. The id is never reissued and `name_of`
    /// keeps resolving it, but `id_of`/`names` stop surfacing it.
    pub fn delete(&mut self, type_id: u16) {
        if type_id != 0 {
            self.deleted[type_id as usize - 1] = true;
        }
    }

    /// Mark a type as having at least one live record.
    pub fn mark_in_use(&mut self, type_id: u16) {
        if type_id != 0 {
            self.in_use[type_id as usize - 1] = true;
        }
    }

    /// Clear the in-use flag, e.g. once a type's last record is deleted.
    pub fn clear_in_use(&mut self, type_id: u16) {
        if type_id != 0 {
            self.in_use[type_id as usize - 1] = false;
        }
    }

    /// Reject removing a type that still has live records.
    pub fn check_removable(&self, type_id: u16) -> Result<()> {
        if type_id != 0 && self.in_use[type_id as usize - 1] {
            return Err(Error::TypeInUse(
                self.name_of(type_id).unwrap_or("?").to_string(),
            ));
        }
        Ok(())
    }

    /// Declare (or confirm) a property's scalar kind on a type. A second
    /// declaration with a different kind is a [`Error::SchemaConflict`]; the
    /// same kind declared twice is a no-op.
    pub fn declare_property(
        &mut self,
        type_id: u16,
        property: &str,
        kind: ScalarKind,
    ) -> Result<()> {
        let type_name = self.name_of(type_id).unwrap_or("?").to_string();
        let schema = &mut self.schemas[type_id as usize - 1];
        match schema.get(property) {
            Some(existing) if *existing != kind => Err(Error::SchemaConflict {
                type_name,
                property: property.to_string(),
                existing: existing.name().to_string(),
                attempted: kind.name().to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                schema.insert(property.to_string(), kind);
                Ok(())
            }
        }
    }

    /// The declared kind of `property` on `type_id`, if any.
    pub fn property_kind(&self, type_id: u16, property: &str) -> Option<ScalarKind> {
        self.schemas.get(type_id as usize - 1)?.get(property).copied()
    }

    /// Remove a property's schema declaration entirely. A later
    /// `declare_property` call for the same name is free to pick a new kind.
    pub fn remove_property(&mut self, type_id: u16, property: &str) {
        if let Some(schema) = self.schemas.get_mut(type_id as usize - 1) {
            schema.remove(property);
        }
    }

    /// All declared properties for a type, as `(name, kind)` pairs.
    pub fn properties_of(&self, type_id: u16) -> Vec<(&str, ScalarKind)> {
        self.schemas
            .get(type_id as usize - 1)
            .map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_is_idempotent() {
        let mut reg = TypeRegistry::new();
        let a = reg.get_or_insert("Person");
        let b = reg.get_or_insert("Person");
        assert_eq!(a, b);
        assert_eq!(a, 1);
    }

    #[test]
    fn ids_assigned_densely_from_one() {
        let mut reg = TypeRegistry::new();
        assert_eq!(reg.get_or_insert("Person"), 1);
        assert_eq!(reg.get_or_insert("Company"), 2);
        assert_eq!(reg.name_of(1), Some("Person"));
        assert_eq!(reg.name_of(2), Some("Company"));
    }

    #[test]
    fn zero_is_never_a_valid_name_lookup() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.name_of(0), None);
    }

    #[test]
    fn schema_conflict_on_kind_change() {
        let mut reg = TypeRegistry::new();
        let t = reg.get_or_insert("Person");
        reg.declare_property(t, "age", ScalarKind::Int64).unwrap();
        let err = reg.declare_property(t, "age", ScalarKind::String).unwrap_err();
        assert!(matches!(err, Error::SchemaConflict { .. }));
    }

    #[test]
    fn repeated_same_kind_is_ok() {
        let mut reg = TypeRegistry::new();
        let t = reg.get_or_insert("Person");
        reg.declare_property(t, "age", ScalarKind::Int64).unwrap();
        reg.declare_property(t, "age", ScalarKind::Int64).unwrap();
    }

    #[test]
    fn delete_hides_name_but_keeps_id_resolvable() {
        let mut reg = TypeRegistry::new();
        let t = reg.get_or_insert("Person");
        reg.delete(t);
        assert_eq!(reg.id_of("Person"), None);
        assert_eq!(reg.name_of(t), Some("Person"));
        assert!(!reg.names().contains(&"Person"));
    }

    #[test]
    fn reinserting_a_deleted_name_mints_a_fresh_id() {
        let mut reg = TypeRegistry::new();
        let first = reg.get_or_insert("Person");
        reg.delete(first);
        let second = reg.get_or_insert("Person");
        assert_ne!(first, second);
        assert_eq!(reg.id_of("Person"), Some(second));
    }

    #[test]
    fn type_in_use_blocks_removal() {
        let mut reg = TypeRegistry::new();
        let t = reg.get_or_insert("Person");
        reg.mark_in_use(t);
        assert!(reg.check_removable(t).is_err());
        reg.clear_in_use(t);
        assert!(reg.check_removable(t).is_ok());
    }
}
