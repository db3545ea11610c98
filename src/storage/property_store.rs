//! Columnar property storage for one type (node or relationship).
//!
//! Each declared property is a column: a dense `Vec<PropertyValue>` indexed
//! by offset, paired with a [`RoaringBitmap`] marking which offsets actually
//! hold a value. Reading an offset whose presence bit is clear returns
//! `PropertyValue::Null` regardless of what garbage sits in the backing
//! vector slot (left over from a deleted/recycled offset).

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde_json::Value as Json;

use crate::value::{self, PropertyValue, ScalarKind};

#[derive(Debug)]
struct Column {
    kind: ScalarKind,
    values: Vec<PropertyValue>,
    present: RoaringBitmap,
}

impl Column {
    fn new(kind: ScalarKind) -> Self {
        Self { kind, values: Vec::new(), present: RoaringBitmap::new() }
    }

    fn ensure_len(&mut self, offset: u32) {
        if self.values.len() <= offset as usize {
            self.values.resize(offset as usize + 1, PropertyValue::Null);
        }
    }

    fn set(&mut self, offset: u32, value: PropertyValue) {
        self.ensure_len(offset);
        self.values[offset as usize] = value;
        self.present.insert(offset);
    }

    fn clear(&mut self, offset: u32) {
        if (offset as usize) < self.values.len() {
            self.values[offset as usize] = PropertyValue::Null;
        }
        self.present.remove(offset);
    }

    fn get(&self, offset: u32) -> PropertyValue {
        if self.present.contains(offset) {
            self.values.get(offset as usize).cloned().unwrap_or(PropertyValue::Null)
        } else {
            PropertyValue::Null
        }
    }
}

/// Columnar storage for every property of one type.
#[derive(Debug, Default)]
pub struct PropertyStore {
    columns: HashMap<String, Column>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerce `value` into `kind` and write it into `property` at `offset`.
    /// Returns `false` (and tombstones the cell) if coercion fails.
    pub fn set(&mut self, property: &str, kind: ScalarKind, offset: u32, value: &Json) -> bool {
        let column = self
            .columns
            .entry(property.to_string())
            .or_insert_with(|| Column::new(kind));
        match value::coerce(kind, value) {
            Some(v) => {
                column.set(offset, v);
                true
            }
            None => {
                column.clear(offset);
                false
            }
        }
    }

    /// Read a single property at `offset`; `Null` if absent or never set.
    pub fn get(&self, property: &str, offset: u32) -> PropertyValue {
        self.columns.get(property).map(|c| c.get(offset)).unwrap_or(PropertyValue::Null)
    }

    /// Read every declared property at `offset` as a name -> JSON map,
    /// omitting properties with no value at this offset.
    pub fn get_all(&self, offset: u32) -> HashMap<String, Json> {
        self.columns
            .iter()
            .filter_map(|(name, col)| {
                if col.present.contains(offset) {
                    Some((name.clone(), col.get(offset).to_json()))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Clear every property's value at `offset`, e.g. when the record is
    /// deleted and its offset is recycled.
    pub fn clear_all(&mut self, offset: u32) {
        for column in self.columns.values_mut() {
            column.clear(offset);
        }
    }

    /// Tombstone a single cell, returning whether it held a value.
    pub fn clear_all_for(&mut self, property: &str, offset: u32) -> bool {
        match self.columns.get_mut(property) {
            Some(column) => {
                let existed = column.present.contains(offset);
                column.clear(offset);
                existed
            }
            None => false,
        }
    }

    /// Drop a property's column entirely, e.g. on `deletePropertyType`.
    /// Every offset reads `Null` for this property afterward.
    pub fn clear_column(&mut self, property: &str) {
        self.columns.remove(property);
    }

    /// Declared scalar kind of `property`, if any column exists for it yet.
    pub fn kind_of(&self, property: &str) -> Option<ScalarKind> {
        self.columns.get(property).map(|c| c.kind)
    }

    /// Iterate `(offset, value)` pairs present in `property`'s column, in
    /// ascending offset order. Used by filter scans.
    pub fn iter_column(&self, property: &str) -> Box<dyn Iterator<Item = (u32, PropertyValue)> + '_> {
        match self.columns.get(property) {
            Some(col) => Box::new(col.present.iter().map(move |off| (off, col.get(off)))),
            None => Box::new(std::iter::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let mut store = PropertyStore::new();
        store.set("age", ScalarKind::Int64, 0, &json!(42));
        assert_eq!(store.get("age", 0), PropertyValue::Int64(42));
    }

    #[test]
    fn unset_offset_reads_null() {
        let store = PropertyStore::new();
        assert_eq!(store.get("age", 0), PropertyValue::Null);
    }

    #[test]
    fn coercion_failure_tombstones_cell() {
        let mut store = PropertyStore::new();
        store.set("age", ScalarKind::Int64, 0, &json!(42));
        let ok = store.set("age", ScalarKind::Int64, 0, &json!("not a number"));
        assert!(!ok);
        assert_eq!(store.get("age", 0), PropertyValue::Null);
    }

    #[test]
    fn clear_all_tombstones_every_column_at_offset() {
        let mut store = PropertyStore::new();
        store.set("age", ScalarKind::Int64, 3, &json!(1));
        store.set("name", ScalarKind::String, 3, &json!("max"));
        store.clear_all(3);
        assert_eq!(store.get("age", 3), PropertyValue::Null);
        assert_eq!(store.get("name", 3), PropertyValue::Null);
    }

    #[test]
    fn get_all_omits_absent_properties() {
        let mut store = PropertyStore::new();
        store.set("age", ScalarKind::Int64, 0, &json!(1));
        store.set("age", ScalarKind::Int64, 1, &json!(2));
        store.set("name", ScalarKind::String, 0, &json!("max"));
        let at0 = store.get_all(0);
        assert_eq!(at0.len(), 2);
        let at1 = store.get_all(1);
        assert_eq!(at1.len(), 1);
    }

    #[test]
    fn iter_column_is_ascending_and_skips_absent() {
        let mut store = PropertyStore::new();
        store.set("age", ScalarKind::Int64, 5, &json!(5));
        store.set("age", ScalarKind::Int64, 1, &json!(1));
        let got: Vec<_> = store.iter_column("age").collect();
        assert_eq!(got, vec![(1, PropertyValue::Int64(1)), (5, PropertyValue::Int64(5))]);
    }
}
