//! Property-predicate operators and column-at-a-time evaluation.

use serde_json::Value as Json;

use crate::value::{self, PropertyValue, ScalarKind};

/// A property-predicate operator, evaluated column-at-a-time against a
/// declared-kind column. Comparing against a value of a mismatched kind
/// always yields `false`, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    NotIsNull,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Contains,
    NotContains,
}

/// Evaluate `current op needle` where `needle` is coerced into `kind`
/// (the column's declared scalar kind) before comparison. `kind` is `None`
/// when the column has never been written on this shard, in which case
/// every non-null-test operator is vacuously `false`.
pub fn evaluate(op: Operator, kind: Option<ScalarKind>, current: &PropertyValue, needle: &Json) -> bool {
    match op {
        Operator::IsNull => matches!(current, PropertyValue::Null),
        Operator::NotIsNull => !matches!(current, PropertyValue::Null),
        _ => {
            let Some(kind) = kind else { return false };
            let Some(coerced) = value::coerce(kind, needle) else { return false };
            compare(op, current, &coerced)
        }
    }
}

fn as_f64(v: &PropertyValue) -> Option<f64> {
    match v {
        PropertyValue::Int64(i) => Some(*i as f64),
        PropertyValue::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_str(v: &PropertyValue) -> Option<&str> {
    match v {
        PropertyValue::String(s) => Some(s.as_str()),
        _ => None,
    }
}

fn compare(op: Operator, current: &PropertyValue, needle: &PropertyValue) -> bool {
    if let (Some(a), Some(b)) = (as_f64(current), as_f64(needle)) {
        return match op {
            Operator::Eq => a == b,
            Operator::Neq => a != b,
            Operator::Gt => a > b,
            Operator::Gte => a >= b,
            Operator::Lt => a < b,
            Operator::Lte => a <= b,
            _ => false,
        };
    }
    if let (Some(a), Some(b)) = (as_str(current), as_str(needle)) {
        return match op {
            Operator::Eq => a == b,
            Operator::Neq => a != b,
            Operator::Gt => a > b,
            Operator::Gte => a >= b,
            Operator::Lt => a < b,
            Operator::Lte => a <= b,
            Operator::StartsWith => a.starts_with(b),
            Operator::NotStartsWith => !a.starts_with(b),
            Operator::EndsWith => a.ends_with(b),
            Operator::NotEndsWith => !a.ends_with(b),
            Operator::Contains => a.contains(b),
            Operator::NotContains => !a.contains(b),
            _ => false,
        };
    }
    if let (PropertyValue::Bool(a), PropertyValue::Bool(b)) = (current, needle) {
        return match op {
            Operator::Eq => a == b,
            Operator::Neq => a != b,
            _ => false,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ops_promote_int_and_double() {
        let current = PropertyValue::Int64(55);
        assert!(evaluate(Operator::Eq, Some(ScalarKind::Int64), &current, &json!(55)));
        assert!(evaluate(Operator::Gt, Some(ScalarKind::Int64), &current, &json!(50)));
        assert!(!evaluate(Operator::Lt, Some(ScalarKind::Int64), &current, &json!(50)));
    }

    #[test]
    fn string_ops_match_prefix_suffix_substring() {
        let current = PropertyValue::String("alex".to_string());
        assert!(evaluate(Operator::StartsWith, Some(ScalarKind::String), &current, &json!("a")));
        assert!(evaluate(Operator::EndsWith, Some(ScalarKind::String), &current, &json!("x")));
        assert!(evaluate(Operator::Contains, Some(ScalarKind::String), &current, &json!("le")));
        assert!(!evaluate(Operator::StartsWith, Some(ScalarKind::String), &current, &json!("z")));
    }

    #[test]
    fn is_null_tests_presence_regardless_of_kind() {
        assert!(evaluate(Operator::IsNull, None, &PropertyValue::Null, &json!(null)));
        assert!(!evaluate(Operator::NotIsNull, None, &PropertyValue::Null, &json!(null)));
    }

    #[test]
    fn unknown_column_is_vacuously_false_except_null_tests() {
        let current = PropertyValue::Null;
        assert!(!evaluate(Operator::Eq, None, &current, &json!(5)));
    }

    #[test]
    fn mismatched_kind_never_errors_just_false() {
        let current = PropertyValue::String("x".to_string());
        assert!(!evaluate(Operator::Gt, Some(ScalarKind::String), &current, &json!(5)));
    }
}
