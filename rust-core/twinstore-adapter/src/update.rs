// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Tagged update values and mutation options.
//
// Callers choose at the call site between merging a set of fields
// (`Update::Set`) and applying explicit operations (`Update::Ops`). Neither
// form ever replaces a whole document, and both render to the same operator
// object on the wire.

use serde_json::{Map, Number, Value};

use crate::document::{Document, INTERNAL_ID_FIELD};
use crate::error::{StoreError, StoreResult};

const SET: &str = "$set";
const UNSET: &str = "$unset";
const INC: &str = "$inc";
const PUSH: &str = "$push";

/// A single field operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Set `field` to `value`, creating intermediate objects for dotted paths.
    Set { field: String, value: Value },
    /// Remove `field`.
    Unset { field: String },
    /// Add `by` to a numeric field (missing fields count as zero).
    Inc { field: String, by: Number },
    /// Append `value` to an array field (missing fields become `[value]`).
    Push { field: String, value: Value },
}

impl UpdateOp {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn unset(field: impl Into<String>) -> Self {
        UpdateOp::Unset {
            field: field.into(),
        }
    }

    pub fn inc(field: impl Into<String>, by: impl Into<Number>) -> Self {
        UpdateOp::Inc {
            field: field.into(),
            by: by.into(),
        }
    }

    pub fn push(field: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Push {
            field: field.into(),
            value: value.into(),
        }
    }

    fn field(&self) -> &str {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Unset { field }
            | UpdateOp::Inc { field, .. }
            | UpdateOp::Push { field, .. } => field,
        }
    }
}

/// An update applied to every document matched by a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Merge these fields into the document; other fields are untouched.
    Set(Document),
    /// Apply these operations in order.
    Ops(Vec<UpdateOp>),
}

impl Update {
    /// Every field path written or removed by this update.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Update::Set(fields) => fields.keys().map(String::as_str).collect(),
            Update::Ops(ops) => ops.iter().map(UpdateOp::field).collect(),
        }
    }

    /// Reject updates that would touch the storage-internal identifier.
    pub fn validate(&self) -> StoreResult<()> {
        for field in self.fields() {
            let root = field.split('.').next().unwrap_or(field);
            if root == INTERNAL_ID_FIELD {
                return Err(StoreError::InvalidArgument(
                    "the storage-internal `_id` cannot be modified".to_string(),
                ));
            }
            if field.is_empty() || root.starts_with('$') {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid field name `{field}` in update"
                )));
            }
        }
        Ok(())
    }

    /// Apply the update to a document in place.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<()> {
        self.validate()?;
        match self {
            Update::Set(fields) => {
                for (field, value) in fields {
                    set_path(doc, field, value.clone())?;
                }
            }
            Update::Ops(ops) => {
                for op in ops {
                    apply_op(doc, op)?;
                }
            }
        }
        Ok(())
    }

    /// Operator-object wire form: `{"$set": {...}, "$unset": {...}, ...}`.
    pub fn to_wire(&self) -> Value {
        let mut wire = Map::new();
        match self {
            Update::Set(fields) => {
                wire.insert(SET.to_string(), Value::Object(fields.clone()));
            }
            Update::Ops(ops) => {
                for op in ops {
                    let (operator, field, value) = match op {
                        UpdateOp::Set { field, value } => (SET, field, value.clone()),
                        UpdateOp::Unset { field } => (UNSET, field, Value::String(String::new())),
                        UpdateOp::Inc { field, by } => (INC, field, Value::Number(by.clone())),
                        UpdateOp::Push { field, value } => (PUSH, field, value.clone()),
                    };
                    if let Value::Object(group) = wire
                        .entry(operator.to_string())
                        .or_insert_with(|| Value::Object(Map::new()))
                    {
                        group.insert(field.clone(), value);
                    }
                }
            }
        }
        Value::Object(wire)
    }

    /// Parse an operator object. A plain object without operators is read
    /// as a field merge.
    pub fn from_wire(value: &Value) -> StoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidArgument(format!("update must be an object, got {value}"))
        })?;
        if !object.keys().any(|key| key.starts_with('$')) {
            return Ok(Update::Set(object.clone()));
        }

        let mut ops = Vec::new();
        for (operator, group) in object {
            let group = group.as_object().ok_or_else(|| {
                StoreError::InvalidArgument(format!("`{operator}` expects an object"))
            })?;
            for (field, value) in group {
                let op = match operator.as_str() {
                    SET => UpdateOp::set(field.clone(), value.clone()),
                    UNSET => UpdateOp::unset(field.clone()),
                    PUSH => UpdateOp::push(field.clone(), value.clone()),
                    INC => match value {
                        Value::Number(by) => UpdateOp::Inc {
                            field: field.clone(),
                            by: by.clone(),
                        },
                        other => {
                            return Err(StoreError::InvalidArgument(format!(
                                "`$inc` on `{field}` expects a number, got {other}"
                            )))
                        }
                    },
                    other => {
                        return Err(StoreError::InvalidArgument(format!(
                            "unsupported update operator `{other}`"
                        )))
                    }
                };
                ops.push(op);
            }
        }
        Ok(Update::Ops(ops))
    }
}

fn apply_op(doc: &mut Document, op: &UpdateOp) -> StoreResult<()> {
    match op {
        UpdateOp::Set { field, value } => set_path(doc, field, value.clone()),
        UpdateOp::Unset { field } => {
            unset_path(doc, field);
            Ok(())
        }
        UpdateOp::Inc { field, by } => {
            let current = crate::document::lookup(doc, field).cloned();
            let next = match current {
                None | Some(Value::Null) => Value::Number(by.clone()),
                Some(Value::Number(current)) => add_numbers(&current, by),
                Some(other) => {
                    return Err(StoreError::InvalidArgument(format!(
                        "cannot `$inc` non-numeric field `{field}` (value {other})"
                    )))
                }
            };
            set_path(doc, field, next)
        }
        UpdateOp::Push { field, value } => {
            let current = crate::document::lookup(doc, field).cloned();
            let next = match current {
                None | Some(Value::Null) => Value::Array(vec![value.clone()]),
                Some(Value::Array(mut items)) => {
                    items.push(value.clone());
                    Value::Array(items)
                }
                Some(other) => {
                    return Err(StoreError::InvalidArgument(format!(
                        "cannot `$push` onto non-array field `{field}` (value {other})"
                    )))
                }
            };
            set_path(doc, field, next)
        }
    }
}

fn add_numbers(current: &Number, by: &Number) -> Value {
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + by.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or(path);
    let mut current = doc;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidArgument(format!(
                    "cannot set `{path}`: `{segment}` holds a non-object value {other}"
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut Document, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or(path);
    let mut current = doc;
    for segment in segments {
        current = match current.get_mut(segment) {
            Some(Value::Object(map)) => map,
            _ => return,
        };
    }
    current.remove(last);
}

/// Options for [`crate::DocumentAdapter::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Affect every matching document (`true`, the default) or only the first.
    pub multi: bool,
    /// Insert a document built from the filter when nothing matches.
    pub upsert: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            multi: true,
            upsert: false,
        }
    }
}

impl UpdateOptions {
    /// Affect at most one document.
    pub fn single() -> Self {
        Self {
            multi: false,
            upsert: false,
        }
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Options for [`crate::DocumentAdapter::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove every matching document (`true`, the default) or only the first.
    pub multi: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self { multi: true }
    }
}

impl RemoveOptions {
    pub fn single() -> Self {
        Self { multi: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_merges_fields() {
        let mut d = doc(json!({"id": "p1", "name": "Old", "status": false}));
        Update::Set(doc(json!({"name": "New"}))).apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"id": "p1", "name": "New", "status": false})));
    }

    #[test]
    fn test_set_dotted_path_creates_objects() {
        let mut d = doc(json!({"id": "p1"}));
        Update::Set(doc(json!({"configs.en": {"title": "Hi"}})))
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["configs"], json!({"en": {"title": "Hi"}}));
    }

    #[test]
    fn test_ops_apply_in_order() {
        let mut d = doc(json!({"n": 1, "tags": ["a"], "gone": true}));
        Update::Ops(vec![
            UpdateOp::inc("n", 2),
            UpdateOp::push("tags", "b"),
            UpdateOp::unset("gone"),
            UpdateOp::set("fresh", 7),
        ])
        .apply(&mut d)
        .unwrap();
        assert_eq!(d, doc(json!({"n": 3, "tags": ["a", "b"], "fresh": 7})));
    }

    #[test]
    fn test_inc_on_missing_field_starts_from_zero() {
        let mut d = Document::new();
        Update::Ops(vec![UpdateOp::inc("hits", 5)]).apply(&mut d).unwrap();
        assert_eq!(d["hits"], json!(5));
    }

    #[test]
    fn test_inc_on_string_is_rejected() {
        let mut d = doc(json!({"n": "x"}));
        let err = Update::Ops(vec![UpdateOp::inc("n", 1)]).apply(&mut d).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_internal_id_is_protected() {
        let mut d = doc(json!({"_id": "abc"}));
        let err = Update::Set(doc(json!({"_id": "other"}))).apply(&mut d).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert_eq!(d["_id"], json!("abc"));
    }

    #[test]
    fn test_wire_forms() {
        let set = Update::Set(doc(json!({"a": 1})));
        assert_eq!(set.to_wire(), json!({"$set": {"a": 1}}));

        let ops = Update::Ops(vec![
            UpdateOp::set("a", 1),
            UpdateOp::set("b", 2),
            UpdateOp::unset("c"),
        ]);
        assert_eq!(
            ops.to_wire(),
            json!({"$set": {"a": 1, "b": 2}, "$unset": {"c": ""}})
        );
        assert_eq!(Update::from_wire(&ops.to_wire()).unwrap(), ops);
    }

    #[test]
    fn test_bare_object_is_a_merge() {
        let update = Update::from_wire(&json!({"name": "x"})).unwrap();
        assert_eq!(update, Update::Set(doc(json!({"name": "x"}))));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = Update::from_wire(&json!({"$rename": {"a": "b"}})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_option_defaults() {
        assert!(UpdateOptions::default().multi);
        assert!(!UpdateOptions::default().upsert);
        assert!(!UpdateOptions::single().multi);
        assert!(RemoveOptions::default().multi);
        assert!(!RemoveOptions::single().multi);
    }
}
