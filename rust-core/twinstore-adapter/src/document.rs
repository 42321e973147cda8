// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Documents, equality filters and find options.
//
// A document is a plain JSON object. Filters are conjunctions of field
// equalities (dotted paths reach into sub-documents); there is deliberately
// no operator language beyond that. Sorting follows a fixed cross-type
// ordering so that both backends return identical sequences for the same
// sort specification.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A stored record: field name to JSON value.
pub type Document = Map<String, Value>;

/// Logical identifier assigned by the application.
pub const ID_FIELD: &str = "id";

/// Storage-internal identifier assigned by a backend.
pub const INTERNAL_ID_FIELD: &str = "_id";

const AND_OPERATOR: &str = "$and";

/// Resolve a possibly dotted field path (`configs.en`) inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Compare two JSON values for equality, treating numbers numerically.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over (possibly missing) JSON values.
///
/// missing < null < numbers < strings < booleans < arrays < objects.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let x = a.as_f64().unwrap_or(0.0);
            let y = b.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for (x, y) in a.iter().zip(b) {
                let ord = compare_values(Some(x), Some(y));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            Value::Object(a.clone()).to_string().cmp(&Value::Object(b.clone()).to_string())
        }
        _ => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// A conjunction of field-equality conditions.
///
/// An empty filter matches every document. A condition on `null` also
/// matches documents where the field is absent, and a condition on a scalar
/// matches array fields containing that scalar.
///
/// On the wire a filter is a plain JSON object; when the same field is
/// constrained twice the conditions are wrapped in `$and` so that the
/// conjunction survives serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// A filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `{id: <id>}`.
    pub fn by_id(id: &str) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// Add a `field == value` condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Conjoin every condition of `other` onto this filter.
    pub fn and(mut self, other: &Filter) -> Self {
        self.conditions.extend(other.conditions.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// The value of the first condition on `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.conditions
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            match lookup(doc, field) {
                None => expected.is_null(),
                Some(Value::Array(items)) if !expected.is_array() => {
                    items.iter().any(|item| values_equal(item, expected))
                }
                Some(actual) => values_equal(actual, expected),
            }
        })
    }

    /// Seed document for an upsert: every top-level condition becomes a field.
    pub fn seed_document(&self) -> Document {
        let mut seed = Document::new();
        for (field, value) in &self.conditions {
            if !field.contains('.') && !field.starts_with('$') {
                seed.entry(field.clone()).or_insert_with(|| value.clone());
            }
        }
        seed
    }

    /// Parse the wire representation (a JSON object, optionally using `$and`).
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidArgument(format!("filter must be an object, got {value}"))
        })?;
        let mut filter = Filter::new();
        for (key, condition) in object {
            if key == AND_OPERATOR {
                let clauses = condition.as_array().ok_or_else(|| {
                    StoreError::InvalidArgument("$and expects an array of filters".to_string())
                })?;
                for clause in clauses {
                    filter = filter.and(&Filter::from_value(clause)?);
                }
                continue;
            }
            if key.starts_with('$') {
                return Err(StoreError::InvalidArgument(format!(
                    "unsupported filter operator `{key}`"
                )));
            }
            if let Value::Object(inner) = condition {
                if inner.keys().any(|k| k.starts_with('$')) {
                    return Err(StoreError::InvalidArgument(format!(
                        "only equality conditions are supported (field `{key}`)"
                    )));
                }
            }
            filter.conditions.push((key.clone(), condition.clone()));
        }
        Ok(filter)
    }

    /// Wire representation of this filter.
    pub fn to_value(&self) -> Value {
        let mut seen = std::collections::HashSet::new();
        let unique = self.conditions.iter().all(|(field, _)| seen.insert(field.as_str()));
        if unique {
            let object: Map<String, Value> = self.conditions.iter().cloned().collect();
            Value::Object(object)
        } else {
            let clauses = self
                .conditions
                .iter()
                .map(|(field, value)| {
                    let mut clause = Map::new();
                    clause.insert(field.clone(), value.clone());
                    Value::Object(clause)
                })
                .collect();
            let mut object = Map::new();
            object.insert(AND_OPERATOR.to_string(), Value::Array(clauses));
            Value::Object(object)
        }
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        filter.to_value()
    }
}

impl TryFrom<Value> for Filter {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Filter::from_value(&value)
    }
}

// ---------------------------------------------------------------------------
// Sorting and pagination
// ---------------------------------------------------------------------------

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_wire(self) -> i64 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// One component of a sort specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Options for [`crate::DocumentAdapter::find`].
///
/// Sorting is applied first, then `skip`, then `limit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order: SortOrder::Ascending,
        });
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order: SortOrder::Descending,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort, skip and truncate an already filtered result set.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for key in &self.sort {
                    let ord = compare_values(lookup(a, &key.field), lookup(b, &key.field));
                    let ord = match key.order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let skip = self.skip.unwrap_or(0);
        let iter = docs.into_iter().skip(skip);
        match self.limit {
            // A zero limit means "no limit", matching the document server.
            Some(limit) if limit > 0 => iter.take(limit).collect(),
            _ => iter.collect(),
        }
    }

    /// Sort specification as a wire object: `{"field": 1, "other": -1}`.
    pub fn sort_to_value(&self) -> Option<Value> {
        if self.sort.is_empty() {
            return None;
        }
        let object: Map<String, Value> = self
            .sort
            .iter()
            .map(|key| (key.field.clone(), Value::from(key.order.as_wire())))
            .collect();
        Some(Value::Object(object))
    }

    /// Parse a wire sort object back into sort keys.
    pub fn sort_from_value(value: &Value) -> StoreResult<Vec<SortKey>> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidArgument(format!("sort must be an object, got {value}"))
        })?;
        object
            .iter()
            .map(|(field, direction)| {
                let order = match direction.as_i64() {
                    Some(1) => SortOrder::Ascending,
                    Some(-1) => SortOrder::Descending,
                    _ => {
                        return Err(StoreError::InvalidArgument(format!(
                            "sort direction for `{field}` must be 1 or -1"
                        )))
                    }
                };
                Ok(SortKey {
                    field: field.clone(),
                    order,
                })
            })
            .collect()
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
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.matches(&doc(json!({"a": 1}))));
        assert!(filter.matches(&Document::new()));
    }

    #[test]
    fn test_equality_and_conjunction() {
        let d = doc(json!({"id": "p1", "code": "proj1", "userId": "alice"}));
        assert!(Filter::by_id("p1").matches(&d));
        assert!(Filter::by_id("p1").eq("userId", "alice").matches(&d));
        assert!(!Filter::by_id("p1").eq("userId", "bob").matches(&d));
    }

    #[test]
    fn test_contradictory_conjunction_matches_nothing() {
        let d = doc(json!({"userId": "alice"}));
        let filter = Filter::new().eq("userId", "bob").and(&Filter::new().eq("userId", "alice"));
        assert!(!filter.matches(&d));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        let d = doc(json!({"n": 1.0}));
        assert!(Filter::new().eq("n", 1).matches(&d));
    }

    #[test]
    fn test_null_matches_missing_field() {
        let d = doc(json!({"a": 1}));
        assert!(Filter::new().eq("userId", Value::Null).matches(&d));
        assert!(!Filter::new().eq("a", Value::Null).matches(&d));
    }

    #[test]
    fn test_array_contains_scalar() {
        let d = doc(json!({"languages": ["en", "zh"]}));
        assert!(Filter::new().eq("languages", "zh").matches(&d));
        assert!(!Filter::new().eq("languages", "fr").matches(&d));
        assert!(Filter::new().eq("languages", json!(["en", "zh"])).matches(&d));
    }

    #[test]
    fn test_dotted_path_lookup() {
        let d = doc(json!({"configs": {"en": {"title": "Hello"}}, "tags": ["x", "y"]}));
        assert_eq!(lookup(&d, "configs.en.title"), Some(&json!("Hello")));
        assert_eq!(lookup(&d, "tags.1"), Some(&json!("y")));
        assert_eq!(lookup(&d, "configs.fr"), None);
        assert!(Filter::new().eq("configs.en.title", "Hello").matches(&d));
    }

    #[test]
    fn test_wire_round_trip_with_duplicate_fields() {
        let filter = Filter::by_id("p1").eq("userId", "a").eq("userId", "b");
        let wire = filter.to_value();
        assert!(wire.get("$and").is_some());
        let parsed = Filter::from_value(&wire).unwrap();
        assert_eq!(parsed, filter);
    }

    #[test]
    fn test_operators_are_rejected() {
        let err = Filter::from_value(&json!({"code": {"$ne": "x"}})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let err = Filter::from_value(&json!({"$or": []})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_seed_document_skips_dotted_fields() {
        let filter = Filter::by_id("p1").eq("userId", "alice").eq("configs.en", 1);
        let seed = filter.seed_document();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed["id"], json!("p1"));
    }

    #[test]
    fn test_cross_type_ordering() {
        let values = [
            None,
            Some(json!(null)),
            Some(json!(3)),
            Some(json!("a")),
            Some(json!(false)),
            Some(json!([1])),
            Some(json!({"a": 1})),
        ];
        for pair in values.windows(2) {
            assert_eq!(
                compare_values(pair[0].as_ref(), pair[1].as_ref()),
                Ordering::Less
            );
        }
    }

    #[test]
    fn test_find_options_sort_skip_limit() {
        let docs: Vec<Document> = [3, 1, 2, 5, 4]
            .iter()
            .map(|n| doc(json!({"n": n})))
            .collect();

        let options = FindOptions::new().sort_asc("n").skip(1).limit(3);
        let result = options.apply(docs.clone());
        let ns: Vec<i64> = result.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);

        let options = FindOptions::new().sort_desc("n");
        let result = options.apply(docs);
        assert_eq!(result[0]["n"], json!(5));
    }

    #[test]
    fn test_sort_wire_preserves_key_order() {
        let options = FindOptions::new().sort_desc("updatedAt").sort_asc("name");
        let wire = options.sort_to_value().unwrap();
        let keys = FindOptions::sort_from_value(&wire).unwrap();
        assert_eq!(keys, options.sort);
    }
}
