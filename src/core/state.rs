//! The `State` trait and the record view of a state.
//!
//! A state is any plain value whose serialized form is a record: a JSON
//! object of named fields. The record view is what shallow merges, field
//! exclusion, partialization and diffs operate on.

use super::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// The record view of a state: field name to serialized value.
pub type Fields = Map<String, Value>;

/// Trait for values held by a store.
///
/// # Required Traits
///
/// - `Clone`: transitions produce new values from old ones
/// - `PartialEq`: no-op transitions are detected by equality
/// - `Debug`: states must be debuggable for diagnostics
/// - `Serialize` + `DeserializeOwned`: states must be serializable for
///   merging, history filtering and persistence
///
/// Implemented for every type meeting the bounds.
///
/// # Example
///
/// ```rust
/// use holdfast::core::{to_fields, State};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
/// }
///
/// fn assert_state<S: State>(_: &S) {}
///
/// let counter = Counter { count: 3 };
/// assert_state(&counter);
/// assert_eq!(to_fields(&counter).unwrap()["count"], 3);
/// ```
pub trait State:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> State for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Serialize a state into its record view.
///
/// Fails with [`StoreError::NotARecord`] when the value does not serialize
/// to a JSON object (a bare number, a list, an enum variant without fields).
pub fn to_fields<S: Serialize>(state: &S) -> Result<Fields, StoreError> {
    match serde_json::to_value(state) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::NotARecord {
            found: kind_of(&other),
        }),
        Err(e) => Err(StoreError::Serialize(e.to_string())),
    }
}

/// Rebuild a state from its record view.
pub fn from_fields<S: DeserializeOwned>(fields: Fields) -> Result<S, StoreError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Deserialize(e.to_string()))
}

/// Shallow merge: every field of `partial` replaces the same field of `base`.
///
/// Fields absent from `partial` keep their value from `base`. Nested
/// objects are replaced wholesale, not merged.
///
/// # Example
///
/// ```rust
/// use holdfast::core::merge_fields;
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Form {
///     name: String,
///     age: u32,
/// }
///
/// let base = Form { name: "ada".into(), age: 36 };
/// let partial = json!({ "age": 37 }).as_object().cloned().unwrap();
/// let merged = merge_fields(&base, partial).unwrap();
/// assert_eq!(merged, Form { name: "ada".into(), age: 37 });
/// ```
pub fn merge_fields<S: State>(base: &S, partial: Fields) -> Result<S, StoreError> {
    let mut fields = to_fields(base)?;
    fields.extend(partial);
    from_fields(fields)
}

/// Copy of `fields` without the named keys.
pub fn omit<'a, I>(fields: &Fields, keys: I) -> Fields
where
    I: IntoIterator<Item = &'a String>,
{
    let mut out = fields.clone();
    for key in keys {
        out.remove(key);
    }
    out
}

/// Copy of `fields` keeping only the named keys.
pub fn pick<'a, I>(fields: &Fields, keys: I) -> Fields
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter()
        .filter_map(|key| fields.get(key).map(|value| (key.clone(), value.clone())))
        .collect()
}

/// Names of the fields whose values differ between two records.
///
/// A field present in only one of the records counts as changed. The
/// result is sorted by field name.
pub fn changed_fields(prev: &Fields, next: &Fields) -> Vec<String> {
    let mut changed: Vec<String> = next
        .iter()
        .filter(|(key, value)| prev.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .chain(
            prev.keys()
                .filter(|key| !next.contains_key(*key))
                .cloned(),
        )
        .collect();
    changed.sort();
    changed
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
