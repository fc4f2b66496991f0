// SPDX-License-Identifier: MIT

//! Runtime state document and partial updates

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Message;
use super::schema::{ReducerType, StateSchema};
use crate::adk::error::ExecutionError;

/// The full key-value document threaded through a run.
///
/// All reads go through the typed accessors; a missing key and a `null`
/// value read the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    values: Map<String, Value>,
}

/// The keys a step wants to change. Omitted keys stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialState {
    updates: Map<String, Value>,
}

impl State {
    /// Create an empty State
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a State holding the schema's declared defaults
    pub fn from_schema(schema: &StateSchema) -> Self {
        let values = schema
            .fields
            .iter()
            .filter_map(|(name, def)| def.default.clone().map(|d| (name.clone(), d)))
            .collect();
        Self { values }
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Raw access; prefer the typed accessors in step code
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Nested access using dot notation (e.g. `calendar_result.created`)
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// True when the key holds a non-null value
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer view; integral floats (as JSON round-trips may produce) count
    pub fn integer(&self, key: &str) -> Option<i64> {
        let v = self.get(key)?;
        v.as_i64().or_else(|| {
            v.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        })
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn record(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    /// Messages in a `messages` field; malformed entries are skipped
    pub fn messages(&self, key: &str) -> Vec<Message> {
        self.list(key)
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Deserialize a field into any serde type
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Merge an update in place using the schema's reducers.
    ///
    /// The whole update is type-checked before anything is written, so a
    /// rejected update leaves the state as it was. On an `append` field an
    /// array value adds each of its elements; any other value adds itself.
    pub fn apply(&mut self, update: &PartialState, schema: &StateSchema) -> Result<(), ExecutionError> {
        for (key, value) in update.iter() {
            check_type(key, value, schema)?;
        }

        for (key, value) in update.iter() {
            match schema.get(key) {
                Some(def) if def.reducer == ReducerType::Append => {
                    append(&mut self.values, key, value.clone(), def.max_items)
                }
                Some(def) if def.reducer == ReducerType::Merge => {
                    merge_record(&mut self.values, key, value.clone())
                }
                _ => {
                    self.values.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pure form of [`State::apply`]
pub fn merge(state: &State, update: &PartialState, schema: &StateSchema) -> Result<State, ExecutionError> {
    let mut next = state.clone();
    next.apply(update, schema)?;
    Ok(next)
}

fn check_type(key: &str, value: &Value, schema: &StateSchema) -> Result<(), ExecutionError> {
    let Some(def) = schema.get(key) else {
        return Ok(());
    };
    let ok = match def.reducer {
        ReducerType::Append => def.accepts_items(value),
        ReducerType::Merge => value.is_null() || value.is_object(),
        ReducerType::Replace => def.accepts(value),
    };
    if ok {
        Ok(())
    } else {
        Err(ExecutionError::StateType {
            key: key.to_string(),
            expected: def.field_type.name().to_string(),
            found: describe(value),
        })
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(s) => format!("text {:?}", s),
        Value::Array(_) => "list".into(),
        Value::Object(_) => "record".into(),
    }
}

fn append(values: &mut Map<String, Value>, key: &str, value: Value, max_items: Option<usize>) {
    let new_items = match value {
        Value::Null => return,
        Value::Array(items) => items,
        single => vec![single],
    };

    let slot = values
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        // a lone earlier item becomes the head of the list
        let earlier = slot.take();
        *slot = Value::Array(if earlier.is_null() { Vec::new() } else { vec![earlier] });
    }
    if let Value::Array(list) = slot {
        list.extend(new_items);
        if let Some(cap) = max_items {
            if list.len() > cap {
                let excess = list.len() - cap;
                list.drain(..excess);
            }
        }
    }
}

fn merge_record(values: &mut Map<String, Value>, key: &str, value: Value) {
    let Value::Object(new_fields) = value else {
        return;
    };
    let slot = values
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(current) = slot {
        current.extend(new_fields);
    }
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.updates.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.updates.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.updates.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.updates.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.updates.keys()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Build an update from a JSON object; anything else yields `None`
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(updates) => Some(Self { updates }),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.updates.clone())
    }

    /// Fold a later update into this one so that applying the result once
    /// equals applying both in order (caps aside).
    pub fn absorb(&mut self, later: PartialState, schema: &StateSchema) {
        for (key, value) in later.updates {
            match schema.reducer(&key) {
                ReducerType::Append => append(&mut self.updates, &key, value, None),
                ReducerType::Merge => merge_record(&mut self.updates, &key, value),
                ReducerType::Replace => {
                    self.updates.insert(key, value);
                }
            }
        }
    }
}

impl From<Map<String, Value>> for PartialState {
    fn from(updates: Map<String, Value>) -> Self {
        Self { updates }
    }
}

impl From<State> for PartialState {
    fn from(state: State) -> Self {
        Self {
            updates: state.values,
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PartialState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            updates: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
