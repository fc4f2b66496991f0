// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::message::Message;

/// Schema describing the workflow state
///
/// Fields not listed here are still accepted at run time; they use
/// [`ReducerType::Replace`] and are not type-checked.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Cap for `append` fields; oldest items are dropped past it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Allowed values for `category` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "string")]
    Text,
    Number,
    Integer,
    #[serde(alias = "bool")]
    Boolean,
    Category,
    #[serde(alias = "object")]
    Record,
    #[serde(alias = "array")]
    List,
    Messages,
}

/// How an update to a field combines with its current value
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Last write wins (default)
    #[default]
    #[serde(alias = "overwrite")]
    Replace,
    /// Append items to a list, honoring `max_items`
    Append,
    /// Shallow-merge records
    Merge,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Category => "category",
            FieldType::Record => "record",
            FieldType::List => "list",
            FieldType::Messages => "messages",
        }
    }

    fn is_sequence(&self) -> bool {
        matches!(self, FieldType::List | FieldType::Messages)
    }
}

impl StateFieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            reducer: ReducerType::Replace,
            max_items: None,
            values: Vec::new(),
            default: None,
        }
    }

    /// Append reducer with an optional cap.
    ///
    /// An update holding an array is always read as a batch of items. To
    /// append one item that is itself a list, wrap it: `[["a", "b"]]`.
    pub fn append(mut self, max_items: Option<usize>) -> Self {
        self.reducer = ReducerType::Append;
        self.max_items = max_items;
        self
    }

    pub fn merge(mut self) -> Self {
        self.reducer = ReducerType::Merge;
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Check a whole value against the declared type. `null` is always
    /// accepted since every field is optional.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self.field_type {
            FieldType::Text => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Category => value
                .as_str()
                .is_some_and(|s| self.values.is_empty() || self.values.iter().any(|v| v == s)),
            FieldType::Record => value.is_object(),
            FieldType::List => value.is_array(),
            FieldType::Messages => value
                .as_array()
                .is_some_and(|items| items.iter().all(Message::is_message_value)),
        }
    }

    /// Check a value handed to an `append` field: either one item or a list
    /// of items.
    pub fn accepts_items(&self, value: &Value) -> bool {
        let item_ok = |v: &Value| match self.field_type {
            FieldType::Messages => Message::is_message_value(v),
            _ => true,
        };
        match value {
            Value::Null => true,
            Value::Array(items) => items.iter().all(item_ok),
            single => item_ok(single),
        }
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field definition
    pub fn field(mut self, name: impl Into<String>, def: StateFieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&StateFieldDef> {
        self.fields.get(name)
    }

    pub fn reducer(&self, name: &str) -> ReducerType {
        self.fields
            .get(name)
            .map(|d| d.reducer)
            .unwrap_or_default()
    }

    /// Reject reducer/type combinations that cannot work
    pub fn validate(&self) -> Result<(), String> {
        for (name, def) in &self.fields {
            match def.reducer {
                ReducerType::Append if !def.field_type.is_sequence() => {
                    return Err(format!(
                        "field '{}' uses append but is declared {}",
                        name,
                        def.field_type.name()
                    ));
                }
                ReducerType::Merge if def.field_type != FieldType::Record => {
                    return Err(format!(
                        "field '{}' uses merge but is declared {}",
                        name,
                        def.field_type.name()
                    ));
                }
                _ => {}
            }
            if def.max_items == Some(0) {
                return Err(format!("field '{}' has max_items of 0", name));
            }
            if def.max_items.is_some() && def.reducer != ReducerType::Append {
                return Err(format!("field '{}' sets max_items without append", name));
            }
            if let Some(default) = &def.default {
                if !def.accepts(default) {
                    return Err(format!(
                        "default for '{}' is not a valid {}",
                        name,
                        def.field_type.name()
                    ));
                }
            }
        }
        Ok(())
    }
}
