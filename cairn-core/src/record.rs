//! Schemaless records stored in a collection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CairnResult, ValidationError};

/// Field holding the record identifier.
pub const ID_FIELD: &str = "_id";

/// Field holding record metadata.
pub const META_FIELD: &str = "_meta";

/// Metadata flag marking a record created on this device.
pub const LOCAL_FLAG: &str = "local";

/// A single stored entity: a JSON object keyed by field name.
///
/// Two fields are reserved. [`ID_FIELD`] carries the identifier that is
/// unique within the collection, and [`META_FIELD`] carries an object with
/// at least the [`LOCAL_FLAG`] boolean once the cache engine has seen it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> CairnResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ValidationError::InvalidRecord {
                reason: format!("expected a JSON object, got {}", type_name(&other)),
            }
            .into()),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// The identifier, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Set the identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// The metadata object, if present.
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.0.get(META_FIELD).and_then(Value::as_object)
    }

    /// Mutable metadata object, created (or replaced if not an object) on demand.
    pub fn meta_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(META_FIELD.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("metadata slot was just set to an object"),
        }
    }

    /// Whether the record was created on this device.
    pub fn is_local(&self) -> bool {
        self.meta()
            .and_then(|meta| meta.get(LOCAL_FLAG))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Top-level field lookup.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Dotted-path lookup (`"address.city"`), descending through objects.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Insert a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = crate::error::CairnError;

    fn try_from(value: Value) -> CairnResult<Self> {
        Self::from_value(value)
    }
}

/// Short JSON type name for error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_object() {
        assert!(Record::from_value(json!({"a": 1})).is_ok());
        let err = Record::from_value(json!([1, 2])).unwrap_err();
        assert!(format!("{}", err).contains("array"));
    }

    #[test]
    fn test_id_accessors() {
        let mut record = Record::new().with("text", "a");
        assert_eq!(record.id(), None);
        record.set_id("given");
        assert_eq!(record.id(), Some("given"));
    }

    #[test]
    fn test_non_string_id_is_not_an_id() {
        let record = Record::new().with(ID_FIELD, 42);
        assert_eq!(record.id(), None);
    }

    #[test]
    fn test_meta_mut_replaces_non_object() {
        let mut record = Record::new().with(META_FIELD, "junk");
        record.meta_mut().insert(LOCAL_FLAG.to_string(), json!(true));
        assert!(record.is_local());
    }

    #[test]
    fn test_lookup_nested() {
        let record = Record::from_value(json!({"address": {"city": "Oslo"}})).unwrap();
        assert_eq!(record.lookup("address.city"), Some(&json!("Oslo")));
        assert_eq!(record.lookup("address.zip"), None);
        assert_eq!(record.lookup("missing.city"), None);
    }

    #[test]
    fn test_serde_is_transparent() {
        let record = Record::new().with("_id", "x").with("n", 1);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"_id": "x", "n": 1}));
        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
