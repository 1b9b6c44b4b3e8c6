//! Resource specifications and mutations.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::envelope::{FieldLookup, lookup_field};

/// Field whose run-unique value identifies a record when no identifier is known.
pub const NATURAL_KEY_FIELD: &str = "name";

/// The record a run creates: field name to value, insertion order kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSpec {
    fields: Map<String, Value>,
}

impl ResourceSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value under the same name.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Value declared for a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// All declared fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The record's natural key, its `name`, rendered as text.
    #[must_use]
    pub fn natural_key(&self) -> Option<String> {
        lookup_field(&self.fields, NATURAL_KEY_FIELD)
            .value()
            .filter(|v| !v.is_null())
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
    }

    /// The JSON body sent on create.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Copy of `record` with keys respelled to this spec's capitalisation.
    ///
    /// Used before resending a read record so a service that answers in
    /// `PascalCase` still receives the spelling it was created with.
    #[must_use]
    pub fn respell(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let mut out = record.clone();
        for name in self.fields.keys() {
            if let FieldLookup::CaseFolded { key, value } = lookup_field(record, name) {
                out.remove(key);
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}

impl From<Map<String, Value>> for ResourceSpec {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Field to new value pairs applied on top of a read record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mutation {
    changes: Map<String, Value>,
}

impl Mutation {
    /// Create an empty mutation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.changes.insert(field.into(), value.into());
        self
    }

    /// The changes, in insertion order.
    #[must_use]
    pub const fn changes(&self) -> &Map<String, Value> {
        &self.changes
    }

    /// True if `field` is changed by this mutation (case-insensitive).
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.changes.keys().any(|k| k.eq_ignore_ascii_case(field))
    }

    /// Full replacement record: `base` with every change applied.
    ///
    /// A change replaces the base value even if the base spells the key
    /// with different capitalisation.
    #[must_use]
    pub fn apply_to(&self, base: &Map<String, Value>) -> Map<String, Value> {
        let mut record = base.clone();
        for (field, value) in &self.changes {
            if let FieldLookup::CaseFolded { key, .. } = lookup_field(base, field) {
                record.remove(key);
            }
            record.insert(field.clone(), value.clone());
        }
        record
    }
}

/// A token unique to this run, used to keep natural keys from colliding.
///
/// Timestamp first so records sort by creation time, then a random suffix
/// so two runs started in the same second still differ.
#[must_use]
pub fn unique_token() -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{stamp}_{}", &suffix[..8])
}
