//! Response envelope normalisation.
//!
//! Services under test are inconsistent about where they put the payload
//! (top level or under a `data`/`Data` wrapper) and how they spell the
//! identifier (`ID`, `Id`, `id`, `_id`, ...). Everything here is a
//! prioritised lookup: an ordered list of candidates, first non-empty
//! match wins.

use serde::Serialize;
use serde_json::{Map, Value};

/// Identifier keys probed in order when none are configured.
pub const DEFAULT_IDENTIFIER_KEYS: &[&str] = &["ID", "Id", "id", "_id", "_Id"];

/// Wrapper key matched case-insensitively when none is configured.
pub const DEFAULT_WRAPPER_KEY: &str = "data";

/// Key holding the page of records in paginated listings.
const ITEMS_KEY: &str = "items";

/// Soft-delete marker on listed records.
const DELETED_FLAG_KEY: &str = "isDeleted";

/// Candidate keys used to read envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeKeys {
    identifier_keys: Vec<String>,
    wrapper_key: String,
}

impl Default for EnvelopeKeys {
    fn default() -> Self {
        Self {
            identifier_keys: DEFAULT_IDENTIFIER_KEYS.iter().map(ToString::to_string).collect(),
            wrapper_key: DEFAULT_WRAPPER_KEY.to_string(),
        }
    }
}

impl EnvelopeKeys {
    /// Replace the identifier candidates. Order is priority order.
    #[must_use]
    pub fn with_identifier_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the wrapper key (matched case-insensitively).
    #[must_use]
    pub fn with_wrapper_key(mut self, key: impl Into<String>) -> Self {
        self.wrapper_key = key.into();
        self
    }

    /// Identifier candidates in priority order.
    #[must_use]
    pub fn identifier_keys(&self) -> &[String] {
        &self.identifier_keys
    }

    /// The payload, unwrapped from the wrapper key if one is present.
    ///
    /// A wrapper holding `null` is treated as absent and the top-level body
    /// is returned instead.
    #[must_use]
    pub fn unwrap_payload<'a>(&self, body: &'a Value) -> &'a Value {
        self.wrapped(body).unwrap_or(body)
    }

    fn wrapped<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        let object = body.as_object()?;
        match lookup_field(object, &self.wrapper_key) {
            FieldLookup::Exact(value) | FieldLookup::CaseFolded { value, .. } if !value.is_null() => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Extract a non-empty identifier from a response body.
    ///
    /// Readings are tried in order (the wrapped payload, then the top-level
    /// body) and within each reading the identifier candidates in order.
    #[must_use]
    pub fn extract_identifier(&self, body: &Value) -> Option<String> {
        let readings = self.wrapped(body).into_iter().chain(std::iter::once(body));
        first_match(readings, &self.identifier_keys, identifier_text)
    }

    /// Normalise a collection listing into a count of records.
    #[must_use]
    pub fn summarize_collection(&self, body: &Value) -> CollectionSummary {
        let items = self.collection_items(body);
        let active = items.iter().filter(|item| !is_soft_deleted(item)).count();
        CollectionSummary {
            total: items.len(),
            active,
        }
    }

    /// Records in a listing.
    ///
    /// Accepts a raw array, an object carrying an `items` array (at top level
    /// or under the wrapper), a wrapper holding an array, or a single object.
    #[must_use]
    pub fn collection_items<'a>(&self, body: &'a Value) -> Vec<&'a Value> {
        if let Some(items) = items_array(body) {
            return items.iter().collect();
        }
        match self.unwrap_payload(body) {
            Value::Array(items) => items.iter().collect(),
            payload => {
                if let Some(items) = items_array(payload) {
                    items.iter().collect()
                } else if is_blank(payload) {
                    Vec::new()
                } else {
                    vec![payload]
                }
            }
        }
    }
}

/// Counts produced by normalising a collection listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Every record the listing returned
    pub total: usize,
    /// Records not flagged as soft-deleted
    pub active: usize,
}

impl CollectionSummary {
    /// True if no active records remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.active == 0
    }
}

/// Outcome of looking a field up in a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldLookup<'a> {
    /// Key present with the exact spelling requested
    Exact(&'a Value),
    /// Key present only under a different capitalisation
    CaseFolded {
        /// The spelling the record actually uses
        key: &'a str,
        /// The value under that key
        value: &'a Value,
    },
    /// No key matches, even ignoring case
    Missing,
}

impl<'a> FieldLookup<'a> {
    /// The value found, regardless of how the key was spelled.
    #[must_use]
    pub const fn value(self) -> Option<&'a Value> {
        match self {
            Self::Exact(value) | Self::CaseFolded { value, .. } => Some(value),
            Self::Missing => None,
        }
    }
}

/// Look a field up exactly, falling back to a case-insensitive match.
#[must_use]
pub fn lookup_field<'a>(record: &'a Map<String, Value>, field: &str) -> FieldLookup<'a> {
    if let Some(value) = record.get(field) {
        return FieldLookup::Exact(value);
    }
    record
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(field))
        .map_or(FieldLookup::Missing, |(key, value)| FieldLookup::CaseFolded {
            key: key.as_str(),
            value,
        })
}

/// Try every key against every reading in order; first hit wins.
fn first_match<'a, R, T, F>(readings: R, keys: &[String], extract: F) -> Option<T>
where
    R: IntoIterator<Item = &'a Value>,
    F: Fn(&'a Value) -> Option<T>,
{
    readings
        .into_iter()
        .filter_map(Value::as_object)
        .find_map(|object| keys.iter().find_map(|key| object.get(key).and_then(&extract)))
}

/// Identifier text for strings, numbers and extended-JSON `{"$oid": ...}`.
fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(object) => object.get("$oid").and_then(identifier_text),
        _ => None,
    }
}

fn items_array(value: &Value) -> Option<&Vec<Value>> {
    let object = value.as_object()?;
    lookup_field(object, ITEMS_KEY).value()?.as_array()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn is_soft_deleted(item: &Value) -> bool {
    item.as_object()
        .and_then(|object| lookup_field(object, DELETED_FLAG_KEY).value())
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
