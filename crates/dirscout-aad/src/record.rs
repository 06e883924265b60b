//! Directory records as returned by the directory API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AadError, AadResult};

/// Current id field name.
pub const ID_FIELD: &str = "id";
/// Legacy id field name.
pub const LEGACY_ID_FIELD: &str = "objectId";
/// Flag set on Microsoft-owned service principals.
pub const FIRST_PARTY_FIELD: &str = "microsoftFirstParty";

/// Resolves the object id of a JSON document, preferring `id` over `objectId`.
///
/// Empty strings and non-string values are ignored.
#[must_use]
pub fn resolve_object_id(document: &Map<String, Value>) -> Option<&str> {
    [ID_FIELD, LEGACY_ID_FIELD]
        .iter()
        .filter_map(|field| document.get(*field).and_then(Value::as_str))
        .find(|id| !id.is_empty())
}

/// One directory object, kept as the raw key-value document the API returned.
///
/// Enrichment adds `owners` / `members` arrays in place before the record is
/// written to a sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryRecord(Map<String, Value>);

impl DirectoryRecord {
    /// Wraps a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns `AadError::DirectoryApi` with code `MalformedRecord` if the
    /// value is not a JSON object.
    pub fn from_value(value: Value) -> AadResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AadError::directory(
                "MalformedRecord",
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    /// Returns the object id, preferring the current field over the legacy one.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        resolve_object_id(&self.0)
    }

    /// True when the record is a Microsoft first-party principal.
    #[must_use]
    pub fn is_first_party(&self) -> bool {
        self.0
            .get(FIRST_PARTY_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Sets `property` to an array of linked object ids.
    pub fn set_links(&mut self, property: &str, ids: Vec<String>) {
        let ids = ids.into_iter().map(Value::String).collect();
        self.0.insert(property.to_string(), Value::Array(ids));
    }

    /// Returns a field of the document.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for DirectoryRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
