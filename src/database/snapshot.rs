use super::DatabaseError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// A point-in-time read of one location in the database.
///
/// An absent location and a location holding `null` are the same thing to the Realtime
/// Database, so both report `exists() == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    key: Option<String>,
    value: Value,
}

impl DataSnapshot {
    pub fn new(path: &str, value: Value) -> Self {
        let key = path
            .split('/')
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string);
        Self { key, value }
    }

    /// The last segment of the path this snapshot was read from. `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns `true` if the location holds data.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// The raw JSON held at the location (`Value::Null` when absent).
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Deserializes the whole value. Returns `Ok(None)` if the location is absent.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, DatabaseError> {
        if !self.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.value.clone())?))
    }

    /// Deserializes every child value, dropping the keys.
    ///
    /// Objects yield their values in the order the store returned them. Arrays (which the
    /// database produces for dense integer keys) yield their non-null elements. Absent and
    /// scalar locations yield nothing. A child that does not fit `T` is logged and skipped;
    /// one bad record must not hide the rest.
    pub fn children<T: DeserializeOwned>(&self) -> Vec<T> {
        let children: Vec<(String, &Value)> = match &self.value {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => Vec::new(),
        };

        children
            .into_iter()
            .filter_map(|(child, value)| match serde_json::from_value(value.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(parent = ?self.key(), child = %child, error = %e, "skipping unreadable child");
                    None
                }
            })
            .collect()
    }
}
