//! In-process [`Store`] holding a single JSON tree.
//!
//! Follows the Realtime Database's write rules: nulls are never stored, an object left empty
//! by a write or delete disappears, and writing below a scalar replaces the scalar.

use super::snapshot::DataSnapshot;
use super::{DatabaseError, Store};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose tree starts out as `data`.
    pub fn with_data(data: Value) -> Self {
        Self {
            root: Mutex::new(prune(data)),
        }
    }

    /// A copy of the whole tree.
    pub fn dump(&self) -> Value {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, path: &str) -> Result<DataSnapshot, DatabaseError> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);

        let mut node = Some(&*root);
        for segment in segments(path) {
            node = node.and_then(|n| match n {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            });
        }

        Ok(DataSnapshot::new(path, node.cloned().unwrap_or(Value::Null)))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), DatabaseError> {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        write_at(&mut *root, &segments(path), prune(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), DatabaseError> {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        write_at(&mut *root, &segments(path), Value::Null);
        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn write_at(node: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    let mut map = match std::mem::take(node) {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    };

    let mut child = map.remove(*head).unwrap_or(Value::Null);
    write_at(&mut child, rest, value);
    if !child.is_null() {
        map.insert((*head).to_string(), child);
    }

    *node = if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    };
}

// Drops null members and collapses empty objects to null.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(prune).collect()),
        other => other,
    }
}
