use super::snapshot::DataSnapshot;
use super::{DatabaseError, Store};
use serde::Serialize;

/// A location in the database, bound to the store it lives in.
#[derive(Clone)]
pub struct Reference<'a> {
    store: &'a dyn Store,
    path: String,
}

impl<'a> Reference<'a> {
    pub(crate) fn new(store: &'a dyn Store, path: &str) -> Self {
        Self {
            store,
            path: normalize(path),
        }
    }

    /// Gets a `Reference` for the location at the relative `path` below this one.
    pub fn child(&self, path: &str) -> Reference<'a> {
        let child = normalize(path);
        let path = if self.path.is_empty() {
            child
        } else if child.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, child)
        };
        Reference {
            store: self.store,
            path,
        }
    }

    pub async fn get(&self) -> Result<DataSnapshot, DatabaseError> {
        self.store.read(&self.path).await
    }

    /// Replaces whatever is at this location with `value`.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(value)?;
        self.store.write(&self.path, value).await
    }

    pub async fn remove(&self) -> Result<(), DatabaseError> {
        self.store.delete(&self.path).await
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
