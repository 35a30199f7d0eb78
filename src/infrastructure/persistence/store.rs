//! Content-addressed JSON document store with per-file exclusive locks and
//! atomic read-modify-write (spec.md §4.1).
//!
//! Adapted from the teacher's `settings_persistence.rs` /
//! `optimal_parameters_persistence.rs` temp-file-then-rename pattern,
//! generalized from a single fixed path to a named-document store with
//! per-document async locking so unrelated documents proceed in parallel.

use super::documents::DocumentName;
use crate::domain::errors::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct PersistenceStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<DocumentName, Arc<Mutex<()>>>>,
}

impl PersistenceStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, name: DocumentName) -> PathBuf {
        self.base_dir.join(name.file_name())
    }

    async fn lock_for(&self, name: DocumentName) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns the document's current contents, or `None` if the file does
    /// not exist yet (spec.md: `read(name) -> Document|NotFound`).
    pub async fn read_raw(&self, name: DocumentName) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.path_for(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let value: serde_json::Value =
                    serde_json::from_str(&contents).map_err(|source| StorageError::Parse {
                        name: name.to_string(),
                        source,
                    })?;
                debug!(document = %name, bytes = contents.len(), "read document");
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Unconditionally replaces the document atomically via temp-file + rename.
    pub async fn write_raw(
        &self,
        name: DocumentName,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Write {
                    name: name.to_string(),
                    source,
                })?;
        }
        let pretty = serde_json::to_string_pretty(value).map_err(|source| StorageError::Parse {
            name: name.to_string(),
            source,
        })?;

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &pretty)
            .await
            .map_err(|source| StorageError::Write {
                name: name.to_string(),
                source,
            })?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|source| StorageError::Write {
                name: name.to_string(),
                source,
            })?;
        debug!(document = %name, bytes = pretty.len(), "wrote document");
        Ok(())
    }

    /// Acquires the document's exclusive lock, reads current state, calls
    /// `transform`, writes the result, returns the new state. `transform`
    /// runs entirely in-memory: no I/O may happen inside it.
    pub async fn atomic_update_raw<F>(
        &self,
        name: DocumentName,
        transform: F,
    ) -> Result<serde_json::Value, StorageError>
    where
        F: FnOnce(serde_json::Value) -> serde_json::Value + Send,
    {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let current = self
            .read_raw(name)
            .await?
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        let next = transform(current);
        self.write_raw(name, &next).await?;
        Ok(next)
    }

    /// Typed convenience wrapper over `read_raw`: documents are JSON arrays
    /// of entities; a missing file reads as an empty collection.
    pub async fn read<T: DeserializeOwned>(&self, name: DocumentName) -> Result<Vec<T>, StorageError> {
        match self.read_raw(name).await? {
            Some(value) => serde_json::from_value(value).map_err(|source| StorageError::Parse {
                name: name.to_string(),
                source,
            }),
            None => Ok(Vec::new()),
        }
    }

    pub async fn write<T: Serialize>(&self, name: DocumentName, items: &[T]) -> Result<(), StorageError> {
        let value = serde_json::to_value(items).map_err(|source| StorageError::Parse {
            name: name.to_string(),
            source,
        })?;
        self.write_raw(name, &value).await
    }

    /// Typed `atomicUpdate`: decode, run the pure transform, encode, write.
    pub async fn atomic_update<T, F>(&self, name: DocumentName, transform: F) -> Result<Vec<T>, StorageError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Vec<T>) -> Vec<T> + Send,
    {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let current: Vec<T> = match self.read_raw(name).await? {
            Some(value) => serde_json::from_value(value).map_err(|source| StorageError::Parse {
                name: name.to_string(),
                source,
            })?,
            None => Vec::new(),
        };
        let next = transform(current);
        self.write(name, &next).await?;
        Ok(next)
    }

    /// Like `atomic_update`, but `transform` may reject the write (e.g. a
    /// capacity check). On `Err`, nothing is written and the document is
    /// left untouched — this is the only way a limit check and the insert it
    /// guards can be made atomic with each other (DESIGN NOTES §9, "race on
    /// capacity check"): the check runs under the same per-document lock as
    /// the write, never against a read taken outside it.
    pub async fn atomic_try_update<T, E, F>(
        &self,
        name: DocumentName,
        transform: F,
    ) -> Result<Vec<T>, AtomicUpdateError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Vec<T>) -> Result<Vec<T>, E> + Send,
    {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let current: Vec<T> = match self.read_raw(name).await.map_err(AtomicUpdateError::Storage)? {
            Some(value) => serde_json::from_value(value).map_err(|source| {
                AtomicUpdateError::Storage(StorageError::Parse {
                    name: name.to_string(),
                    source,
                })
            })?,
            None => Vec::new(),
        };
        let next = transform(current).map_err(AtomicUpdateError::Rejected)?;
        self.write(name, &next).await.map_err(AtomicUpdateError::Storage)?;
        Ok(next)
    }
}

/// Outcome of a rejected `atomic_try_update`: either storage failed, or
/// `transform` itself declined the write.
#[derive(Debug)]
pub enum AtomicUpdateError<E> {
    Storage(StorageError),
    Rejected(E),
}

impl<E: std::fmt::Display> std::fmt::Display for AtomicUpdateError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicUpdateError::Storage(e) => write!(f, "{e}"),
            AtomicUpdateError::Rejected(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
        value: i32,
    }

    fn temp_store() -> (PersistenceStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "sector_engine_store_test_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        (PersistenceStore::new(dir.clone()), dir)
    }

    #[tokio::test]
    async fn read_missing_document_returns_empty() {
        let (store, dir) = temp_store();
        let rows: Vec<Row> = store.read(DocumentName::Agents).await.unwrap();
        assert!(rows.is_empty());
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (store, dir) = temp_store();
        let rows = vec![Row { id: "a".into(), value: 1 }];
        store.write(DocumentName::Agents, &rows).await.unwrap();
        let read_back: Vec<Row> = store.read(DocumentName::Agents).await.unwrap();
        assert_eq!(read_back, rows);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn atomic_update_initializes_empty_then_appends() {
        let (store, dir) = temp_store();
        let result: Vec<Row> = store
            .atomic_update(DocumentName::Sectors, |mut rows: Vec<Row>| {
                rows.push(Row { id: "x".into(), value: 42 });
                rows
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        let persisted: Vec<Row> = store.read(DocumentName::Sectors).await.unwrap();
        assert_eq!(persisted, result);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn atomic_try_update_leaves_document_untouched_on_rejection() {
        let (store, dir) = temp_store();
        store
            .write(DocumentName::Agents, &vec![Row { id: "a".into(), value: 1 }])
            .await
            .unwrap();
        let result: Result<Vec<Row>, AtomicUpdateError<&str>> = store
            .atomic_try_update(DocumentName::Agents, |rows: Vec<Row>| {
                if rows.len() >= 1 {
                    Err("capacity exceeded")
                } else {
                    Ok(rows)
                }
            })
            .await;
        assert!(matches!(result, Err(AtomicUpdateError::Rejected(_))));
        let persisted: Vec<Row> = store.read(DocumentName::Agents).await.unwrap();
        assert_eq!(persisted.len(), 1);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn concurrent_atomic_updates_serialize_on_same_document() {
        let (store, dir) = temp_store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .atomic_update(DocumentName::Agents, move |mut rows: Vec<Row>| {
                        rows.push(Row {
                            id: format!("agent_{i}"),
                            value: i,
                        });
                        rows
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let rows: Vec<Row> = store.read(DocumentName::Agents).await.unwrap();
        assert_eq!(rows.len(), 20);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
