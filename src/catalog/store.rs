//! Generic persisted key-value store backing every named catalog resource
//! (index definitions, indexers, data sources, skillsets, synonym maps,
//! indexer status — spec.md §6.4 "Persisted state layout").
//!
//! One `ResourceStore<T>` instance owns one resource kind and persists it
//! as one JSON file per resource name under `<data_dir>/<kind>/<name>.json`,
//! with an in-memory `HashMap` mirror guarded by a `parking_lot::RwLock` for
//! fast reads — the same "one writer, many readers" shape the lexical index
//! (§4.2) and vector index (§4.4) reuse.

use crate::error::ApiError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Every resource kept in a `ResourceStore` must be nameable and carry an
/// ETag for optimistic-concurrency enforcement (spec.md §9 Open Questions:
/// ETag is fully enforced).
pub trait CatalogResource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn name(&self) -> &str;
    fn etag(&self) -> &str;
}

pub struct ResourceStore<T: CatalogResource> {
    dir: PathBuf,
    items: RwLock<HashMap<String, T>>,
}

impl<T: CatalogResource> ResourceStore<T> {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut items = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            match serde_json::from_slice::<T>(&bytes) {
                Ok(item) => {
                    items.insert(item.name().to_string(), item);
                }
                Err(e) => {
                    tracing::warn!("failed to load catalog resource {:?}: {}", path, e);
                }
            }
        }
        Ok(Self {
            dir,
            items: RwLock::new(items),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn persist(&self, item: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(item)?;
        std::fs::write(self.path_for(item.name()), bytes)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.items.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.items.read().values().cloned().collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.items.read().contains_key(name)
    }

    /// Creates a brand-new resource; fails with `AlreadyExists` if present.
    pub fn create(&self, item: T) -> Result<T, ApiError> {
        let mut items = self.items.write();
        if items.contains_key(item.name()) {
            return Err(ApiError::AlreadyExists(item.name().to_string()));
        }
        self.persist(&item)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        items.insert(item.name().to_string(), item.clone());
        Ok(item)
    }

    /// Upserts a resource (create-or-replace), optionally checking
    /// `if_match` against the stored ETag first.
    pub fn put(&self, item: T, if_match: Option<&str>) -> Result<T, ApiError> {
        let mut items = self.items.write();
        if let Some(expected) = if_match {
            if let Some(existing) = items.get(item.name()) {
                if existing.etag() != expected {
                    return Err(ApiError::Conflict(format!(
                        "etag mismatch for '{}'",
                        item.name()
                    )));
                }
            }
        }
        self.persist(&item)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        items.insert(item.name().to_string(), item.clone());
        Ok(item)
    }

    pub fn delete(&self, name: &str, if_match: Option<&str>) -> Result<(), ApiError> {
        let mut items = self.items.write();
        if let Some(existing) = items.get(name) {
            if let Some(expected) = if_match {
                if existing.etag() != expected {
                    return Err(ApiError::Conflict(format!("etag mismatch for '{}'", name)));
                }
            }
        } else {
            return Ok(());
        }
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| ApiError::InternalError(e.to_string()))?;
        }
        items.remove(name);
        Ok(())
    }
}

impl CatalogResource for crate::catalog::IndexDefinition {
    fn name(&self) -> &str {
        &self.name
    }
    fn etag(&self) -> &str {
        &self.etag
    }
}

/// Index-definition-specific convenience wrapper.
pub type CatalogStore = ResourceStore<crate::catalog::IndexDefinition>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, FieldFlags, FieldType, IndexDefinition, PrimitiveType};

    fn make_index(name: &str) -> IndexDefinition {
        IndexDefinition::new(
            name,
            vec![Field::new(
                "id",
                FieldType::Primitive(PrimitiveType::String),
                FieldFlags {
                    key: true,
                    retrievable: true,
                    ..Default::default()
                },
            )],
        )
    }

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();
        let idx = make_index("hotels");
        store.create(idx.clone()).unwrap();
        let fetched = store.get("hotels").unwrap();
        assert_eq!(fetched.name, "hotels");
    }

    #[test]
    fn create_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();
        store.create(make_index("hotels")).unwrap();
        let err = store.create(make_index("hotels")).unwrap_err();
        assert!(matches!(err, ApiError::AlreadyExists(_)));
    }

    #[test]
    fn put_with_stale_etag_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(dir.path()).unwrap();
        let idx = store.create(make_index("hotels")).unwrap();
        let mut updated = idx.clone();
        updated.bump_etag();
        store.put(updated, Some(&idx.etag)).unwrap();

        let mut stale_update = make_index("hotels");
        stale_update.etag = idx.etag.clone();
        let err = store.put(stale_update, Some("not-the-real-etag")).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
