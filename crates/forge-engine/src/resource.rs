//! Opaque binary resources (textures, maps, packaged artifacts) a
//! container holds on behalf of its matches and modules.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Resource {
    pub resource_id: String,
    pub name: String,
    pub resource_type: String,
    pub blob: Vec<u8>,
    /// BLAKE3 hex digest of `blob`, computed once at upload time so callers
    /// can verify a download without re-deriving it from the full blob.
    pub checksum: String,
}

/// CRUD store for a container's resources, keyed by `resource_id`.
pub struct ResourceStore {
    resources: RwLock<HashMap<String, Resource>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self { resources: RwLock::new(HashMap::new()) }
    }

    pub fn put(
        &self,
        resource_id: &str,
        name: impl Into<String>,
        resource_type: impl Into<String>,
        blob: Vec<u8>,
    ) -> Result<(), EngineError> {
        let mut resources = self.resources.write().expect("resource store lock poisoned");
        if resources.contains_key(resource_id) {
            return Err(EngineError::Conflict {
                detail: format!("resource '{resource_id}' already exists"),
            });
        }
        let checksum = blake3::hash(&blob).to_hex().to_string();
        resources.insert(
            resource_id.to_owned(),
            Resource { resource_id: resource_id.to_owned(), name: name.into(), resource_type: resource_type.into(), blob, checksum },
        );
        Ok(())
    }

    pub fn get(&self, resource_id: &str) -> Result<Resource, EngineError> {
        self.resources
            .read()
            .expect("resource store lock poisoned")
            .get(resource_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { detail: format!("resource '{resource_id}' does not exist") })
    }

    pub fn delete(&self, resource_id: &str) -> Result<(), EngineError> {
        self.resources
            .write()
            .expect("resource store lock poisoned")
            .remove(resource_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound { detail: format!("resource '{resource_id}' does not exist") })
    }

    pub fn list(&self) -> Vec<String> {
        self.resources.read().expect("resource store lock poisoned").keys().cloned().collect()
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_roundtrip() {
        let store = ResourceStore::new();
        store.put("r1", "heightmap", "bin", vec![1, 2, 3]).unwrap();
        let r = store.get("r1").unwrap();
        assert_eq!(r.blob, vec![1, 2, 3]);
        store.delete("r1").unwrap();
        assert!(store.get("r1").is_err());
    }

    #[test]
    fn checksum_is_stable_for_identical_content() {
        let store = ResourceStore::new();
        store.put("r1", "heightmap", "bin", vec![1, 2, 3]).unwrap();
        let r1 = store.get("r1").unwrap();
        store.put("r2", "heightmap-copy", "bin", vec![1, 2, 3]).unwrap();
        let r2 = store.get("r2").unwrap();
        assert_eq!(r1.checksum, r2.checksum);
        assert_eq!(r1.checksum, blake3::hash(&[1, 2, 3]).to_hex().to_string());
    }

    #[test]
    fn duplicate_put_rejected() {
        let store = ResourceStore::new();
        store.put("r1", "a", "bin", vec![]).unwrap();
        let err = store.put("r1", "a", "bin", vec![]).unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn delete_missing_not_found() {
        let store = ResourceStore::new();
        let err = store.delete("ghost").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}
