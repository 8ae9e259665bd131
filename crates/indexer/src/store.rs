//! Persisted scene-to-caption store
//!
//! One JSON object per run: keys are representative-frame image paths, values
//! are captions. A `BTreeMap` backs the store so serialization always emits
//! keys in sorted order, making the file deterministic regardless of the
//! order captions were produced in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::IndexerError;

/// Mapping from scene image path to caption
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneStore {
    records: BTreeMap<String, String>,
}

impl SceneStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scene_path: String, caption: String) {
        self.records.insert(scene_path, caption);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in sorted-key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.records.iter()
    }

    /// Load a store from its JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a JSON object of
    /// strings; readers that can degrade gracefully treat that as an empty
    /// match set instead of propagating.
    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        let text = std::fs::read_to_string(path)?;
        let store = serde_json::from_str(&text)
            .map_err(|e| IndexerError::MalformedStore(format!("{}: {e}", path.display())))?;
        Ok(store)
    }

    /// Serialize the full mapping, pretty-printed with sorted keys
    ///
    /// The store is written once, at the end of indexing, from the in-memory
    /// accumulation; no partial store ever hits the disk.
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| IndexerError::MalformedStore(e.to_string()))?;
        std::fs::write(path, json)?;
        info!("Saved {} captions to {}", self.records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_is_order_independent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("captions.json");

        let mut a = SceneStore::new();
        a.insert("b.jpg".to_string(), "second".to_string());
        a.insert("a.jpg".to_string(), "first".to_string());

        let mut b = SceneStore::new();
        b.insert("a.jpg".to_string(), "first".to_string());
        b.insert("b.jpg".to_string(), "second".to_string());

        a.save(&path).unwrap();
        let reloaded = SceneStore::load(&path).unwrap();
        assert_eq!(reloaded, a);
        assert_eq!(reloaded, b);
    }

    #[test]
    fn test_serializes_keys_sorted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("captions.json");

        let mut store = SceneStore::new();
        store.insert("z.jpg".to_string(), "last".to_string());
        store.insert("a.jpg".to_string(), "first".to_string());
        store.insert("m.jpg".to_string(), "middle".to_string());
        store.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let a = text.find("a.jpg").unwrap();
        let m = text.find("m.jpg").unwrap();
        let z = text.find("z.jpg").unwrap();
        assert!(a < m && m < z);
    }

    #[test]
    fn test_load_malformed_json_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("captions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SceneStore::load(&path).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedStore(_)));
    }
}
