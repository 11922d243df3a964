//! Durable record storage for presets
//!
//! One record per preset id. The production backend keeps each record as a
//! YAML file in a flat directory; the trait exists so the store can run
//! against other backends (in-memory for tests, a database later).

use std::fs;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

/// File extension for preset records
const RECORD_EXT: &str = "yaml";

/// Abstract record storage for the preset store.
///
/// Records are opaque bytes keyed by id; the store owns the record format.
pub trait RecordStorage: Send {
    /// Ids of every stored record
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Read one record's bytes
    fn read(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Write (create or overwrite) one record
    fn write(&mut self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Remove one record
    fn remove(&mut self, id: &str) -> Result<(), StoreError>;
}

/// Directory-backed record storage: one `{id}.yaml` file per record
pub struct DirectoryStorage {
    /// Root directory holding the records
    root: PathBuf,
}

impl DirectoryStorage {
    /// Create storage rooted at the given directory, creating it if missing
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory holding the records
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, RECORD_EXT))
    }
}

impl RecordStorage for DirectoryStorage {
    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }

        // Sort for a deterministic load order
        ids.sort();
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        Ok(fs::read(self.record_path(id))?)
    }

    fn write(&mut self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        Ok(fs::write(self.record_path(id), bytes)?)
    }

    fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        Ok(fs::remove_file(self.record_path(id))?)
    }
}

/// Get the default preset record directory
///
/// Returns: ~/.config/patchbay/presets
pub fn default_presets_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchbay")
        .join("presets")
}
