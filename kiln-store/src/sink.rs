//! Persistence sink abstraction.
//!
//! The store persists itself as a single blob under a single key; the sink
//! is whatever the host application provides (browser storage, a file, a
//! test fixture). No partial writes.

use crate::StoreResult;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Single-key, whole-blob persistence.
pub trait PersistenceSink {
    /// Reads the blob stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes `blob` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, blob: &str) -> StoreResult<()>;
}

/// In-memory sink, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySink {
    blobs: BTreeMap<String, String>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the sink holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl PersistenceSink for MemorySink {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> StoreResult<()> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// File-backed sink storing one `<key>.json` file per key under a directory.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Creates a sink rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl PersistenceSink for FileSink {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, blob: &str) -> StoreResult<()> {
        std::fs::write(self.path_for(key), blob)?;
        Ok(())
    }
}
