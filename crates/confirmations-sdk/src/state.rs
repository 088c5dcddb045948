//! Key/value persistence for token pools and scheduler state.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, SdkError};

/// Where token pools and scheduler state survive restarts. Values are JSON
/// documents keyed by a short stable name.
pub trait StateStore: Send + Sync {
    fn save(&self, key: &str, json: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
}

/// In-memory store, for tests and for callers that manage persistence
/// elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn save(&self, key: &str, json: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| SdkError::State(format!("state lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), json.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| SdkError::State(format!("state lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }
}

/// One file per key under a directory. Writes go through a temp file and a
/// rename so a crash mid-write never leaves a truncated document.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| SdkError::State(format!("create state dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StateStore for FileStore {
    fn save(&self, key: &str, json: &str) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| SdkError::State(format!("write {}: {}", key, e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| SdkError::State(format!("commit {}: {}", key, e)))?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SdkError::State(format!("read {}: {}", key, e))),
        }
    }
}
