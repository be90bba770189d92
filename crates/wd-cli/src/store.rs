use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use wd_compiler::KeyValueStore;
use wd_core::{Result, RuleSetError};

/// Key/value store kept as one JSON object on disk. Every `set` rewrites the
/// file through a temporary sibling and a rename.
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| RuleSetError::Store(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(RuleSetError::Store(format!("{}: {}", path.display(), e))),
        };
        Ok(Self { path, values })
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values).map_err(|e| RuleSetError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| RuleSetError::Store(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| RuleSetError::Store(format!("{}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}
