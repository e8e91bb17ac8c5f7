// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped key-value backends for persisted credentials.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Durable string key-value store, scoped to this client.
///
/// Multi-key writes go through [`KeyValueStore::set_many`] and
/// [`KeyValueStore::remove_many`] so backends can apply them in one step.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()>;

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.remove_many(&[key])
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_owned(), (*value).to_owned());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// JSON file store. Keys are prefixed with `scope.` inside the file.
pub struct FileStore {
    path: PathBuf,
    scope: String,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn new(path: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        Self { path: path.into(), scope: scope.into(), write_lock: Mutex::new(()) }
    }

    /// Default credential file inside `dir`.
    pub fn in_dir(dir: &Path, scope: impl Into<String>) -> Self {
        Self::new(dir.join("credentials.json"), scope)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}.{key}", self.scope)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let map = load(&self.path)?;
        Ok(map.get(&self.scoped(key)).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let (mut map, _) = load_or_reset(&self.path)?;
        for (key, value) in entries {
            map.insert(self.scoped(key), (*value).to_owned());
        }
        save(&self.path, &map)
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let (mut map, reset) = load_or_reset(&self.path)?;
        let before = map.len();
        for key in keys {
            map.remove(&self.scoped(key));
        }
        if map.len() == before && !reset {
            return Ok(());
        }
        save(&self.path, &map)
    }
}

/// Load the key-value map from a JSON file. A missing file is an empty map.
pub fn load(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Load ahead of a write. Unparsable contents are logged and start over
/// from an empty map; the flag reports whether that happened.
fn load_or_reset(path: &Path) -> anyhow::Result<(BTreeMap<String, String>, bool)> {
    match load(path) {
        Ok(map) => Ok((map, false)),
        Err(e) if e.is::<serde_json::Error>() => {
            tracing::warn!(path = %path.display(), err = %e, "credential file is corrupt, replacing it");
            Ok((BTreeMap::new(), true))
        }
        Err(e) => Err(e),
    }
}

/// Save the key-value map to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, map: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
