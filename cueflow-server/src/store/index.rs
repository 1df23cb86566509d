//! In-memory cache indexes and their on-disk form
//!
//! Two maps: the path index (`canonical path → content id + stat fingerprint`)
//! persisted as `cache/index.json`, and the entry map (`content id →
//! CacheEntry`) materialised from `cache/by_content/`. Only the path index is
//! written here; entry files are owned by the store's write path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cueflow_common::models::CacheEntry;
use cueflow_common::{Error, Result};

/// One row of the persisted path index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathIndexEntry {
    pub content_id: String,
    pub file_size: u64,
    /// Modification time, Unix seconds
    pub mtime: i64,
    pub analysis_version: u32,
}

impl PathIndexEntry {
    /// Fast-reject check: does the current stat match this row?
    pub fn matches_stat(&self, file_size: u64, mtime: i64) -> bool {
        self.file_size == file_size && self.mtime == mtime
    }
}

/// The in-memory indexes guarded by the store's reader-writer lock
#[derive(Debug, Default)]
pub struct Indexes {
    /// Canonical path → stat fingerprint + content id
    pub paths: HashMap<PathBuf, PathIndexEntry>,
    /// Content id → loaded cache entry
    pub entries: HashMap<String, CacheEntry>,
}

impl Indexes {
    /// Load the path index file, tolerating absence. A corrupt index is
    /// discarded with a warning: the cache is reconstructible.
    pub fn load_path_index(index_path: &Path) -> Result<HashMap<PathBuf, PathIndexEntry>> {
        if !index_path.exists() {
            return Ok(HashMap::new());
        }
        let bytes = std::fs::read(index_path)?;
        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(err) => {
                tracing::warn!(
                    path = %index_path.display(),
                    error = %err,
                    "cache index unreadable, starting empty"
                );
                Ok(HashMap::new())
            }
        }
    }

    /// Persist the path index atomically: temp file in the same directory,
    /// then rename over the target.
    pub fn save_path_index(
        paths: &HashMap<PathBuf, PathIndexEntry>,
        index_path: &Path,
    ) -> Result<()> {
        let parent = index_path
            .parent()
            .ok_or_else(|| Error::Internal(format!("index path has no parent: {}", index_path.display())))?;
        let tmp = parent.join(".index.json.tmp");
        let bytes = serde_json::to_vec(paths)
            .map_err(|err| Error::Internal(format!("index serialisation failed: {err}")))?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, index_path)?;
        Ok(())
    }

    /// Load every entry file under `by_content/` into memory, skipping
    /// unreadable files with a warning.
    pub fn load_entries(by_content: &Path) -> Result<HashMap<String, CacheEntry>> {
        let mut entries = HashMap::new();
        if !by_content.exists() {
            return Ok(entries);
        }
        for shard in std::fs::read_dir(by_content)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(shard.path())? {
                let file = file?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match std::fs::read(&path)
                    .map_err(Error::from)
                    .and_then(|bytes| {
                        serde_json::from_slice::<CacheEntry>(&bytes).map_err(|err| {
                            Error::Internal(format!("entry parse failed: {err}"))
                        })
                    }) {
                    Ok(entry) => {
                        entries.insert(entry.content_id.clone(), entry);
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "skipping unreadable cache entry"
                        );
                    }
                }
            }
        }
        Ok(entries)
    }
}
