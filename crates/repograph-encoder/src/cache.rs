//! Content-addressed semantic feature cache.
//!
//! Maps `(file_path, qualified_name, content_hash)` to extracted features so
//! re-encoding and evolution only pay for changed fragments. Persisted as a
//! keyed record file under the repository workspace; writers serialize on a
//! single owner and save at explicit save points.

use chrono::{DateTime, Utc};
use repograph_core::{RpgResult, SemanticFeature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const CACHE_FILE: &str = "features.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    feature: SemanticFeature,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: HashMap<String, CacheRecord>,
}

/// Persistent feature cache with read-through semantics.
#[derive(Debug)]
pub struct FeatureCache {
    path: PathBuf,
    entries: HashMap<String, CacheRecord>,
    dirty: bool,
}

/// Hex SHA-256 of a source fragment.
pub fn content_hash(fragment: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fragment.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn cache_key(file_path: &str, qualified_name: &str, hash: &str) -> String {
    format!("{file_path}::{qualified_name}::{hash}")
}

impl FeatureCache {
    /// Load the cache from `dir/features.json`, starting empty when the file
    /// does not exist or cannot be read.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CACHE_FILE);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CacheFile>(&raw).ok())
            .map(|f| f.entries)
            .unwrap_or_default();
        debug!(entries = entries.len(), path = %path.display(), "loaded feature cache");
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn get(
        &self,
        file_path: &str,
        qualified_name: &str,
        fragment: &str,
    ) -> Option<SemanticFeature> {
        let key = cache_key(file_path, qualified_name, &content_hash(fragment));
        self.entries.get(&key).map(|r| r.feature.clone())
    }

    pub fn set(
        &mut self,
        file_path: &str,
        qualified_name: &str,
        fragment: &str,
        feature: SemanticFeature,
    ) {
        let key = cache_key(file_path, qualified_name, &content_hash(fragment));
        self.entries.insert(
            key,
            CacheRecord {
                feature,
                created_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Drop every entry for a file (all qualified names, all hashes).
    pub fn invalidate_file(&mut self, file_path: &str) {
        let prefix = format!("{file_path}::");
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    /// Persist if dirty. An explicit save point, not a per-write flush.
    pub fn save(&mut self) -> RpgResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            entries: self.entries.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = FeatureCache::load(tmp.path());
        cache.set(
            "src/a.py",
            "Loader.load",
            "def load(self): ...",
            SemanticFeature::new("load records"),
        );
        cache.save().unwrap();

        let reloaded = FeatureCache::load(tmp.path());
        let hit = reloaded.get("src/a.py", "Loader.load", "def load(self): ...");
        assert_eq!(hit.unwrap().description, "load records");
    }

    #[test]
    fn content_change_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = FeatureCache::load(tmp.path());
        cache.set("a.py", "f", "v1", SemanticFeature::new("do one thing"));
        assert!(cache.get("a.py", "f", "v2").is_none());
    }

    #[test]
    fn invalidate_file_drops_all_entries_for_that_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = FeatureCache::load(tmp.path());
        cache.set("a.py", "f", "v1", SemanticFeature::new("do one thing"));
        cache.set("a.py", "g", "v1", SemanticFeature::new("do another thing"));
        cache.set("b.py", "h", "v1", SemanticFeature::new("stay cached"));
        cache.invalidate_file("a.py");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b.py", "h", "v1").is_some());
    }

    #[test]
    fn save_without_changes_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = FeatureCache::load(tmp.path());
        cache.save().unwrap();
        assert!(!tmp.path().join(CACHE_FILE).exists());
    }
}
