//! Conversion Cache
//!
//! Converted output stored per source path next to the sha256 of the source
//! it came from. Entries written by a different build of the converters are
//! ignored, so a converter change never serves stale output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const CONVERTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    converter: String,
    source_hash: String,
    output: String,
}

pub struct ConversionCache {
    dir: PathBuf,
}

impl ConversionCache {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(dir) {
            log::warn!("cache disabled, cannot create {}: {}", dir.display(), e);
        }
        ConversionCache {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_hash(source: &str) -> String {
        format!("{:x}", Sha256::digest(source.as_bytes()))
    }

    /// `pages/home/index.wxml` → `<dir>/pages_home_index.wxml.json`.
    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Cached output for `key` if it was produced from exactly `source` by
    /// this build.
    pub fn get(&self, key: &str, source: &str) -> Option<String> {
        let path = self.entry_path(key);
        let data = fs::read_to_string(&path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("discarding corrupt cache entry for {}: {}", key, e);
                self.remove(key);
                return None;
            }
        };

        let fresh = entry.converter == CONVERTER_VERSION
            && entry.source_hash == Self::source_hash(source);
        fresh.then_some(entry.output)
    }

    pub fn set(&self, key: &str, source: &str, output: &str) {
        let entry = CacheEntry {
            converter: CONVERTER_VERSION.to_string(),
            source_hash: Self::source_hash(source),
            output: output.to_string(),
        };
        let path = self.entry_path(key);
        let written = serde_json::to_string(&entry)
            .map_err(|e| e.to_string())
            .and_then(|data| fs::write(&path, data).map_err(|e| e.to_string()));
        if let Err(e) = written {
            log::warn!("failed to write cache entry {}: {}", path.display(), e);
        }
    }

    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }
}
