//! Directory manifests.
//!
//! A manifest records size, modification time, and fingerprint for every file
//! under a content directory. It is persisted next to the content so a later
//! pass can detect drift by hashing one small file instead of the whole tree.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::GameId;

pub mod builder;
pub mod changes;

pub use builder::{ManifestBuilder, ManifestUpdate};
pub use changes::ChangeBatch;

/// Format version stamped on generated manifests.
pub const MANIFEST_VERSION: &str = "1.0";

/// Fingerprint of one file, keyed in the manifest by its relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub hash: String,
}

/// Persisted record of one content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryManifest {
    pub version: String,
    pub entity_id: GameId,
    pub generated_at: DateTime<Utc>,
    pub files: BTreeMap<String, ContentEntry>,
    pub total_size: u64,
    pub file_count: usize,
}

impl DirectoryManifest {
    pub fn new(entity_id: GameId, files: BTreeMap<String, ContentEntry>) -> Self {
        let mut manifest = Self {
            version: MANIFEST_VERSION.to_string(),
            entity_id,
            generated_at: Utc::now(),
            files,
            total_size: 0,
            file_count: 0,
        };
        manifest.recompute_totals();
        manifest
    }

    /// Restore the `total_size` / `file_count` invariants after editing `files`.
    pub fn recompute_totals(&mut self) {
        self.total_size = self.files.values().map(|entry| entry.size).sum();
        self.file_count = self.files.len();
    }

    /// Drop `key` and, when it names a directory, everything beneath it.
    /// Returns whether any entry was removed.
    pub fn remove_path(&mut self, key: &str) -> bool {
        let before = self.files.len();
        self.files.remove(key);
        let prefix = format!("{key}/");
        self.files.retain(|path, _| !path.starts_with(&prefix));
        self.files.len() != before
    }
}

/// Manifest key for `path`: relative to `root`, forward-slash separated.
///
/// Returns `None` for paths outside `root`, for `root` itself, and for paths
/// that try to escape through `..`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
