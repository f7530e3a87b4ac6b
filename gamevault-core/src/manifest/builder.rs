use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ManifestConfig;
use crate::error::{CatalogError, Result};
use crate::fingerprint;
use crate::types::GameId;

use super::{ChangeBatch, ContentEntry, DirectoryManifest, relative_key};

/// Result of applying a change batch to a persisted manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestUpdate {
    /// The batch produced no net change; nothing was written.
    Unchanged,
    /// Entries were edited in place and the manifest re-persisted.
    Updated(DirectoryManifest),
    /// No usable manifest existed, so a full one was generated.
    Regenerated(DirectoryManifest),
}

impl ManifestUpdate {
    pub fn manifest(&self) -> Option<&DirectoryManifest> {
        match self {
            ManifestUpdate::Unchanged => None,
            ManifestUpdate::Updated(manifest) | ManifestUpdate::Regenerated(manifest) => {
                Some(manifest)
            }
        }
    }
}

/// Builds, updates, and persists directory manifests.
#[derive(Clone)]
pub struct ManifestBuilder {
    file_name: String,
    max_concurrent_hashes: usize,
    exclude_patterns: Vec<String>,
}

impl fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("file_name", &self.file_name)
            .field("max_concurrent_hashes", &self.max_concurrent_hashes)
            .field("exclude_pattern_count", &self.exclude_patterns.len())
            .finish()
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new(&ManifestConfig::default())
    }
}

impl ManifestBuilder {
    pub fn new(config: &ManifestConfig) -> Self {
        Self {
            file_name: config.file_name.clone(),
            max_concurrent_hashes: config.max_concurrent_hashes.max(1),
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.file_name)
    }

    fn staging_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.tmp", self.file_name))
    }

    /// Whether a path relative to a content directory is housekeeping noise.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if relative == Path::new(&self.file_name)
            || relative == Path::new(&format!("{}.tmp", self.file_name))
        {
            return true;
        }
        relative.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.exclude_patterns
                .iter()
                .any(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()))
        })
    }

    /// Walk `root`, fingerprint every file, persist, and return a fresh manifest.
    pub async fn generate(&self, entity_id: GameId, root: &Path) -> Result<DirectoryManifest> {
        ensure_directory(root).await?;

        let files = self.collect_files(root, root).await?;
        let discovered = files.len();
        let entries = self.fingerprint_files(root, files).await;

        let mut mapped = BTreeMap::new();
        for (key, outcome) in entries {
            match outcome {
                Ok(entry) => {
                    mapped.insert(key, entry);
                }
                Err(err) => {
                    warn!(dir = %root.display(), file = %key, "skipping file: {err}");
                }
            }
        }

        let manifest = DirectoryManifest::new(entity_id, mapped);
        self.persist(root, &manifest).await?;

        info!(
            dir = %root.display(),
            entity = %entity_id,
            discovered,
            files = manifest.file_count,
            total_size = manifest.total_size,
            "manifest generated"
        );
        Ok(manifest)
    }

    /// Apply a change batch to the persisted manifest.
    ///
    /// Falls back to [`ManifestBuilder::generate`] when no readable manifest exists.
    pub async fn update(
        &self,
        entity_id: GameId,
        root: &Path,
        changes: &ChangeBatch,
    ) -> Result<ManifestUpdate> {
        ensure_directory(root).await?;

        let existing = match self.load(root).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(dir = %root.display(), "unreadable manifest, regenerating: {err}");
                None
            }
        };
        let Some(mut manifest) = existing else {
            let manifest = self.generate(entity_id, root).await?;
            return Ok(ManifestUpdate::Regenerated(manifest));
        };

        let mut changed = false;
        for path in changes.removed() {
            if let Some(key) = relative_key(root, path) {
                changed |= manifest.remove_path(&key);
            }
        }

        let mut targets = Vec::new();
        for path in changes.upserts() {
            let Some(key) = relative_key(root, path) else {
                continue;
            };
            if self.is_excluded(Path::new(&key)) {
                continue;
            }
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_dir() => {
                    targets.extend(self.collect_files(root, path).await?);
                }
                Ok(_) => targets.push(path.to_path_buf()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    changed |= manifest.remove_path(&key);
                }
                Err(err) => {
                    warn!(dir = %root.display(), file = %key, "skipping changed path: {err}");
                }
            }
        }

        for (key, outcome) in self.fingerprint_files(root, targets).await {
            match outcome {
                Ok(entry) => {
                    if manifest.files.get(&key) != Some(&entry) {
                        manifest.files.insert(key, entry);
                        changed = true;
                    }
                }
                Err(err) if err.is_not_found() => {
                    changed |= manifest.remove_path(&key);
                }
                Err(err) => {
                    warn!(dir = %root.display(), file = %key, "skipping file: {err}");
                }
            }
        }

        if !changed {
            debug!(dir = %root.display(), "change batch produced no manifest delta");
            return Ok(ManifestUpdate::Unchanged);
        }

        manifest.recompute_totals();
        manifest.generated_at = Utc::now();
        self.persist(root, &manifest).await?;

        info!(
            dir = %root.display(),
            entity = %manifest.entity_id,
            files = manifest.file_count,
            total_size = manifest.total_size,
            "manifest updated"
        );
        Ok(ManifestUpdate::Updated(manifest))
    }

    /// Fingerprint of the persisted manifest file; `None` when there is no manifest.
    pub async fn quick_hash(&self, root: &Path) -> Result<Option<String>> {
        let path = self.manifest_path(root);
        match fingerprint::hash_file(&path).await {
            Ok(hash) => Ok(Some(hash)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Read the persisted manifest, if any.
    pub async fn load(&self, root: &Path) -> Result<Option<DirectoryManifest>> {
        let path = self.manifest_path(root);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CatalogError::io(path, err)),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn persist(&self, root: &Path, manifest: &DirectoryManifest) -> Result<()> {
        let staging = self.staging_path(root);
        let target = self.manifest_path(root);
        let body = serde_json::to_vec_pretty(manifest)?;

        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| CatalogError::io(&staging, err))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|err| CatalogError::io(&target, err))
    }

    /// List files under `start` (which lives inside `root`), skipping excluded paths.
    async fn collect_files(&self, root: &Path, start: &Path) -> Result<Vec<PathBuf>> {
        let builder = self.clone();
        let root = root.to_path_buf();
        let start = start.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let walker = WalkDir::new(&start)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| match entry.path().strip_prefix(&root) {
                    Ok(relative) if relative.as_os_str().is_empty() => true,
                    Ok(relative) => !builder.is_excluded(relative),
                    Err(_) => false,
                });

            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(dir = %root.display(), "walk error: {err}");
                    }
                }
            }
            files
        })
        .await
        .map_err(|err| CatalogError::Internal(format!("directory walk failed: {err}")))
    }

    /// Fingerprint `files` with at most `max_concurrent_hashes` in flight.
    async fn fingerprint_files(
        &self,
        root: &Path,
        files: Vec<PathBuf>,
    ) -> Vec<(String, Result<ContentEntry>)> {
        let keyed: Vec<(String, PathBuf)> = files
            .into_iter()
            .filter_map(|path| relative_key(root, &path).map(|key| (key, path)))
            .collect();

        stream::iter(keyed)
            .map(|(key, path)| async move { (key, content_entry(path).await) })
            .buffer_unordered(self.max_concurrent_hashes)
            .collect()
            .await
    }
}

async fn ensure_directory(root: &Path) -> Result<()> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(CatalogError::InvalidDirectory(root.to_path_buf())),
    }
}

async fn content_entry(path: PathBuf) -> Result<ContentEntry> {
    tokio::task::spawn_blocking(move || {
        let meta = std::fs::metadata(&path).map_err(|err| CatalogError::io(&path, err))?;
        let modified = meta
            .modified()
            .map_err(|err| CatalogError::io(&path, err))?;
        let hash = fingerprint::hash_file_blocking(&path)?;
        Ok(ContentEntry {
            size: meta.len(),
            modified_time: DateTime::<Utc>::from(modified),
            hash,
        })
    })
    .await
    .map_err(|err| CatalogError::Internal(format!("fingerprint task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn housekeeping_paths_are_excluded() {
        let builder = ManifestBuilder::default();
        assert!(builder.is_excluded(Path::new(".git/HEAD")));
        assert!(builder.is_excluded(Path::new("Data/.DS_Store")));
        assert!(builder.is_excluded(Path::new("download.tmp")));
        assert!(builder.is_excluded(Path::new("manifest.json")));
        assert!(!builder.is_excluded(Path::new("Data/manifest.json")));
        assert!(!builder.is_excluded(Path::new("bin/game.exe")));
    }

    #[tokio::test]
    async fn generate_skips_excluded_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "game.exe", &[0u8; 12]);
        write(dir.path(), "data/level1.pak", &[1u8; 30]);
        write(dir.path(), ".git/config", b"[core]");
        write(dir.path(), "Thumbs.db", b"x");

        let builder = ManifestBuilder::default();
        let manifest = builder.generate(GameId::new(), dir.path()).await.unwrap();

        assert_eq!(
            manifest.files.keys().cloned().collect::<Vec<_>>(),
            vec!["data/level1.pak".to_string(), "game.exe".to_string()]
        );
        assert_eq!(manifest.total_size, 42);

        let persisted = builder.load(dir.path()).await.unwrap().unwrap();
        assert_eq!(persisted, manifest);
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[tokio::test]
    async fn generate_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestBuilder::default()
            .generate(GameId::new(), &dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDirectory(_)));
    }

    #[tokio::test]
    async fn quick_hash_is_empty_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ManifestBuilder::default();
        assert_eq!(builder.quick_hash(dir.path()).await.unwrap(), None);

        builder.generate(GameId::new(), dir.path()).await.unwrap();
        let hash = builder.quick_hash(dir.path()).await.unwrap().unwrap();
        assert_eq!(hash.len(), fingerprint::DIGEST_HEX_LEN);
    }

    #[tokio::test]
    async fn update_without_manifest_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.bin", b"abc");

        let outcome = ManifestBuilder::default()
            .update(GameId::new(), dir.path(), &ChangeBatch::new())
            .await
            .unwrap();
        match outcome {
            ManifestUpdate::Regenerated(manifest) => assert_eq!(manifest.file_count, 1),
            other => panic!("expected regeneration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_manifest_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.bin", b"abc");
        write(dir.path(), "manifest.json", b"{ not json");

        let outcome = ManifestBuilder::default()
            .update(GameId::new(), dir.path(), &ChangeBatch::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ManifestUpdate::Regenerated(_)));
    }

    #[tokio::test]
    async fn no_op_batch_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.bin", b"abc");
        let builder = ManifestBuilder::default();
        builder.generate(GameId::new(), dir.path()).await.unwrap();
        let before = builder.quick_hash(dir.path()).await.unwrap();

        let mut batch = ChangeBatch::new();
        batch.record_modified(dir.path().join("a.bin"));
        batch.record_removed(dir.path().join("never-existed.bin"));
        let outcome = builder
            .update(GameId::new(), dir.path(), &batch)
            .await
            .unwrap();

        assert_eq!(outcome, ManifestUpdate::Unchanged);
        assert_eq!(builder.quick_hash(dir.path()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn added_directory_expands_and_removed_directory_drops() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "old/one.bin", b"1");
        write(dir.path(), "old/two.bin", b"22");
        let builder = ManifestBuilder::default();
        builder.generate(GameId::new(), dir.path()).await.unwrap();

        fs::remove_dir_all(dir.path().join("old")).unwrap();
        write(dir.path(), "dlc/maps/a.map", b"aaaa");
        write(dir.path(), "dlc/maps/b.map", b"bbbbb");

        let mut batch = ChangeBatch::new();
        batch.record_removed(dir.path().join("old"));
        batch.record_added(dir.path().join("dlc"));
        let outcome = builder
            .update(GameId::new(), dir.path(), &batch)
            .await
            .unwrap();

        let manifest = outcome.manifest().unwrap();
        assert_eq!(
            manifest.files.keys().cloned().collect::<Vec<_>>(),
            vec!["dlc/maps/a.map".to_string(), "dlc/maps/b.map".to_string()]
        );
        assert_eq!(manifest.total_size, 9);
    }

    #[tokio::test]
    async fn vanished_upsert_counts_as_removal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.bin", b"k");
        write(dir.path(), "gone.bin", b"g");
        let builder = ManifestBuilder::default();
        builder.generate(GameId::new(), dir.path()).await.unwrap();

        fs::remove_file(dir.path().join("gone.bin")).unwrap();
        let mut batch = ChangeBatch::new();
        batch.record_modified(dir.path().join("gone.bin"));
        let outcome = builder
            .update(GameId::new(), dir.path(), &batch)
            .await
            .unwrap();

        let manifest = outcome.manifest().unwrap();
        assert_eq!(manifest.file_count, 1);
        assert!(manifest.files.contains_key("keep.bin"));
    }
}
