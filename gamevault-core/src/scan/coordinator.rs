use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::config::ScanConfig;
use crate::enrichment::{EnrichmentQueue, TaskPriority};
use crate::error::{CatalogError, Result};
use crate::manifest::{ChangeBatch, ManifestBuilder, ManifestUpdate};
use crate::types::{GameEntity, GameId, GameUpdate, NewGame};

use super::DirectoryReconciler;
use super::report::{DirectoryScanReport, ManifestAction, ScanReport};
use super::title::{parse_title, slugify};

/// Upper bound on `-N` suffixes tried when folder names collide on a slug.
const MAX_SLUG_ATTEMPTS: usize = 100;

/// Reconciles content directories against the catalog.
///
/// Per directory: resolve (or create) the entity, then reconcile the manifest
/// and submit enrichment side by side. A failure in one step never blocks the
/// other, and no directory's failure affects another.
///
/// Scans, bootstraps, and incremental updates of the same directory are
/// serialized, so the watcher may run while a full scan is in progress.
pub struct ScanCoordinator {
    catalog: Arc<dyn CatalogStore>,
    builder: ManifestBuilder,
    queue: Arc<EnrichmentQueue>,
    max_concurrent_scans: usize,
    directory_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("builder", &self.builder)
            .field("queue", &self.queue)
            .field("max_concurrent_scans", &self.max_concurrent_scans)
            .finish()
    }
}

impl ScanCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        builder: ManifestBuilder,
        queue: Arc<EnrichmentQueue>,
        config: &ScanConfig,
    ) -> Self {
        Self {
            catalog,
            builder,
            queue,
            max_concurrent_scans: config.max_concurrent_scans.max(1),
            directory_locks: DashMap::new(),
        }
    }

    pub fn builder(&self) -> &ManifestBuilder {
        &self.builder
    }

    /// Scan every immediate subdirectory of every root.
    pub async fn scan_roots(&self, roots: &[PathBuf], force_enrich: bool) -> ScanReport {
        let mut report = ScanReport::default();
        let mut directories = Vec::new();
        for root in roots {
            match self.content_directories(root).await {
                Ok(found) => directories.extend(found),
                Err(err) => {
                    warn!(root = %root.display(), "skipping root: {err}");
                    report
                        .directories
                        .push(DirectoryScanReport::failed(root.clone(), err));
                }
            }
        }

        info!(
            roots = roots.len(),
            directories = directories.len(),
            "starting catalog scan"
        );

        let scanned: Vec<DirectoryScanReport> = stream::iter(directories)
            .map(|dir| async move { self.scan_directory(&dir, force_enrich).await })
            .buffer_unordered(self.max_concurrent_scans)
            .collect()
            .await;
        report.directories.extend(scanned);
        report.directories.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            created = report.created(),
            regenerated = report.regenerated(),
            reused = report.reused(),
            enrichment_submitted = report.enrichment_submitted(),
            failures = report.failures(),
            "catalog scan complete"
        );
        report
    }

    /// Immediate subdirectories of `root`, skipping excluded housekeeping names.
    pub async fn content_directories(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|_| CatalogError::InvalidDirectory(root.to_path_buf()))?;

        let mut directories = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| CatalogError::io(root, err))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            if !is_dir || self.builder.is_excluded(Path::new(&entry.file_name())) {
                continue;
            }
            directories.push(entry.path());
        }
        directories.sort();
        Ok(directories)
    }

    /// Run the three reconciliation steps for one content directory.
    pub async fn scan_directory(&self, dir: &Path, force_enrich: bool) -> DirectoryScanReport {
        let _guard = self.lock_directory(dir).await;
        let (entity, created) = match self.resolve_entity(dir).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(dir = %dir.display(), "entity resolution failed: {err}");
                return DirectoryScanReport::failed(dir.to_path_buf(), err);
            }
        };

        // Manifest fields and enrichment fields are disjoint, so both may proceed at once.
        let (manifest, enrichment_submitted) = tokio::join!(
            self.reconcile_manifest(&entity, dir),
            self.submit_enrichment(&entity, force_enrich),
        );
        let manifest = match manifest {
            Ok(action) => action,
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    entity = %entity.id,
                    "manifest reconciliation failed: {err}"
                );
                ManifestAction::Failed(err.to_string())
            }
        };

        DirectoryScanReport {
            path: dir.to_path_buf(),
            entity_id: Some(entity.id),
            created,
            manifest: Some(manifest),
            enrichment_submitted,
            error: None,
        }
    }

    /// Resolve the entity owning `dir`, creating it when absent.
    ///
    /// The directory path is the identity. The slug comes from the folder name;
    /// when another directory already holds it, a numeric suffix is appended.
    pub async fn resolve_entity(&self, dir: &Path) -> Result<(GameEntity, bool)> {
        let folder_name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CatalogError::InvalidDirectory(dir.to_path_buf()))?;
        let base_slug = slugify(&folder_name);
        if base_slug.is_empty() {
            return Err(CatalogError::EntityCreation {
                slug: folder_name,
                reason: "folder name yields an empty slug".to_string(),
            });
        }

        if let Some(entity) = self.catalog.find_by_path(dir).await? {
            return Ok((entity, false));
        }

        let name = parse_title(&folder_name);
        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let slug = match attempt {
                1 => base_slug.clone(),
                n => format!("{base_slug}-{n}"),
            };
            if self.catalog.find_by_slug(&slug).await?.is_some() {
                continue;
            }

            let request = NewGame {
                name: name.clone(),
                slug,
                path: dir.to_path_buf(),
            };
            match self.catalog.create(request).await {
                Ok(entity) => {
                    info!(
                        dir = %dir.display(),
                        entity = %entity.id,
                        title = %entity.name,
                        slug = %entity.slug,
                        "catalog entity created"
                    );
                    return Ok((entity, true));
                }
                // Slug claimed concurrently; by this directory or another one.
                Err(CatalogError::EntityCreation { .. }) => {
                    if let Some(entity) = self.catalog.find_by_path(dir).await? {
                        return Ok((entity, false));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(CatalogError::EntityCreation {
            slug: base_slug,
            reason: format!("no free slug after {MAX_SLUG_ATTEMPTS} attempts"),
        })
    }

    /// Regenerate the manifest unless the persisted one matches the recorded hash.
    pub async fn reconcile_manifest(
        &self,
        entity: &GameEntity,
        dir: &Path,
    ) -> Result<ManifestAction> {
        let current = self.builder.quick_hash(dir).await?;
        let up_to_date = match (&entity.manifest_hash, &current) {
            (Some(recorded), Some(current)) => recorded == current,
            _ => false,
        };
        if up_to_date {
            debug!(dir = %dir.display(), entity = %entity.id, "manifest unchanged; reusing");
            return Ok(ManifestAction::Reused);
        }

        let manifest = self.builder.generate(entity.id, dir).await?;
        self.record_manifest(entity.id, dir, manifest.total_size)
            .await?;
        Ok(ManifestAction::Regenerated)
    }

    /// Queue enrichment for never-enriched entities, or unconditionally when forced.
    pub async fn submit_enrichment(&self, entity: &GameEntity, force: bool) -> bool {
        if !force && entity.scraped_at.is_some() {
            return false;
        }
        let priority = if force {
            TaskPriority::High
        } else {
            TaskPriority::Normal
        };
        self.queue.submit(entity.clone(), priority).await
    }

    /// Incrementally update a tracked directory's manifest and mirror its hash and size.
    pub async fn apply_changes(
        &self,
        dir: &Path,
        entity_id: GameId,
        batch: &ChangeBatch,
    ) -> Result<ManifestUpdate> {
        let _guard = self.lock_directory(dir).await;
        let outcome = self.builder.update(entity_id, dir, batch).await?;
        if let Some(manifest) = outcome.manifest() {
            self.record_manifest(entity_id, dir, manifest.total_size)
                .await?;
        }
        Ok(outcome)
    }

    /// Exclusive access to one directory's manifest and entity resolution.
    async fn lock_directory(&self, dir: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .directory_locks
            .entry(dir.to_path_buf())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn record_manifest(&self, entity_id: GameId, dir: &Path, total_size: u64) -> Result<()> {
        let hash = self
            .builder
            .quick_hash(dir)
            .await?
            .ok_or_else(|| {
                CatalogError::Internal(format!("no manifest after write in {}", dir.display()))
            })?;
        self.catalog
            .update_fields(entity_id, GameUpdate::manifest(hash, total_size))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryReconciler for ScanCoordinator {
    async fn bootstrap(&self, dir: &Path) -> Result<GameId> {
        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        let name = Path::new(dir.file_name().unwrap_or_default());
        if !is_dir || self.builder.is_excluded(name) {
            return Err(CatalogError::InvalidDirectory(dir.to_path_buf()));
        }

        let _guard = self.lock_directory(dir).await;
        let (entity, _) = self.resolve_entity(dir).await?;
        let (manifest, _) = tokio::join!(
            self.reconcile_manifest(&entity, dir),
            self.submit_enrichment(&entity, false),
        );
        manifest?;
        Ok(entity.id)
    }

    async fn apply_batch(
        &self,
        dir: &Path,
        entity_id: GameId,
        batch: &ChangeBatch,
    ) -> Result<ManifestUpdate> {
        self.apply_changes(dir, entity_id, batch).await
    }
}
