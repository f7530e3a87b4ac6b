use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::types::{GameEntity, GameId, GameUpdate, NewGame};

use super::CatalogStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogSnapshot {
    entities: Vec<GameEntity>,
}

/// `CatalogStore` kept in process memory.
///
/// Each entity lives in its own `DashMap` slot, so updates lock one shard entry
/// rather than the whole catalog. Optional JSON snapshots carry state across
/// restarts.
#[derive(Default)]
pub struct InMemoryCatalog {
    entities: DashMap<GameId, GameEntity>,
    slugs: DashMap<String, GameId>,
    paths: DashMap<PathBuf, GameId>,
}

impl fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("entity_count", &self.entities.len())
            .finish()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities, ordered by slug.
    pub fn entities(&self) -> Vec<GameEntity> {
        let mut all: Vec<GameEntity> = self
            .entities
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.slug.cmp(&b.slug));
        all
    }

    fn insert(&self, entity: GameEntity) {
        self.slugs.insert(entity.slug.clone(), entity.id);
        self.paths.insert(entity.path.clone(), entity.id);
        self.entities.insert(entity.id, entity);
    }

    /// Restore a catalog from a snapshot file; a missing file yields an empty catalog.
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let catalog = Self::new();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(catalog),
            Err(err) => return Err(CatalogError::io(path, err)),
        };
        let snapshot: CatalogSnapshot = serde_json::from_slice(&raw)?;
        for entity in snapshot.entities {
            catalog.insert(entity);
        }
        debug!(path = %path.display(), entities = catalog.len(), "catalog snapshot loaded");
        Ok(catalog)
    }

    /// Write every entity to `path` (staged next to it, then renamed into place).
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = CatalogSnapshot {
            entities: self.entities(),
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| CatalogError::io(&staging, err))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|err| CatalogError::io(path, err))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_by_id(&self, id: GameId) -> Result<Option<GameEntity>> {
        Ok(self.entities.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_path(&self, path: &Path) -> Result<Option<GameEntity>> {
        let Some(id) = self.paths.get(path).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GameEntity>> {
        let Some(id) = self.slugs.get(slug).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn create(&self, request: NewGame) -> Result<GameEntity> {
        match self.slugs.entry(request.slug.clone()) {
            Entry::Occupied(_) => Err(CatalogError::EntityCreation {
                slug: request.slug,
                reason: "slug already exists".to_string(),
            }),
            Entry::Vacant(slot) => {
                let entity = GameEntity::new(request);
                slot.insert(entity.id);
                self.paths.insert(entity.path.clone(), entity.id);
                self.entities.insert(entity.id, entity.clone());
                Ok(entity)
            }
        }
    }

    async fn update_fields(&self, id: GameId, update: GameUpdate) -> Result<GameEntity> {
        let mut entry = self
            .entities
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        entry.apply(&update);
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use std::sync::Arc;

    fn request(slug: &str) -> NewGame {
        NewGame {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            path: PathBuf::from("/games").join(slug),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_entity_creation_failure() {
        let catalog = InMemoryCatalog::new();
        catalog.create(request("celeste")).await.unwrap();
        let err = catalog.create(request("celeste")).await.unwrap_err();
        assert!(matches!(err, CatalogError::EntityCreation { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn lookups_by_path_and_slug_agree() {
        let catalog = InMemoryCatalog::new();
        let created = catalog.create(request("hades")).await.unwrap();

        let by_slug = catalog.find_by_slug("hades").await.unwrap().unwrap();
        let by_path = catalog
            .find_by_path(Path::new("/games/hades"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_path.id, created.id);
        assert!(catalog.find_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_unknown_entity_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let err = catalog
            .update_fields(GameId::new(), GameUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_distinct_entities() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut ids = Vec::new();
        for index in 0..8 {
            let new_game = request(&format!("game-{index}"));
            ids.push(catalog.create(new_game).await.unwrap().id);
        }

        let mut handles = Vec::new();
        for (index, id) in ids.iter().copied().enumerate() {
            let catalog = Arc::clone(&catalog);
            handles.push(tokio::spawn(async move {
                let update = GameUpdate::manifest(format!("{index:064}"), index as u64);
                catalog.update_fields(id, update).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for (index, id) in ids.into_iter().enumerate() {
            let entity = catalog.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(entity.total_size, index as u64);
            assert!(entity.indexing_at.is_some());
        }
    }

    #[tokio::test]
    async fn snapshot_restores_entities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let catalog = InMemoryCatalog::new();
        let entity = catalog.create(request("outer-wilds")).await.unwrap();
        let update = GameUpdate {
            provider_ids: [(ProviderKind::Igdb, "11737".to_string())].into(),
            ..GameUpdate::manifest("ab".repeat(32), 1024)
        };
        catalog.update_fields(entity.id, update).await.unwrap();
        catalog.save_snapshot(&path).await.unwrap();

        let restored = InMemoryCatalog::load_snapshot(&path).await.unwrap();
        let found = restored.find_by_slug("outer-wilds").await.unwrap().unwrap();
        assert_eq!(found.total_size, 1024);
        assert_eq!(found.provider_id(ProviderKind::Igdb), Some("11737"));
        assert!(
            InMemoryCatalog::load_snapshot(&dir.path().join("absent.json"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
