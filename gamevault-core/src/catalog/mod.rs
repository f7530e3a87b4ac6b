//! Catalog store boundary.
//!
//! The core never owns the catalog schema; it reads and patches entities
//! through [`CatalogStore`]. [`InMemoryCatalog`] backs tests and the daemon.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GameEntity, GameId, GameUpdate, NewGame};

pub mod memory;

pub use memory::InMemoryCatalog;

/// Entity persistence consumed by the scanner, watcher, and enrichment pool.
///
/// Implementations must serialize writes per entity; writes to different
/// entities may proceed concurrently.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_id(&self, id: GameId) -> Result<Option<GameEntity>>;

    async fn find_by_path(&self, path: &Path) -> Result<Option<GameEntity>>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GameEntity>>;

    /// Create an entity. Fails with `EntityCreation` when the slug is taken.
    async fn create(&self, request: NewGame) -> Result<GameEntity>;

    /// Patch the given fields of one entity and return the updated record.
    async fn update_fields(&self, id: GameId, update: GameUpdate) -> Result<GameEntity>;
}
