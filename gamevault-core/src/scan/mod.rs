//! Directory reconciliation.
//!
//! The [`ScanCoordinator`] turns top-level content folders into catalog
//! entities, keeps their manifests in step with the catalog, and queues them
//! for enrichment.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::manifest::{ChangeBatch, ManifestUpdate};
use crate::types::GameId;

pub mod coordinator;
pub mod report;
pub mod title;

pub use coordinator::ScanCoordinator;
pub use report::{DirectoryScanReport, ManifestAction, ScanReport};
pub use title::{parse_title, slugify};

/// What the filesystem watcher needs from the reconciliation side.
#[async_trait]
pub trait DirectoryReconciler: Send + Sync {
    /// Fully reconcile a content directory and return the entity it now tracks.
    async fn bootstrap(&self, dir: &Path) -> Result<GameId>;

    /// Apply a debounced change batch to a tracked directory.
    async fn apply_batch(
        &self,
        dir: &Path,
        entity_id: GameId,
        batch: &ChangeBatch,
    ) -> Result<ManifestUpdate>;
}
