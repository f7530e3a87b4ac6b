//! # GameVault Core
//!
//! Keeps a catalog of game installation folders in step with what is on disk
//! and enriches each entry with metadata from external providers.
//!
//! ## Overview
//!
//! - **Fingerprinting**: chunked SHA-256 of individual files
//! - **Manifests**: per-directory content manifests, generated in full or
//!   updated incrementally, persisted inside the content directory
//! - **Scanning**: reconciliation of top-level content folders against the
//!   catalog, with title cleanup for new entries
//! - **Watching**: debounced per-directory change batches fed by OS notifications
//! - **Enrichment**: a priority queue drained by a worker pool that merges
//!   results from Steam and IGDB
//!
//! ## Feature Flags
//!
//! - `fs-watch` (default): live filesystem watching via `notify`
//!
//! ## Architecture
//!
//! - [`fingerprint`]: file content hashing
//! - [`manifest`]: [`DirectoryManifest`] model and [`ManifestBuilder`]
//! - [`catalog`]: the [`CatalogStore`] boundary and an in-memory store
//! - [`scan`]: [`ScanCoordinator`] and title parsing
//! - [`enrichment`]: queue, workers, and merge policy
//! - [`providers`]: external metadata sources
//!
//! ## Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use gamevault_core::{
//!     EnrichmentQueue, InMemoryCatalog, ManifestBuilder, ScanCoordinator, VaultConfig,
//! };
//!
//! async fn scan_once(config: &VaultConfig) {
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     let queue = Arc::new(EnrichmentQueue::new());
//!     let coordinator = ScanCoordinator::new(
//!         catalog,
//!         ManifestBuilder::new(&config.manifest),
//!         queue,
//!         &config.scan,
//!     );
//!     let report = coordinator
//!         .scan_roots(&[PathBuf::from("/srv/games")], false)
//!         .await;
//!     println!("{} directories, {} failures", report.directories.len(), report.failures());
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod fingerprint;
#[cfg(feature = "fs-watch")]
#[cfg_attr(docsrs, doc(cfg(feature = "fs-watch")))]
pub mod fs_watch;
pub mod manifest;
pub mod providers;
pub mod scan;
pub mod types;

pub use catalog::{CatalogStore, InMemoryCatalog};
pub use config::VaultConfig;
pub use enrichment::{
    Enricher, EnrichmentPool, EnrichmentQueue, EnrichmentTask, MergePolicy, TaskPriority,
};
pub use error::{CatalogError, Result};
#[cfg(feature = "fs-watch")]
pub use fs_watch::FsWatchService;
pub use manifest::{ChangeBatch, ContentEntry, DirectoryManifest, ManifestBuilder, ManifestUpdate};
pub use providers::{MetadataProvider, ProviderError};
pub use scan::{DirectoryReconciler, ScanCoordinator, ScanReport};
pub use types::{GameEntity, GameId, GameMetadata, GameUpdate, NewGame, ProviderKind};
