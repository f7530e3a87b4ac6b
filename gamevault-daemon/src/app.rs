use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gamevault_core::providers::{self, MetadataProvider};
use gamevault_core::{
    DirectoryReconciler, Enricher, EnrichmentPool, EnrichmentQueue, FsWatchService,
    InMemoryCatalog, ManifestBuilder, MergePolicy, ScanCoordinator, ScanReport, VaultConfig,
};
use tracing::{info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The composed process: catalog, scanner, enrichment pool, and watcher.
pub struct Vault {
    config: VaultConfig,
    roots: Vec<PathBuf>,
    catalog: Arc<InMemoryCatalog>,
    queue: Arc<EnrichmentQueue>,
    coordinator: Arc<ScanCoordinator>,
    pool: EnrichmentPool,
    snapshot: Option<PathBuf>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("roots", &self.roots)
            .field("catalog_entities", &self.catalog.len())
            .field("pool", &self.pool)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl Vault {
    pub async fn build(config: VaultConfig, snapshot: Option<PathBuf>) -> anyhow::Result<Self> {
        let providers = providers::from_config(&config.providers);
        Self::build_with_providers(config, snapshot, providers).await
    }

    pub async fn build_with_providers(
        config: VaultConfig,
        snapshot: Option<PathBuf>,
        providers: Vec<Arc<dyn MetadataProvider>>,
    ) -> anyhow::Result<Self> {
        let catalog = match &snapshot {
            Some(path) => {
                let catalog = InMemoryCatalog::load_snapshot(path).await.with_context(|| {
                    format!("failed to load catalog snapshot {}", path.display())
                })?;
                info!(path = %path.display(), entities = catalog.len(), "catalog snapshot loaded");
                catalog
            }
            None => InMemoryCatalog::new(),
        };
        let catalog = Arc::new(catalog);

        let roots: Vec<PathBuf> = config.roots.iter().map(|root| resolve_root(root)).collect();
        let queue = Arc::new(EnrichmentQueue::new());
        let coordinator = Arc::new(ScanCoordinator::new(
            catalog.clone(),
            ManifestBuilder::new(&config.manifest),
            Arc::clone(&queue),
            &config.scan,
        ));

        info!(
            providers = ?providers.iter().map(|p| p.kind()).collect::<Vec<_>>(),
            authoritative = %config.enrichment.authoritative,
            "metadata providers configured"
        );
        let enricher = Arc::new(Enricher::new(
            catalog.clone(),
            providers,
            MergePolicy::new(config.enrichment.authoritative),
        ));
        let pool = EnrichmentPool::new(Arc::clone(&queue), enricher);

        Ok(Self {
            config,
            roots,
            catalog,
            queue,
            coordinator,
            pool,
            snapshot,
        })
    }

    pub fn catalog(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    /// Single pass: reconcile every root, drain enrichment, save, exit.
    pub async fn run_once(&self, force_enrich: bool) -> anyhow::Result<ScanReport> {
        self.pool.start(self.config.enrichment.workers).await;
        let report = self.coordinator.scan_roots(&self.roots, force_enrich).await;

        self.wait_for_enrichment().await;
        let grace = self.config.enrichment.shutdown_grace();
        self.pool.shutdown(grace).await;
        self.persist().await?;
        Ok(report)
    }

    /// Watch every root, reconcile them, then keep watching until `shutdown` resolves.
    pub async fn serve<S>(&self, force_enrich: bool, shutdown: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()>,
    {
        self.pool.start(self.config.enrichment.workers).await;

        // Subscribe before scanning so changes made during the scan are seen.
        let reconciler: Arc<dyn DirectoryReconciler> = self.coordinator.clone();
        let watcher = FsWatchService::start(
            &self.config.watch,
            &self.roots,
            self.coordinator.builder().clone(),
            reconciler,
        )
        .await
        .context("failed to start filesystem watcher")?;

        let report = self.coordinator.scan_roots(&self.roots, force_enrich).await;
        for scanned in &report.directories {
            if let Some(entity_id) = scanned.entity_id {
                watcher.track(scanned.path.clone(), entity_id).await;
            }
        }

        info!("gamevault running; waiting for shutdown signal");
        shutdown.await;
        info!("shutdown signal received");

        // Subscriptions and pending batches first, then in-flight enrichment.
        watcher.shutdown().await;
        let grace = self.config.enrichment.shutdown_grace();
        self.pool.shutdown(grace).await;
        self.persist().await
    }

    async fn wait_for_enrichment(&self) {
        loop {
            let active = self.queue.active_len().await;
            if active == 0 {
                break;
            }
            tracing::debug!(active, "waiting for enrichment to drain");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        self.catalog
            .save_snapshot(path)
            .await
            .with_context(|| format!("failed to save catalog snapshot {}", path.display()))?;
        info!(path = %path.display(), entities = self.catalog.len(), "catalog snapshot saved");
        Ok(())
    }
}

/// Canonical form of a root so watcher paths line up with scanned paths.
fn resolve_root(root: &Path) -> PathBuf {
    match root.canonicalize() {
        Ok(canonical) => canonical,
        Err(err) => {
            warn!(root = %root.display(), "cannot canonicalize content root: {err}");
            std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
        }
    }
}
