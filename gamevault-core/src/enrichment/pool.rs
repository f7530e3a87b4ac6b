use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::GameEntity;

use super::queue::{EnrichmentQueue, TaskPriority};
use super::worker::Enricher;

/// Fixed-size set of workers draining an [`EnrichmentQueue`].
pub struct EnrichmentPool {
    queue: Arc<EnrichmentQueue>,
    enricher: Arc<Enricher>,
    shutdown_token: CancellationToken,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for EnrichmentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker_count = self
            .worker_handles
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();
        f.debug_struct("EnrichmentPool")
            .field("queue", &self.queue)
            .field("enricher", &self.enricher)
            .field("worker_count", &worker_count)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl EnrichmentPool {
    pub fn new(queue: Arc<EnrichmentQueue>, enricher: Arc<Enricher>) -> Self {
        Self {
            queue,
            enricher,
            shutdown_token: CancellationToken::new(),
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> Arc<EnrichmentQueue> {
        Arc::clone(&self.queue)
    }

    pub async fn submit(&self, entity: GameEntity, priority: TaskPriority) -> bool {
        self.queue.submit(entity, priority).await
    }

    /// Spawn `workers` worker tasks (at least one).
    pub async fn start(&self, workers: usize) {
        let mut handles = self.worker_handles.lock().await;
        for index in 0..workers.max(1) {
            let worker_id = format!("enrich-w{index}");
            let queue = Arc::clone(&self.queue);
            let enricher = Arc::clone(&self.enricher);
            let shutdown = self.shutdown_token.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Stop pulling once shutdown starts; a task already taken runs to completion.
                    let task = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        task = queue.next() => task,
                    };

                    let entity_id = task.entity_id;
                    tracing::debug!(
                        worker = %worker_id,
                        entity = %entity_id,
                        priority = ?task.priority,
                        "enrichment task dequeued"
                    );
                    // The entity is released even when enrichment panics.
                    let run = AssertUnwindSafe(enricher.enrich(&task)).catch_unwind();
                    match run.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(err)) => warn!(
                            worker = %worker_id,
                            entity = %entity_id,
                            "enrichment failed: {err}"
                        ),
                        Err(_) => warn!(
                            worker = %worker_id,
                            entity = %entity_id,
                            "enrichment panicked"
                        ),
                    }
                    queue.complete(entity_id).await;
                }
                tracing::debug!(worker = %worker_id, "enrichment worker stopped");
            }));
        }
        info!(workers = handles.len(), "enrichment pool started");
    }

    /// Stop pulling new tasks and wait up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) {
        info!("shutting down enrichment pool");
        self.shutdown_token.cancel();

        let handles = {
            let mut guard = self.worker_handles.lock().await;
            std::mem::take(&mut *guard)
        };
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(err) = result {
                        warn!("enrichment worker failed: {err:?}");
                    }
                }
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "enrichment workers timed out during shutdown"
                );
                for handle in aborts {
                    handle.abort();
                }
            }
        }
        info!("enrichment pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, InMemoryCatalog};
    use crate::enrichment::MergePolicy;
    use crate::providers::{MetadataProvider, MockMetadataProvider, ProviderError};
    use crate::types::{GameMetadata, NewGame, ProviderKind};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct PanicsOnCursed;

    #[async_trait]
    impl MetadataProvider for PanicsOnCursed {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Steam
        }

        async fn search_by_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
            if name == "Cursed" {
                panic!("search exploded");
            }
            Ok(Some(format!("id-{name}")))
        }

        async fn fetch_details(&self, _provider_id: &str) -> Result<GameMetadata, ProviderError> {
            Ok(GameMetadata::default())
        }
    }

    #[tokio::test]
    async fn workers_drain_queue_and_release_entities() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut mock = MockMetadataProvider::new();
        mock.expect_kind().return_const(ProviderKind::Steam);
        mock.expect_search_by_name()
            .returning(|name| Ok(Some(format!("id-{name}"))));
        mock.expect_fetch_details().returning(|_| {
            Ok(GameMetadata {
                description: Some("fetched".into()),
                ..GameMetadata::default()
            })
        });
        let providers: Vec<Arc<dyn MetadataProvider>> = vec![Arc::new(mock)];

        let enricher = Arc::new(Enricher::new(
            catalog.clone(),
            providers,
            MergePolicy::default(),
        ));
        let pool = EnrichmentPool::new(Arc::new(EnrichmentQueue::new()), enricher);
        pool.start(2).await;

        let mut ids = Vec::new();
        for name in ["Inside", "Limbo", "Braid"] {
            let entity = catalog
                .create(NewGame {
                    slug: name.to_lowercase(),
                    name: name.into(),
                    path: PathBuf::from("/games").join(name),
                })
                .await
                .unwrap();
            ids.push(entity.id);
            assert!(pool.submit(entity, TaskPriority::Normal).await);
        }

        for _ in 0..200 {
            if pool.queue().active_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pool.queue().active_len().await, 0);

        for id in ids {
            let entity = catalog.find_by_id(id).await.unwrap().unwrap();
            assert!(entity.scraped_at.is_some());
            assert_eq!(
                entity.provider_id(ProviderKind::Steam),
                Some(format!("id-{}", entity.name).as_str())
            );
        }

        pool.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn panicking_task_releases_entity_and_worker() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let providers: Vec<Arc<dyn MetadataProvider>> = vec![Arc::new(PanicsOnCursed)];

        let enricher = Arc::new(Enricher::new(
            catalog.clone(),
            providers,
            MergePolicy::default(),
        ));
        let pool = EnrichmentPool::new(Arc::new(EnrichmentQueue::new()), enricher);
        pool.start(1).await;

        let mut entities = Vec::new();
        for name in ["Cursed", "Fine"] {
            let entity = catalog
                .create(NewGame {
                    slug: name.to_lowercase(),
                    name: name.into(),
                    path: PathBuf::from("/games").join(name),
                })
                .await
                .unwrap();
            entities.push(entity);
        }

        assert!(pool.submit(entities[0].clone(), TaskPriority::Normal).await);
        for _ in 0..200 {
            if pool.queue().active_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pool.queue().active_len().await, 0);

        // The single worker must still be running.
        assert!(pool.submit(entities[1].clone(), TaskPriority::Normal).await);
        for _ in 0..200 {
            if pool.queue().active_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let fine = catalog.find_by_id(entities[1].id).await.unwrap().unwrap();
        assert!(fine.scraped_at.is_some());

        pool.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn shutdown_with_idle_workers_returns_promptly() {
        let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalog::new());
        let enricher = Arc::new(Enricher::new(catalog, Vec::new(), MergePolicy::default()));
        let pool = EnrichmentPool::new(Arc::new(EnrichmentQueue::new()), enricher);
        pool.start(3).await;

        let shutdown = pool.shutdown(Duration::from_secs(1));
        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("idle workers stop on cancellation");
    }
}
