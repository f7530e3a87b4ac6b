use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::providers::{MetadataProvider, ProviderError};
use crate::types::{GameEntity, GameMetadata, GameUpdate, ProviderKind};

use super::merge::MergePolicy;
use super::queue::EnrichmentTask;

/// What one enrichment pass achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    /// Providers that returned a record.
    pub fetched: Vec<ProviderKind>,
    /// Providers that answered but had no match for the entity.
    pub unmatched: Vec<ProviderKind>,
    /// Providers whose search or fetch failed.
    pub failed: Vec<ProviderKind>,
    /// Whether the entity was stamped as enriched.
    pub completed: bool,
}

enum Lookup {
    Found { id: String, discovered: bool },
    NoMatch,
}

/// Runs the search, fetch, merge, write sequence for one task.
pub struct Enricher {
    catalog: Arc<dyn CatalogStore>,
    providers: Vec<Arc<dyn MetadataProvider>>,
    policy: MergePolicy,
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<ProviderKind> = self.providers.iter().map(|p| p.kind()).collect();
        f.debug_struct("Enricher")
            .field("providers", &providers)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Enricher {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        providers: Vec<Arc<dyn MetadataProvider>>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            catalog,
            providers,
            policy,
        }
    }

    pub async fn enrich(&self, task: &EnrichmentTask) -> Result<EnrichmentOutcome> {
        // Prefer the live record: provider ids may have been learned since submission.
        let entity = self
            .catalog
            .find_by_id(task.entity_id)
            .await?
            .unwrap_or_else(|| task.entity.clone());

        let mut outcome = EnrichmentOutcome::default();
        if self.providers.is_empty() {
            debug!(entity = %entity.id, "no metadata providers configured");
            return Ok(outcome);
        }

        let lookups = join_all(
            self.providers
                .iter()
                .map(|provider| resolve_id(provider.as_ref(), &entity)),
        )
        .await;

        let mut discovered = BTreeMap::new();
        let mut targets = Vec::new();
        for (provider, lookup) in self.providers.iter().zip(lookups) {
            let kind = provider.kind();
            match lookup {
                Ok(Lookup::Found {
                    id,
                    discovered: new,
                }) => {
                    if new {
                        discovered.insert(kind, id.clone());
                    }
                    targets.push((Arc::clone(provider), id));
                }
                Ok(Lookup::NoMatch) => outcome.unmatched.push(kind),
                Err(err) => {
                    warn!(entity = %entity.id, provider = %kind, "search failed: {err}");
                    outcome.failed.push(kind);
                }
            }
        }

        let fetches = join_all(
            targets
                .iter()
                .map(|(provider, id)| async move { provider.fetch_details(id).await }),
        )
        .await;

        let mut records: Vec<(ProviderKind, GameMetadata)> = Vec::new();
        for ((provider, id), fetched) in targets.iter().zip(fetches) {
            let kind = provider.kind();
            match fetched {
                Ok(metadata) => {
                    outcome.fetched.push(kind);
                    records.push((kind, metadata));
                }
                Err(ProviderError::NotFound) => {
                    debug!(entity = %entity.id, provider = %kind, id = %id, "record not found");
                    outcome.unmatched.push(kind);
                }
                Err(err) => {
                    warn!(entity = %entity.id, provider = %kind, id = %id, "fetch failed: {err}");
                    outcome.failed.push(kind);
                }
            }
        }

        // A pass counts once any provider answered; only total failure leaves it retryable.
        outcome.completed = outcome.failed.len() < self.providers.len();

        let merged = self.policy.merge(&records);
        let update = GameUpdate {
            metadata: (!merged.is_empty()).then_some(merged),
            provider_ids: discovered,
            scraped_at: outcome.completed.then(Utc::now),
            ..GameUpdate::default()
        };

        if !update.is_empty() {
            self.catalog.update_fields(entity.id, update).await?;
        }

        if outcome.completed {
            info!(
                entity = %entity.id,
                name = %entity.name,
                fetched = ?outcome.fetched,
                unmatched = ?outcome.unmatched,
                failed = ?outcome.failed,
                "enrichment complete"
            );
        } else {
            warn!(
                entity = %entity.id,
                name = %entity.name,
                "every provider failed; enrichment will be retried"
            );
        }
        Ok(outcome)
    }
}

async fn resolve_id(
    provider: &dyn MetadataProvider,
    entity: &GameEntity,
) -> std::result::Result<Lookup, ProviderError> {
    if let Some(id) = entity.provider_id(provider.kind()) {
        return Ok(Lookup::Found {
            id: id.to_string(),
            discovered: false,
        });
    }
    Ok(match provider.search_by_name(&entity.name).await? {
        Some(id) => Lookup::Found {
            id,
            discovered: true,
        },
        None => Lookup::NoMatch,
    })
}
