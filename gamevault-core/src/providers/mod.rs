//! External metadata providers.
//!
//! A provider answers two questions: which of its records matches a display
//! name, and what that record says. Everything else (merging, retries,
//! persistence) belongs to the enrichment pool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ProvidersConfig;
use crate::types::{GameMetadata, ProviderKind};

pub mod igdb;
pub mod steam;

pub use igdb::IgdbProvider;
pub use steam::SteamProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A source of descriptive game metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Best match for `name`, as a provider-specific identifier.
    async fn search_by_name(&self, name: &str) -> Result<Option<String>, ProviderError>;

    /// Detailed record for an identifier previously returned by `search_by_name`.
    async fn fetch_details(&self, provider_id: &str) -> Result<GameMetadata, ProviderError>;
}

/// Build every provider the configuration enables.
///
/// Steam needs no credentials; IGDB is skipped unless both Twitch client
/// credentials are present.
pub fn from_config(config: &ProvidersConfig) -> Vec<Arc<dyn MetadataProvider>> {
    let mut providers: Vec<Arc<dyn MetadataProvider>> = Vec::new();
    if config.steam.enabled {
        providers.push(Arc::new(SteamProvider::new(&config.steam)));
    }
    if config.igdb.is_configured() {
        providers.push(Arc::new(IgdbProvider::new(&config.igdb)));
    } else {
        tracing::info!("IGDB credentials not configured; IGDB enrichment disabled");
    }
    providers
}

/// Decode a JSON response body, mapping HTTP failures onto [`ProviderError`].
pub(crate) async fn decode_json<T>(
    kind: ProviderKind,
    response: reqwest::Response,
) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        let body = response.bytes().await?;
        return serde_json::from_slice(&body)
            .map_err(|err| ProviderError::ParseError(format!("{kind}: {err}")));
    }

    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("{kind} request failed with status {status}"));

    match status.as_u16() {
        401 | 403 => Err(ProviderError::InvalidCredentials),
        404 => Err(ProviderError::NotFound),
        429 => Err(ProviderError::RateLimited),
        _ => Err(ProviderError::ApiError(message)),
    }
}
