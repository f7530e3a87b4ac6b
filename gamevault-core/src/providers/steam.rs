use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::SteamConfig;
use crate::types::{GameMetadata, ProviderKind};

use super::{MetadataProvider, ProviderError, decode_json};

const STORE_SEARCH_URL: &str = "https://store.steampowered.com/api/storesearch/";
const APP_DETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";
const STEAM_CDN_BASE: &str = "https://cdn.akamai.steamstatic.com/steam/apps";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct StoreSearchResponse {
    #[serde(default)]
    items: Vec<StoreSearchItem>,
}

#[derive(Debug, Deserialize)]
struct StoreSearchItem {
    id: u64,
    name: String,
    #[serde(rename = "type", default)]
    item_type: String,
}

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<AppDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppDetails {
    name: Option<String>,
    short_description: Option<String>,
    developers: Vec<String>,
    publishers: Vec<String>,
    release_date: Option<ReleaseDate>,
    header_image: Option<String>,
    screenshots: Vec<Screenshot>,
    platforms: Option<Platforms>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReleaseDate {
    coming_soon: bool,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Screenshot {
    path_full: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Platforms {
    windows: bool,
    mac: bool,
    linux: bool,
}

/// Steam storefront client. The storefront endpoints need no API key.
pub struct SteamProvider {
    http: reqwest::Client,
    language: String,
    country_code: String,
}

impl fmt::Debug for SteamProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamProvider")
            .field("language", &self.language)
            .field("country_code", &self.country_code)
            .finish()
    }
}

impl SteamProvider {
    pub fn new(config: &SteamConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            language: config.language.clone(),
            country_code: config.country_code.clone(),
        }
    }
}

#[async_trait]
impl MetadataProvider for SteamProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Steam
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let response = self
            .http
            .get(STORE_SEARCH_URL)
            .query(&[
                ("term", name),
                ("l", self.language.as_str()),
                ("cc", self.country_code.as_str()),
            ])
            .send()
            .await?;
        let results: StoreSearchResponse = decode_json(ProviderKind::Steam, response).await?;
        let found = best_match(&results.items, name);
        debug!(query = name, app_id = ?found, "steam search");
        Ok(found)
    }

    async fn fetch_details(&self, provider_id: &str) -> Result<GameMetadata, ProviderError> {
        let response = self
            .http
            .get(APP_DETAILS_URL)
            .query(&[("appids", provider_id), ("l", self.language.as_str())])
            .send()
            .await?;
        let mut envelopes: HashMap<String, AppDetailsEnvelope> =
            decode_json(ProviderKind::Steam, response).await?;

        match envelopes.remove(provider_id) {
            Some(AppDetailsEnvelope {
                success: true,
                data: Some(details),
            }) => Ok(metadata_from_details(provider_id, details)),
            _ => Err(ProviderError::NotFound),
        }
    }
}

/// Prefer an app whose name matches exactly (ignoring case), else the first app.
fn best_match(items: &[StoreSearchItem], name: &str) -> Option<String> {
    let apps: Vec<&StoreSearchItem> = items
        .iter()
        .filter(|item| item.item_type.is_empty() || item.item_type == "app")
        .collect();
    apps.iter()
        .find(|item| item.name.trim().eq_ignore_ascii_case(name.trim()))
        .or_else(|| apps.first())
        .map(|item| item.id.to_string())
}

fn metadata_from_details(app_id: &str, details: AppDetails) -> GameMetadata {
    let release_date = details
        .release_date
        .filter(|release| !release.coming_soon)
        .and_then(|release| release.date);

    let platforms = details.platforms.map(|flags| {
        let mut names = Vec::new();
        if flags.windows {
            names.push("Windows".to_string());
        }
        if flags.mac {
            names.push("macOS".to_string());
        }
        if flags.linux {
            names.push("Linux".to_string());
        }
        names
    });

    GameMetadata {
        title: details.name,
        description: details.short_description,
        developer: details.developers.into_iter().next(),
        publisher: details.publishers.into_iter().next(),
        release_date,
        cover_image: Some(format!("{STEAM_CDN_BASE}/{app_id}/library_600x900.jpg")),
        banner_image: details.header_image,
        screenshots: Some(
            details
                .screenshots
                .into_iter()
                .map(|shot| shot.path_full)
                .collect(),
        ),
        platforms,
    }
}
