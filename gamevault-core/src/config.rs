use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ProviderKind;

/// Name of the manifest persisted at the top of every content directory.
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "manifest.json";

/// Global knobs for the catalog core.
///
/// All fields carry defaults so a deployment only has to supply the roots it
/// wants watched.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VaultConfig {
    /// Directories whose immediate children are content directories.
    pub roots: Vec<PathBuf>,
    /// Directory reconciliation concurrency.
    pub scan: ScanConfig,
    /// Manifest generation tuning.
    pub manifest: ManifestConfig,
    /// Filesystem watch debounce settings.
    pub watch: WatchConfig,
    /// Enrichment worker pool sizing and merge policy.
    pub enrichment: EnrichmentConfig,
    /// Per-provider settings and credentials.
    pub providers: ProvidersConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of content directories reconciled at once.
    pub max_concurrent_scans: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// File name of the persisted manifest inside each content directory.
    pub file_name: String,
    /// Maximum number of concurrent file hash operations per manifest build.
    pub max_concurrent_hashes: usize,
    /// Housekeeping patterns; any path component containing one is skipped.
    pub exclude_patterns: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_MANIFEST_FILE_NAME.to_string(),
            max_concurrent_hashes: 10,
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

pub fn default_exclude_patterns() -> Vec<String> {
    [".git", "__pycache__", ".DS_Store", "Thumbs.db", ".tmp"]
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}

/// Tuning controls for filesystem watch coalescing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period (seconds) a directory must observe before its batch flushes.
    pub debounce_secs: u64,
    /// Capacity of the channel bridging the OS watcher thread to the async loop.
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 30,
            channel_capacity: 4096,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Number of concurrent enrichment workers.
    pub workers: usize,
    /// How long shutdown waits for in-flight enrichments.
    pub shutdown_grace_secs: u64,
    /// Provider whose present fields win when sources disagree.
    pub authoritative: ProviderKind,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            shutdown_grace_secs: 30,
            authoritative: ProviderKind::Igdb,
        }
    }
}

impl EnrichmentConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub steam: SteamConfig,
    pub igdb: IgdbConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamConfig {
    pub enabled: bool,
    /// Storefront language used for descriptions.
    pub language: String,
    /// Storefront country code used for search.
    pub country_code: String,
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "english".to_string(),
            country_code: "US".to_string(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgdbConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl IgdbConfig {
    /// IGDB is only usable with a full set of Twitch client credentials.
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

impl std::fmt::Debug for IgdbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgdbConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
