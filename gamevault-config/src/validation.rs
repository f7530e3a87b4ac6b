use std::fmt;
use std::path::PathBuf;

use gamevault_core::config::VaultConfig;

/// A setting that loads but probably is not what the operator meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    NoRoots,
    MissingRoot(PathBuf),
    /// Exactly one of the two IGDB credentials is set.
    PartialIgdbCredentials,
    NoProviders,
    ZeroWorkers,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::NoRoots => {
                f.write_str("no content roots configured; nothing will be scanned")
            }
            ConfigWarning::MissingRoot(path) => write!(
                f,
                "content root {} does not exist or is not a directory",
                path.display()
            ),
            ConfigWarning::PartialIgdbCredentials => f.write_str(
                "IGDB needs both client_id and client_secret; the provider stays disabled",
            ),
            ConfigWarning::NoProviders => {
                f.write_str("no metadata providers enabled; entities will not be enriched")
            }
            ConfigWarning::ZeroWorkers => {
                f.write_str("enrichment.workers is 0; one worker will be started")
            }
        }
    }
}

pub fn validate(config: &VaultConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.roots.is_empty() {
        warnings.push(ConfigWarning::NoRoots);
    }
    for root in &config.roots {
        if !root.is_dir() {
            warnings.push(ConfigWarning::MissingRoot(root.clone()));
        }
    }

    let igdb = &config.providers.igdb;
    let id_set = !igdb.client_id.trim().is_empty();
    let secret_set = !igdb.client_secret.trim().is_empty();
    if id_set != secret_set {
        warnings.push(ConfigWarning::PartialIgdbCredentials);
    }
    if !config.providers.steam.enabled && !igdb.is_configured() {
        warnings.push(ConfigWarning::NoProviders);
    }

    if config.enrichment.workers == 0 {
        warnings.push(ConfigWarning::ZeroWorkers);
    }

    warnings
}
