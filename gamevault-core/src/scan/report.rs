use std::path::PathBuf;

use crate::types::GameId;

/// How a directory's manifest was reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestAction {
    /// Missing, stale, or unrecorded; a full manifest was generated.
    Regenerated,
    /// The persisted manifest matched the catalog's recorded hash.
    Reused,
    Failed(String),
}

/// Outcome of one directory's scan pass. Each step is reported independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryScanReport {
    pub path: PathBuf,
    pub entity_id: Option<GameId>,
    pub created: bool,
    pub manifest: Option<ManifestAction>,
    pub enrichment_submitted: bool,
    /// Set when the directory could not be resolved to an entity.
    pub error: Option<String>,
}

impl DirectoryScanReport {
    pub(crate) fn failed(path: PathBuf, error: impl ToString) -> Self {
        Self {
            path,
            entity_id: None,
            created: false,
            manifest: None,
            enrichment_submitted: false,
            error: Some(error.to_string()),
        }
    }

    /// Entity resolved and manifest reconciled.
    pub fn is_tracked(&self) -> bool {
        self.entity_id.is_some()
            && matches!(
                self.manifest,
                Some(ManifestAction::Regenerated | ManifestAction::Reused)
            )
    }
}

/// Aggregate of a multi-root scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub directories: Vec<DirectoryScanReport>,
}

impl ScanReport {
    pub fn created(&self) -> usize {
        self.directories.iter().filter(|d| d.created).count()
    }

    pub fn regenerated(&self) -> usize {
        self.count_manifest(|action| matches!(action, ManifestAction::Regenerated))
    }

    pub fn reused(&self) -> usize {
        self.count_manifest(|action| matches!(action, ManifestAction::Reused))
    }

    pub fn enrichment_submitted(&self) -> usize {
        self.directories
            .iter()
            .filter(|d| d.enrichment_submitted)
            .count()
    }

    pub fn failures(&self) -> usize {
        self.directories
            .iter()
            .filter(|d| {
                d.error.is_some() || matches!(d.manifest, Some(ManifestAction::Failed(_)))
            })
            .count()
    }

    fn count_manifest(&self, predicate: impl Fn(&ManifestAction) -> bool) -> usize {
        self.directories
            .iter()
            .filter(|d| d.manifest.as_ref().is_some_and(&predicate))
            .count()
    }
}
