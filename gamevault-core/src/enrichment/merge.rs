use crate::types::{GameMetadata, ProviderKind};

/// Field-wise precedence rule for combining provider records.
///
/// The authoritative provider's present fields always win. Any field it leaves
/// empty falls back to the other providers, in the order their results were
/// supplied. Fields absent everywhere stay absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    authoritative: ProviderKind,
}

impl MergePolicy {
    pub fn new(authoritative: ProviderKind) -> Self {
        Self { authoritative }
    }

    pub fn authoritative(&self) -> ProviderKind {
        self.authoritative
    }

    pub fn merge(&self, results: &[(ProviderKind, GameMetadata)]) -> GameMetadata {
        let is_authoritative = |kind: &ProviderKind| *kind == self.authoritative;
        let mut merged = GameMetadata::default();
        // Later overlays win, so the authoritative source goes last.
        for (_, metadata) in results.iter().filter(|(kind, _)| !is_authoritative(kind)) {
            merged.overlay(metadata);
        }
        for (_, metadata) in results.iter().filter(|(kind, _)| is_authoritative(kind)) {
            merged.overlay(metadata);
        }
        merged
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(ProviderKind::Igdb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steam() -> GameMetadata {
        GameMetadata {
            title: Some("Hades".into()),
            description: Some("Steam blurb".into()),
            developer: Some("Supergiant Games".into()),
            cover_image: Some("steam-cover.jpg".into()),
            ..GameMetadata::default()
        }
    }

    fn igdb() -> GameMetadata {
        GameMetadata {
            title: Some("Hades".into()),
            description: Some("IGDB summary".into()),
            developer: Some(String::new()),
            release_date: Some("2020-09-17".into()),
            ..GameMetadata::default()
        }
    }

    #[test]
    fn authoritative_fields_win_and_gaps_fall_back() {
        let merged = MergePolicy::new(ProviderKind::Igdb).merge(&[
            (ProviderKind::Igdb, igdb()),
            (ProviderKind::Steam, steam()),
        ]);

        assert_eq!(merged.description.as_deref(), Some("IGDB summary"));
        assert_eq!(merged.developer.as_deref(), Some("Supergiant Games"));
        assert_eq!(merged.release_date.as_deref(), Some("2020-09-17"));
        assert_eq!(merged.cover_image.as_deref(), Some("steam-cover.jpg"));
        assert!(merged.publisher.is_none());
    }

    #[test]
    fn precedence_is_configurable() {
        let merged = MergePolicy::new(ProviderKind::Steam).merge(&[
            (ProviderKind::Steam, steam()),
            (ProviderKind::Igdb, igdb()),
        ]);
        assert_eq!(merged.description.as_deref(), Some("Steam blurb"));
        assert_eq!(merged.release_date.as_deref(), Some("2020-09-17"));
    }

    #[test]
    fn single_source_passes_through() {
        let merged = MergePolicy::default().merge(&[(ProviderKind::Steam, steam())]);
        assert_eq!(merged, steam());
    }
}
