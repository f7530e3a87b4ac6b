use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::GameId;

/// External metadata sources an entity can be linked to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Steam,
    Igdb,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Steam => "steam",
            ProviderKind::Igdb => "igdb",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive fields fetched from external providers. Every field is optional;
/// `None` means "unknown" and never erases a value already on record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub release_date: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub screenshots: Option<Vec<String>>,
    pub platforms: Option<Vec<String>>,
}

fn present_text(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|text| !text.trim().is_empty())
}

fn present_list(value: &Option<Vec<String>>) -> Option<&Vec<String>> {
    value.as_ref().filter(|items| !items.is_empty())
}

impl GameMetadata {
    /// True when no field carries a usable value.
    pub fn is_empty(&self) -> bool {
        present_text(&self.title).is_none()
            && present_text(&self.description).is_none()
            && present_text(&self.developer).is_none()
            && present_text(&self.publisher).is_none()
            && present_text(&self.release_date).is_none()
            && present_text(&self.cover_image).is_none()
            && present_text(&self.banner_image).is_none()
            && present_list(&self.screenshots).is_none()
            && present_list(&self.platforms).is_none()
    }

    /// Copy every present (non-empty) field of `other` over `self`.
    ///
    /// Fields absent or blank in `other` leave `self` untouched, so overlaying
    /// sources from lowest to highest precedence yields the precedence merge.
    pub fn overlay(&mut self, other: &GameMetadata) {
        fn text(target: &mut Option<String>, source: &Option<String>) {
            if let Some(value) = present_text(source) {
                *target = Some(value.trim().to_string());
            }
        }
        fn list(target: &mut Option<Vec<String>>, source: &Option<Vec<String>>) {
            if let Some(values) = present_list(source) {
                *target = Some(values.clone());
            }
        }

        text(&mut self.title, &other.title);
        text(&mut self.description, &other.description);
        text(&mut self.developer, &other.developer);
        text(&mut self.publisher, &other.publisher);
        text(&mut self.release_date, &other.release_date);
        text(&mut self.cover_image, &other.cover_image);
        text(&mut self.banner_image, &other.banner_image);
        list(&mut self.screenshots, &other.screenshots);
        list(&mut self.platforms, &other.platforms);
    }
}

/// Catalog record for one content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntity {
    pub id: GameId,
    pub name: String,
    pub slug: String,
    pub path: PathBuf,
    pub manifest_hash: Option<String>,
    pub total_size: u64,
    #[serde(default)]
    pub metadata: GameMetadata,
    #[serde(default)]
    pub provider_ids: BTreeMap<ProviderKind, String>,
    pub indexing_at: Option<DateTime<Utc>>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameEntity {
    pub fn new(request: NewGame) -> Self {
        let now = Utc::now();
        Self {
            id: GameId::new(),
            name: request.name,
            slug: request.slug,
            path: request.path,
            manifest_hash: None,
            total_size: 0,
            metadata: GameMetadata::default(),
            provider_ids: BTreeMap::new(),
            indexing_at: None,
            scraped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn provider_id(&self, kind: ProviderKind) -> Option<&str> {
        self.provider_ids.get(&kind).map(String::as_str)
    }

    /// Apply a partial update. Only the fields carried by `update` change.
    pub fn apply(&mut self, update: &GameUpdate) {
        if let Some(hash) = &update.manifest_hash {
            self.manifest_hash = Some(hash.clone());
        }
        if let Some(size) = update.total_size {
            self.total_size = size;
        }
        if let Some(at) = update.indexing_at {
            self.indexing_at = Some(at);
        }
        if let Some(at) = update.scraped_at {
            self.scraped_at = Some(at);
        }
        if let Some(metadata) = &update.metadata {
            self.metadata.overlay(metadata);
        }
        for (kind, id) in &update.provider_ids {
            self.provider_ids.insert(*kind, id.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Creation request handed to the catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub slug: String,
    pub name: String,
    pub path: PathBuf,
}

/// Field-level patch for an existing entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameUpdate {
    pub manifest_hash: Option<String>,
    pub total_size: Option<u64>,
    pub indexing_at: Option<DateTime<Utc>>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub metadata: Option<GameMetadata>,
    pub provider_ids: BTreeMap<ProviderKind, String>,
}

impl GameUpdate {
    pub fn manifest(hash: String, total_size: u64) -> Self {
        Self {
            manifest_hash: Some(hash),
            total_size: Some(total_size),
            indexing_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.manifest_hash.is_none()
            && self.total_size.is_none()
            && self.indexing_at.is_none()
            && self.scraped_at.is_none()
            && self.metadata.is_none()
            && self.provider_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_known_values_when_source_is_blank() {
        let mut known = GameMetadata {
            developer: Some("Studio".into()),
            description: Some("Old".into()),
            ..GameMetadata::default()
        };
        known.overlay(&GameMetadata {
            developer: Some("  ".into()),
            description: Some("New".into()),
            platforms: Some(vec![]),
            ..GameMetadata::default()
        });

        assert_eq!(known.developer.as_deref(), Some("Studio"));
        assert_eq!(known.description.as_deref(), Some("New"));
        assert!(known.platforms.is_none());
    }

    #[test]
    fn apply_only_touches_carried_fields() {
        let mut entity = GameEntity::new(NewGame {
            slug: "portal".into(),
            name: "Portal".into(),
            path: PathBuf::from("/games/Portal"),
        });
        entity.total_size = 42;

        let update = GameUpdate {
            provider_ids: [(ProviderKind::Steam, "400".to_string())].into(),
            ..GameUpdate::default()
        };
        entity.apply(&update);

        assert_eq!(entity.total_size, 42);
        assert_eq!(entity.provider_id(ProviderKind::Steam), Some("400"));
        assert!(entity.manifest_hash.is_none());
    }
}
