use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Pending filesystem changes for one content directory.
///
/// The three sets are kept disjoint: the latest observation for a path wins,
/// so a path is only ever in one of `added`, `modified`, or `removed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    added: BTreeSet<PathBuf>,
    modified: BTreeSet<PathBuf>,
    removed: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&mut self, path: PathBuf) {
        self.removed.remove(&path);
        self.modified.remove(&path);
        self.added.insert(path);
    }

    pub fn record_modified(&mut self, path: PathBuf) {
        if self.added.contains(&path) {
            return;
        }
        self.removed.remove(&path);
        self.modified.insert(path);
    }

    pub fn record_removed(&mut self, path: PathBuf) {
        self.added.remove(&path);
        self.modified.remove(&path);
        self.removed.insert(path);
    }

    pub fn added(&self) -> &BTreeSet<PathBuf> {
        &self.added
    }

    pub fn modified(&self) -> &BTreeSet<PathBuf> {
        &self.modified
    }

    pub fn removed(&self) -> &BTreeSet<PathBuf> {
        &self.removed
    }

    /// Paths whose current contents must be fingerprinted.
    pub fn upserts(&self) -> impl Iterator<Item = &Path> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}
