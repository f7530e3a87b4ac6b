use std::path::{Component, Path, PathBuf};

use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};

/// A classified filesystem change. Moves arrive as a `Deleted`/`Created` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Deleted(path) => {
                path
            }
        }
    }
}

/// Translate one raw notification into zero or more [`WatchEvent`]s.
pub fn classify(event: &Event) -> Vec<WatchEvent> {
    let mut paths = event.paths.iter().cloned();
    match event.kind {
        EventKind::Create(_) => paths.map(WatchEvent::Created).collect(),
        EventKind::Remove(_) => paths.map(WatchEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(WatchEvent::Deleted(from));
            }
            if let Some(to) = paths.next() {
                events.push(WatchEvent::Created(to));
            }
            events
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(WatchEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(WatchEvent::Created).collect()
        }
        // Side unknown: a modification is re-examined on flush, which treats a
        // vanished path as removed and an appeared directory as added.
        EventKind::Modify(_) => paths.map(WatchEvent::Modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Normalise `path` lexically and confirm it stays under `root`.
pub(crate) fn sanitize_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => clean.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(root.join(clean))
}
