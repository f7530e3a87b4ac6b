//! Live filesystem watching.
//!
//! `notify` delivers raw notifications on its own thread; the callback only
//! forwards them into a bounded channel. A single consumer loop on the async
//! runtime classifies them, maps each to its content directory, and owns every
//! [`DirectoryWatchState`]. Because that loop is the only writer, taking a batch
//! for flushing and starting a fresh one for later events cannot interleave.
//!
//! Per tracked directory, every qualifying event re-arms a [`DebounceTimer`].
//! When the timer fires undisturbed, the accumulated [`ChangeBatch`] is handed
//! to the [`DirectoryReconciler`]. Directories that are not tracked yet are
//! bootstrapped through the reconciler instead of being batched.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::{CatalogError, Result};
use crate::manifest::{ChangeBatch, ManifestBuilder, ManifestUpdate};
use crate::scan::DirectoryReconciler;
use crate::types::GameId;

pub mod event;
pub mod state;
pub mod timer;

pub use event::{WatchEvent, classify};
pub use state::{DirectoryWatchState, WatchStatus};
pub use timer::DebounceTimer;

use event::sanitize_path;
use state::record_into;

/// How long shutdown waits for the consumer loop to wind down.
const LOOP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum WatchMessage {
    Event(Event),
    Error(String),
    Track { dir: PathBuf, entity_id: GameId },
    TimerFired { dir: PathBuf, generation: u64 },
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
            WatchMessage::Track { dir, entity_id } => f
                .debug_struct("WatchMessage::Track")
                .field("dir", dir)
                .field("entity_id", entity_id)
                .finish(),
            WatchMessage::TimerFired { dir, generation } => f
                .debug_struct("WatchMessage::TimerFired")
                .field("dir", dir)
                .field("generation", generation)
                .finish(),
        }
    }
}

/// Watches content roots and keeps tracked directories' manifests current.
pub struct FsWatchService {
    roots: Vec<PathBuf>,
    tx: mpsc::Sender<WatchMessage>,
    watchers: Mutex<Vec<RecommendedWatcher>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
}

impl fmt::Debug for FsWatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let watcher_count = self
            .watchers
            .try_lock()
            .map(|watchers| watchers.len())
            .unwrap_or_default();
        f.debug_struct("FsWatchService")
            .field("roots", &self.roots)
            .field("watcher_count", &watcher_count)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl FsWatchService {
    /// Start the consumer loop and attach OS watchers to every root.
    ///
    /// A root that cannot be watched is logged and skipped.
    pub async fn start(
        config: &WatchConfig,
        roots: &[PathBuf],
        builder: ManifestBuilder,
        reconciler: Arc<dyn DirectoryReconciler>,
    ) -> Result<Self> {
        let service = Self::spawn(config, roots, builder, reconciler);

        let watcher_roots = service.roots.clone();
        let watcher_tx = service.tx.clone();
        let watchers = spawn_blocking(move || init_watchers(&watcher_roots, watcher_tx))
            .await
            .map_err(|err| {
                CatalogError::Internal(format!("watcher initialization panicked: {err}"))
            })?;

        info!(
            roots = service.roots.len(),
            watching = watchers.len(),
            debounce_secs = config.debounce().as_secs(),
            "filesystem watcher started"
        );
        *service.watchers.lock().await = watchers;
        Ok(service)
    }

    /// Start only the consumer loop; events must be fed through `tx`.
    fn spawn(
        config: &WatchConfig,
        roots: &[PathBuf],
        builder: ManifestBuilder,
        reconciler: Arc<dyn DirectoryReconciler>,
    ) -> Self {
        let roots: Vec<PathBuf> = roots.iter().map(|root| absolutize(root)).collect();
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(64));
        let shutdown_token = CancellationToken::new();

        let watch_loop = WatchLoop {
            roots: roots.clone(),
            builder,
            reconciler,
            debounce: config.debounce(),
            tx: tx.clone(),
            directories: HashMap::new(),
            tasks: JoinSet::new(),
        };
        let handle = tokio::spawn(watch_loop.run(rx, shutdown_token.clone()));

        Self {
            roots,
            tx,
            watchers: Mutex::new(Vec::new()),
            loop_handle: Mutex::new(Some(handle)),
            shutdown_token,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Begin incremental tracking of a directory reconciled elsewhere.
    ///
    /// Returns `false` once the service has shut down.
    pub async fn track(&self, dir: PathBuf, entity_id: GameId) -> bool {
        self.tx
            .send(WatchMessage::Track {
                dir: absolutize(&dir),
                entity_id,
            })
            .await
            .is_ok()
    }

    /// Tear down OS subscriptions, then stop the loop and drop pending batches.
    pub async fn shutdown(&self) {
        let watchers = std::mem::take(&mut *self.watchers.lock().await);
        let watcher_count = watchers.len();
        drop(watchers);
        debug!(watcher_count, "filesystem subscriptions released");

        self.shutdown_token.cancel();
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(LOOP_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("watch loop failed: {err:?}"),
                Err(_) => warn!("watch loop timed out during shutdown"),
            }
        }
        info!("filesystem watcher stopped");
    }
}

enum DirectoryEntry {
    /// Reconciliation in flight; events are buffered until it finishes.
    Bootstrapping(ChangeBatch),
    Tracked(DirectoryWatchState),
}

enum TaskOutcome {
    Bootstrapped {
        dir: PathBuf,
        result: Result<GameId>,
    },
    Flushed {
        dir: PathBuf,
        result: Result<ManifestUpdate>,
    },
}

/// Where an event landed: its content directory and the path relative to it.
struct Located {
    dir: PathBuf,
    path: PathBuf,
    relative: PathBuf,
}

struct WatchLoop {
    roots: Vec<PathBuf>,
    builder: ManifestBuilder,
    reconciler: Arc<dyn DirectoryReconciler>,
    debounce: Duration,
    tx: mpsc::Sender<WatchMessage>,
    directories: HashMap<PathBuf, DirectoryEntry>,
    tasks: JoinSet<TaskOutcome>,
}

impl WatchLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<WatchMessage>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(outcome) => self.handle_outcome(outcome),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => warn!("watch task failed: {err}"),
                },
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
            }
        }
        self.teardown();
    }

    fn handle_message(&mut self, message: WatchMessage) {
        match message {
            WatchMessage::Event(event) => {
                for change in classify(&event) {
                    self.handle_event(change);
                }
            }
            WatchMessage::Error(error) => warn!("filesystem watcher error: {error}"),
            WatchMessage::Track { dir, entity_id } => self.track(dir, entity_id),
            WatchMessage::TimerFired { dir, generation } => self.on_timer(dir, generation),
        }
    }

    fn handle_event(&mut self, change: WatchEvent) {
        let Some(located) = self.locate(change.path()) else {
            return;
        };
        let change = match change {
            WatchEvent::Created(_) => WatchEvent::Created(located.path),
            WatchEvent::Modified(_) => WatchEvent::Modified(located.path),
            WatchEvent::Deleted(_) => WatchEvent::Deleted(located.path),
        };
        let dir = located.dir;

        // The content directory itself.
        if located.relative.as_os_str().is_empty() {
            match change {
                WatchEvent::Deleted(_) => self.evict(&dir, "content directory removed"),
                _ if !self.directories.contains_key(&dir) => self.start_bootstrap(dir, None),
                _ => {}
            }
            return;
        }

        if located.relative == Path::new(self.builder.file_name()) {
            match change {
                WatchEvent::Created(_) if !self.directories.contains_key(&dir) => {
                    self.start_bootstrap(dir, None);
                }
                WatchEvent::Deleted(_)
                    if matches!(self.directories.get(&dir), Some(DirectoryEntry::Tracked(_))) =>
                {
                    self.evict(&dir, "manifest removed");
                }
                // Rewrites are our own output, not input.
                _ => {}
            }
            return;
        }

        if self.builder.is_excluded(&located.relative) {
            return;
        }

        match self.directories.get_mut(&dir) {
            Some(DirectoryEntry::Tracked(state)) => {
                state.record(change);
                arm_timer(state, self.debounce, &self.tx, &dir);
            }
            Some(DirectoryEntry::Bootstrapping(buffer)) => record_into(buffer, change),
            None => self.start_bootstrap(dir, Some(change)),
        }
    }

    fn locate(&self, path: &Path) -> Option<Located> {
        for root in &self.roots {
            let Some(clean) = sanitize_path(root, path) else {
                continue;
            };
            let relative = clean.strip_prefix(root).ok()?;
            let mut components = relative.components();
            let top = components.next()?;
            let dir = root.join(top);
            let relative = components.as_path().to_path_buf();
            return Some(Located {
                dir,
                path: clean,
                relative,
            });
        }
        None
    }

    fn track(&mut self, dir: PathBuf, entity_id: GameId) {
        let state = match self.directories.remove(&dir) {
            Some(DirectoryEntry::Bootstrapping(buffer)) => {
                DirectoryWatchState::with_pending(entity_id, buffer)
            }
            Some(DirectoryEntry::Tracked(state)) if state.entity_id() == entity_id => state,
            _ => DirectoryWatchState::new(entity_id),
        };
        self.insert_tracked(dir, state);
    }

    fn insert_tracked(&mut self, dir: PathBuf, mut state: DirectoryWatchState) {
        if state.status() == WatchStatus::AwaitingUpdate && !state.timer_mut().is_armed() {
            arm_timer(&mut state, self.debounce, &self.tx, &dir);
        }
        debug!(dir = %dir.display(), entity = %state.entity_id(), "directory tracked");
        self.directories.insert(dir, DirectoryEntry::Tracked(state));
    }

    fn start_bootstrap(&mut self, dir: PathBuf, first: Option<WatchEvent>) {
        let mut buffer = ChangeBatch::new();
        if let Some(change) = first {
            record_into(&mut buffer, change);
        }
        self.directories
            .insert(dir.clone(), DirectoryEntry::Bootstrapping(buffer));

        info!(dir = %dir.display(), "untracked directory changed; bootstrapping");
        let reconciler = Arc::clone(&self.reconciler);
        self.tasks.spawn(async move {
            let result = reconciler.bootstrap(&dir).await;
            TaskOutcome::Bootstrapped { dir, result }
        });
    }

    fn evict(&mut self, dir: &Path, reason: &str) {
        if let Some(entry) = self.directories.remove(dir) {
            let dropped = match &entry {
                DirectoryEntry::Tracked(state) => state.pending().len(),
                DirectoryEntry::Bootstrapping(buffer) => buffer.len(),
            };
            info!(dir = %dir.display(), reason, dropped, "directory no longer tracked");
        }
    }

    fn on_timer(&mut self, dir: PathBuf, generation: u64) {
        let Some(DirectoryEntry::Tracked(state)) = self.directories.get_mut(&dir) else {
            return;
        };
        if !state.timer_mut().fired(generation) {
            return;
        }

        match state.status() {
            // Re-armed when the running flush reports back.
            WatchStatus::Updating => {}
            _ if state.pending().is_empty() => state.finish_update(),
            _ => {
                let batch = state.begin_update();
                let entity_id = state.entity_id();
                debug!(
                    dir = %dir.display(),
                    entity = %entity_id,
                    added = batch.added().len(),
                    modified = batch.modified().len(),
                    removed = batch.removed().len(),
                    quiet_for = ?state.last_activity().map(|at| at.elapsed()),
                    "debounce window closed; flushing"
                );

                let reconciler = Arc::clone(&self.reconciler);
                self.tasks.spawn(async move {
                    let result = reconciler.apply_batch(&dir, entity_id, &batch).await;
                    TaskOutcome::Flushed { dir, result }
                });
            }
        }
    }

    fn handle_outcome(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Bootstrapped { dir, result } => self.on_bootstrapped(dir, result),
            TaskOutcome::Flushed { dir, result } => self.on_flushed(dir, result),
        }
    }

    fn on_bootstrapped(&mut self, dir: PathBuf, result: Result<GameId>) {
        let buffer = match self.directories.remove(&dir) {
            Some(DirectoryEntry::Bootstrapping(buffer)) => buffer,
            // Tracked explicitly meanwhile.
            Some(tracked) => {
                self.directories.insert(dir, tracked);
                return;
            }
            // Evicted while bootstrapping.
            None => return,
        };

        match result {
            Ok(entity_id) => {
                info!(
                    dir = %dir.display(),
                    entity = %entity_id,
                    buffered = buffer.len(),
                    "bootstrap complete"
                );
                self.insert_tracked(dir, DirectoryWatchState::with_pending(entity_id, buffer));
            }
            Err(CatalogError::InvalidDirectory(_)) => {
                debug!(dir = %dir.display(), "not a content directory; ignoring");
            }
            Err(err) => {
                warn!(dir = %dir.display(), "bootstrap failed; will retry on next change: {err}");
            }
        }
    }

    fn on_flushed(&mut self, dir: PathBuf, result: Result<ManifestUpdate>) {
        if matches!(result, Err(CatalogError::InvalidDirectory(_))) {
            self.evict(&dir, "content directory vanished");
            return;
        }
        let Some(DirectoryEntry::Tracked(state)) = self.directories.get_mut(&dir) else {
            return;
        };

        match result {
            Ok(ManifestUpdate::Unchanged) => {
                debug!(dir = %dir.display(), "batch produced no manifest change");
            }
            Ok(ManifestUpdate::Updated(manifest) | ManifestUpdate::Regenerated(manifest)) => {
                info!(
                    dir = %dir.display(),
                    entity = %state.entity_id(),
                    files = manifest.file_count,
                    total_size = manifest.total_size,
                    "manifest refreshed from watched changes"
                );
            }
            Err(err) => {
                warn!(dir = %dir.display(), "dropping change batch: {err}");
            }
        }

        state.finish_update();
        if state.status() == WatchStatus::AwaitingUpdate && !state.timer_mut().is_armed() {
            arm_timer(state, self.debounce, &self.tx, &dir);
        }
    }

    fn teardown(&mut self) {
        let dropped: usize = self
            .directories
            .values()
            .map(|entry| match entry {
                DirectoryEntry::Tracked(state) => state.pending().len(),
                DirectoryEntry::Bootstrapping(buffer) => buffer.len(),
            })
            .sum();
        // Dropping the states cancels their timers.
        self.directories.clear();
        self.tasks.abort_all();
        info!(dropped_changes = dropped, "watch loop stopped");
    }
}

fn arm_timer(
    state: &mut DirectoryWatchState,
    debounce: Duration,
    tx: &mpsc::Sender<WatchMessage>,
    dir: &Path,
) {
    let dir = dir.to_path_buf();
    state
        .timer_mut()
        .arm(debounce, tx.clone(), move |generation| WatchMessage::TimerFired {
            dir,
            generation,
        });
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn init_watchers(roots: &[PathBuf], tx: mpsc::Sender<WatchMessage>) -> Vec<RecommendedWatcher> {
    let mut watchers = Vec::with_capacity(roots.len());
    for root in roots {
        let root_label = root.clone();
        let tx_event = tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(err) = tx_event.blocking_send(WatchMessage::Event(event)) {
                        warn!(
                            "fs_watch channel send failed for {}: {}",
                            root_label.display(),
                            err
                        );
                    }
                }
                Err(err) => {
                    let _ = tx_event.blocking_send(WatchMessage::Error(err.to_string()));
                }
            },
            NotifyConfig::default(),
        );

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                warn!(root = %root.display(), "failed to create watcher: {err}");
                continue;
            }
        };
        if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
            warn!(root = %root.display(), "failed to watch root: {err}");
            continue;
        }
        watchers.push(watcher);
    }
    watchers
}
