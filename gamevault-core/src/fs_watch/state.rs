use std::mem;

use tokio::time::Instant;

use crate::manifest::ChangeBatch;
use crate::types::GameId;

use super::event::WatchEvent;
use super::timer::DebounceTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    /// Nothing pending.
    Idle,
    /// Changes pending; waiting for the debounce window to go quiet.
    AwaitingUpdate,
    /// A batch is being applied. New events accumulate in a fresh batch.
    Updating,
}

/// Watch bookkeeping for one tracked content directory.
#[derive(Debug)]
pub struct DirectoryWatchState {
    entity_id: GameId,
    status: WatchStatus,
    pending: ChangeBatch,
    last_activity: Option<Instant>,
    timer: DebounceTimer,
}

impl DirectoryWatchState {
    pub fn new(entity_id: GameId) -> Self {
        Self {
            entity_id,
            status: WatchStatus::Idle,
            pending: ChangeBatch::new(),
            last_activity: None,
            timer: DebounceTimer::new(),
        }
    }

    /// Start tracking with changes observed before tracking began.
    pub fn with_pending(entity_id: GameId, pending: ChangeBatch) -> Self {
        let mut state = Self::new(entity_id);
        if !pending.is_empty() {
            state.pending = pending;
            state.status = WatchStatus::AwaitingUpdate;
            state.last_activity = Some(Instant::now());
        }
        state
    }

    pub fn entity_id(&self) -> GameId {
        self.entity_id
    }

    pub fn status(&self) -> WatchStatus {
        self.status
    }

    pub fn pending(&self) -> &ChangeBatch {
        &self.pending
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    pub fn timer_mut(&mut self) -> &mut DebounceTimer {
        &mut self.timer
    }

    pub fn record(&mut self, event: WatchEvent) {
        record_into(&mut self.pending, event);
        self.last_activity = Some(Instant::now());
        if self.status == WatchStatus::Idle {
            self.status = WatchStatus::AwaitingUpdate;
        }
    }

    /// Take the pending batch for a flush; later events start a new batch.
    pub fn begin_update(&mut self) -> ChangeBatch {
        self.status = WatchStatus::Updating;
        mem::take(&mut self.pending)
    }

    pub fn finish_update(&mut self) {
        self.status = if self.pending.is_empty() {
            WatchStatus::Idle
        } else {
            WatchStatus::AwaitingUpdate
        };
    }
}

pub(crate) fn record_into(batch: &mut ChangeBatch, event: WatchEvent) {
    match event {
        WatchEvent::Created(path) => batch.record_added(path),
        WatchEvent::Modified(path) => batch.record_modified(path),
        WatchEvent::Deleted(path) => batch.record_removed(path),
    }
}
