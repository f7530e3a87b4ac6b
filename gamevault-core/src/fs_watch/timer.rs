use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cancel-and-reschedule timer owned by one directory's watch state.
///
/// Every `arm` bumps a generation counter; the fire message carries the
/// generation it was armed with, so a message from a superseded arming that
/// raced its own cancellation is recognised as stale and ignored.
pub struct DebounceTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("generation", &self.generation)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self {
            generation: 0,
            handle: None,
        }
    }

    /// (Re)start the countdown. Once `delay` passes without another `arm` or
    /// `cancel`, `fire(generation)` is sent on `tx`.
    pub fn arm<M, F>(&mut self, delay: Duration, tx: mpsc::Sender<M>, fire: F) -> u64
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fire(generation)).await;
        }));
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Accept a fire message. Returns `false` for stale generations.
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
