use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::types::{GameEntity, GameId};

/// Enrichment priority tiers. Lower discriminant dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskPriority {
    High = 0,
    Normal = 1,
}

/// One pending enrichment, carrying the entity as it looked at submission.
#[derive(Debug, Clone)]
pub struct EnrichmentTask {
    pub entity_id: GameId,
    pub priority: TaskPriority,
    pub entity: GameEntity,
}

#[derive(Debug)]
struct QueuedTask {
    seq: u64,
    task: EnrichmentTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // BinaryHeap pops the greatest element: higher tier first, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .task
            .priority
            .cmp(&self.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    /// Entities queued or in flight.
    active: HashSet<GameId>,
    next_seq: u64,
}

/// Priority queue of enrichment tasks with at-most-one-active-per-entity admission.
#[derive(Default)]
pub struct EnrichmentQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl fmt::Debug for EnrichmentQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (queued, active) = self
            .state
            .try_lock()
            .map(|state| (state.heap.len(), state.active.len()))
            .unwrap_or_default();
        f.debug_struct("EnrichmentQueue")
            .field("queued", &queued)
            .field("active", &active)
            .finish()
    }
}

impl EnrichmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `entity` for enrichment.
    ///
    /// Returns `false` without queuing when the entity is already queued or
    /// being processed.
    pub async fn submit(&self, entity: GameEntity, priority: TaskPriority) -> bool {
        let mut state = self.state.lock().await;
        if !state.active.insert(entity.id) {
            tracing::debug!(entity = %entity.id, "enrichment already active; submission rejected");
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedTask {
            seq,
            task: EnrichmentTask {
                entity_id: entity.id,
                priority,
                entity,
            },
        });
        drop(state);

        self.ready.notify_one();
        true
    }

    /// Wait for the next task. The entity stays active until [`complete`](Self::complete).
    pub async fn next(&self) -> EnrichmentTask {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(queued) = state.heap.pop() {
                    if !state.heap.is_empty() {
                        self.ready.notify_one();
                    }
                    return queued.task;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Release an entity once its enrichment has finished, successfully or not.
    pub async fn complete(&self, entity_id: GameId) {
        self.state.lock().await.active.remove(&entity_id);
    }

    pub async fn queued_len(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    pub async fn active_len(&self) -> usize {
        self.state.lock().await.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewGame;
    use std::path::PathBuf;

    fn entity(slug: &str) -> GameEntity {
        GameEntity::new(NewGame {
            slug: slug.into(),
            name: slug.into(),
            path: PathBuf::from("/games").join(slug),
        })
    }

    #[tokio::test]
    async fn high_priority_dequeues_first() {
        let queue = EnrichmentQueue::new();
        let normal = entity("normal");
        let high = entity("high");
        assert!(queue.submit(normal.clone(), TaskPriority::Normal).await);
        assert!(queue.submit(high.clone(), TaskPriority::High).await);

        assert_eq!(queue.next().await.entity_id, high.id);
        assert_eq!(queue.next().await.entity_id, normal.id);
    }

    #[tokio::test]
    async fn fifo_within_a_tier() {
        let queue = EnrichmentQueue::new();
        let first = entity("first");
        let second = entity("second");
        let third = entity("third");
        for e in [&first, &second, &third] {
            queue.submit(e.clone(), TaskPriority::Normal).await;
        }

        assert_eq!(queue.next().await.entity_id, first.id);
        assert_eq!(queue.next().await.entity_id, second.id);
        assert_eq!(queue.next().await.entity_id, third.id);
    }

    #[tokio::test]
    async fn duplicate_rejected_until_completed() {
        let queue = EnrichmentQueue::new();
        let game = entity("celeste");

        assert!(queue.submit(game.clone(), TaskPriority::Normal).await);
        assert!(!queue.submit(game.clone(), TaskPriority::High).await);

        let task = queue.next().await;
        // In flight: still rejected.
        assert!(!queue.submit(game.clone(), TaskPriority::Normal).await);

        queue.complete(task.entity_id).await;
        assert!(queue.submit(game, TaskPriority::Normal).await);
        assert_eq!(queue.queued_len().await, 1);
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_submit() {
        let queue = std::sync::Arc::new(EnrichmentQueue::new());
        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.entity_id })
        };
        tokio::task::yield_now().await;

        let game = entity("tunic");
        queue.submit(game.clone(), TaskPriority::Normal).await;
        assert_eq!(consumer.await.unwrap(), game.id);
    }
}
