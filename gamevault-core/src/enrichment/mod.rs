//! Background metadata enrichment.
//!
//! Tasks enter an [`EnrichmentQueue`] (High before Normal, FIFO within a tier,
//! one active task per entity). An [`EnrichmentPool`] of workers drains it, and
//! each task runs through an [`Enricher`]: resolve provider ids, fetch records,
//! merge them with a [`MergePolicy`], and write the result to the catalog.

pub mod merge;
pub mod pool;
pub mod queue;
pub mod worker;

pub use merge::MergePolicy;
pub use pool::EnrichmentPool;
pub use queue::{EnrichmentQueue, EnrichmentTask, TaskPriority};
pub use worker::{Enricher, EnrichmentOutcome};
