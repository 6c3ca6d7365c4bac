//! Harvest pipeline.
//!
//! - `retry`: bounded attempts per unit
//! - `filter`: key matching, policy checks, catalog resolution, dedup
//! - `pool`: semaphore-bounded concurrent fetch units
//! - `merge`: reconciliation of fresh records against a corpus
//! - `harvest`: chunked orchestration with a checkpoint per chunk
//! - `jobs`: the entry points behind each command

pub mod filter;
pub mod harvest;
pub mod jobs;
pub mod merge;
pub mod pool;
pub mod retry;

pub use filter::{Filter, Filtered, RejectReason, Rejection};
pub use harvest::{ChunkSummary, HarvestSummary, Harvester};
pub use jobs::{Dataset, DatasetInfo, Jobs, MaintenanceReport};
pub use merge::MergeOutcome;
pub use pool::{UnitOutcome, UnitReport, WorkerPool};
pub use retry::{Attempt, RetryPolicy};
