//! Application Layer - The polling and fan-out engine
//!
//! Pagination, idempotent upserts, jobs, bounded dependent-task fan-out
//! and the scheduler that drives them, plus the wiring from configuration.

pub mod fanout;
pub mod job;
pub mod pagination;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod upsert;

pub use fanout::{FanOut, FanOutError, FanOutSummary};
pub use job::{
    CycleReport, EntityStep, FetchPlan, JobDescriptor, JobError, ListingJob, PollJob, SourceStep,
    TrackedEntityJob,
};
pub use pagination::{FetchOutcome, PageCursor, PaginatedFetcher};
pub use runtime::{build_scheduler, open_store, RuntimeError};
pub use scheduler::{FirstCycle, Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle};
pub use stats::{FanOutSnapshot, JobStatsSnapshot, StatsSnapshot};
pub use upsert::{BatchReport, UpsertOutcome, UpsertStore};
