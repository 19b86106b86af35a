//! Jobs and per-entity steps
//!
//! A job is one named, periodically polled unit of work. Listing jobs page
//! through a provider list; tracked-entity jobs run one [`EntityStep`] for
//! every registered entity of a kind. Both end in the same
//! fetch → upsert → discover pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::pagination::PaginatedFetcher;
use super::upsert::{BatchReport, UpsertStore};
use crate::domain::{EntityId, EntityKind, EntityRef, EntityRegistry, Record};
use crate::ports::{FetchError, PageRequest, PageSource};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Fetch failed after {written} records were written: {source}")]
    Fetch { written: usize, source: FetchError },

    #[error("All {total} entities failed, last error: {last}")]
    AllEntitiesFailed {
        total: usize,
        written: usize,
        last: Box<JobError>,
    },
}

impl JobError {
    /// Records persisted before the failure
    pub fn written(&self) -> usize {
        match self {
            JobError::Fetch { written, .. } => *written,
            JobError::AllEntitiesFailed { written, .. } => *written,
        }
    }
}

/// What one poll (or one entity step) achieved
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub batch: BatchReport,
    pub pages: usize,
    /// Entities revealed by the written records, de-duplicated
    pub discovered: Vec<EntityRef>,
    /// Entities visited by a tracked-entity job
    pub entities: usize,
    pub entity_failures: usize,
}

impl CycleReport {
    pub fn records_written(&self) -> usize {
        self.batch.written
    }

    pub fn absorb(&mut self, other: CycleReport) {
        self.batch.merge(other.batch);
        self.pages += other.pages;
        self.entities += other.entities;
        self.entity_failures += other.entity_failures;
        for entity in other.discovered {
            if !self.discovered.contains(&entity) {
                self.discovered.push(entity);
            }
        }
    }
}

#[async_trait]
pub trait PollJob: Send + Sync {
    async fn poll(&self) -> Result<CycleReport, JobError>;
}

/// A registered job; immutable once handed to the scheduler
#[derive(Clone)]
pub struct JobDescriptor {
    pub name: String,
    pub interval: Duration,
    pub poll: Arc<dyn PollJob>,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>, interval: Duration, poll: Arc<dyn PollJob>) -> Self {
        Self {
            name: name.into(),
            interval,
            poll,
        }
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Base request and page bounds for one source
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    pub base: PageRequest,
    pub page_size: usize,
    pub max_pages: usize,
}

impl FetchPlan {
    pub fn new(base: PageRequest, page_size: usize, max_pages: usize) -> Self {
        Self {
            base,
            page_size,
            max_pages,
        }
    }

    pub fn single(page_size: usize) -> Self {
        Self::new(PageRequest::default(), page_size, 1)
    }
}

/// Fetch every page, upsert what arrived and collect discoveries
async fn harvest<S: PageSource + ?Sized>(
    source: &S,
    upserts: &UpsertStore,
    fetcher: &PaginatedFetcher,
    base: PageRequest,
    plan: &FetchPlan,
) -> Result<CycleReport, JobError> {
    let outcome = fetcher
        .fetch_all(source, base, plan.page_size, plan.max_pages)
        .await;
    let (batch, written) = upserts.write_batch(&outcome.records).await;

    if let Some(source) = outcome.error {
        return Err(JobError::Fetch {
            written: batch.written,
            source,
        });
    }

    // Skipped records reveal nothing
    let mut seen = HashSet::new();
    let discovered = written
        .into_iter()
        .flat_map(|record| record.discovered())
        .filter(|entity| seen.insert(entity.clone()))
        .collect();

    Ok(CycleReport {
        batch,
        pages: outcome.pages,
        discovered,
        ..Default::default()
    })
}

/// Pages through a provider list on every poll
pub struct ListingJob<S> {
    source: Arc<S>,
    upserts: Arc<UpsertStore>,
    fetcher: PaginatedFetcher,
    plan: FetchPlan,
}

impl<S: PageSource> ListingJob<S> {
    pub fn new(
        source: Arc<S>,
        upserts: Arc<UpsertStore>,
        fetcher: PaginatedFetcher,
        plan: FetchPlan,
    ) -> Self {
        Self {
            source,
            upserts,
            fetcher,
            plan,
        }
    }
}

#[async_trait]
impl<S: PageSource> PollJob for ListingJob<S> {
    async fn poll(&self) -> Result<CycleReport, JobError> {
        harvest(
            self.source.as_ref(),
            &self.upserts,
            &self.fetcher,
            self.plan.base.clone(),
            &self.plan,
        )
        .await
    }
}

/// One fetch-and-store step for a single entity
#[async_trait]
pub trait EntityStep: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> EntityKind;
    async fn run(&self, entity: &EntityId) -> Result<CycleReport, JobError>;
}

/// Entity step backed by a page source
pub struct SourceStep<S> {
    kind: EntityKind,
    source: Arc<S>,
    upserts: Arc<UpsertStore>,
    fetcher: PaginatedFetcher,
    plan: FetchPlan,
}

impl<S: PageSource> SourceStep<S> {
    pub fn new(
        kind: EntityKind,
        source: Arc<S>,
        upserts: Arc<UpsertStore>,
        fetcher: PaginatedFetcher,
        plan: FetchPlan,
    ) -> Self {
        Self {
            kind,
            source,
            upserts,
            fetcher,
            plan,
        }
    }
}

#[async_trait]
impl<S: PageSource> EntityStep for SourceStep<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn run(&self, entity: &EntityId) -> Result<CycleReport, JobError> {
        let base = PageRequest {
            entity: Some(entity.clone()),
            ..self.plan.base.clone()
        };
        harvest(self.source.as_ref(), &self.upserts, &self.fetcher, base, &self.plan).await
    }
}

/// Runs a step for every registered entity of the step's kind
pub struct TrackedEntityJob {
    step: Arc<dyn EntityStep>,
    registry: Arc<EntityRegistry>,
    entity_delay: Duration,
}

impl TrackedEntityJob {
    pub fn new(step: Arc<dyn EntityStep>, registry: Arc<EntityRegistry>) -> Self {
        Self {
            step,
            registry,
            entity_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive entities
    pub fn with_entity_delay(mut self, delay: Duration) -> Self {
        self.entity_delay = delay;
        self
    }
}

#[async_trait]
impl PollJob for TrackedEntityJob {
    async fn poll(&self) -> Result<CycleReport, JobError> {
        let entities = self.registry.snapshot(self.step.kind());
        let mut report = CycleReport::default();
        if entities.is_empty() {
            tracing::debug!("{}: no tracked {}s yet", self.step.name(), self.step.kind());
            return Ok(report);
        }

        let mut last_error = None;
        for (i, entity) in entities.iter().enumerate() {
            if i > 0 && !self.entity_delay.is_zero() {
                tokio::time::sleep(self.entity_delay).await;
            }
            report.entities += 1;
            match self.step.run(entity).await {
                Ok(step_report) => report.absorb(step_report),
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", self.step.name(), entity, e);
                    report.entity_failures += 1;
                    report.batch.written += e.written();
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) if report.entity_failures == report.entities => {
                Err(JobError::AllEntitiesFailed {
                    total: report.entities,
                    written: report.batch.written,
                    last: Box::new(last),
                })
            }
            _ => Ok(report),
        }
    }
}
