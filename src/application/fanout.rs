//! Dependent task fan-out
//!
//! Entities discovered by a job cycle are offered to [`FanOut::dispatch`].
//! Each newly registered entity gets one dependent task that runs the
//! configured [`EntityStep`]s for its kind. Concurrency is bounded by a
//! semaphore; when no permit is free the discovery is dropped without being
//! registered, so the next cycle of the source job offers it again.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::job::EntityStep;
use super::stats::FanOutStats;
use crate::domain::{EntityKind, EntityRef, EntityRegistry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanOutError {
    #[error("Fan-out capacity exhausted: {limit} dependent tasks in flight")]
    CapacityExhausted { limit: usize },
}

/// What one dispatch did with its discoveries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    pub offered: usize,
    /// Newly registered, whether or not a task was spawned
    pub registered: usize,
    pub spawned: usize,
    pub already_known: usize,
    pub declined: usize,
}

pub struct FanOut {
    registry: Arc<EntityRegistry>,
    steps: Vec<Arc<dyn EntityStep>>,
    permits: Arc<Semaphore>,
    limit: usize,
    tracker: TaskTracker,
    stats: Arc<FanOutStats>,
    cancel: CancellationToken,
}

impl FanOut {
    pub fn new(registry: Arc<EntityRegistry>, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            registry,
            steps: Vec::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            limit: max_concurrent,
            tracker: TaskTracker::new(),
            stats: Arc::new(FanOutStats::default()),
            cancel,
        }
    }

    /// Add a step run for every new entity of the step's kind
    pub fn with_step(mut self, step: Arc<dyn EntityStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn stats(&self) -> Arc<FanOutStats> {
        Arc::clone(&self.stats)
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Dependent tasks currently running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    fn steps_for(&self, kind: EntityKind) -> Vec<Arc<dyn EntityStep>> {
        self.steps
            .iter()
            .filter(|step| step.kind() == kind)
            .cloned()
            .collect()
    }

    fn acquire(&self) -> Result<OwnedSemaphorePermit, FanOutError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| FanOutError::CapacityExhausted { limit: self.limit })
    }

    /// Register new entities and spawn their dependent tasks
    pub fn dispatch(&self, origin: &str, discovered: &[EntityRef]) -> FanOutSummary {
        let mut summary = FanOutSummary {
            offered: discovered.len(),
            ..Default::default()
        };

        for entity in discovered {
            if self.registry.contains(entity) {
                summary.already_known += 1;
                FanOutStats::bump(&self.stats.already_known);
                continue;
            }

            let steps = self.steps_for(entity.kind);
            if steps.is_empty() {
                if self.registry.register(entity) {
                    summary.registered += 1;
                } else {
                    summary.already_known += 1;
                    FanOutStats::bump(&self.stats.already_known);
                }
                continue;
            }

            let permit = match self.acquire() {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::debug!("{}: dropping discovery {}: {}", origin, entity, e);
                    summary.declined += 1;
                    FanOutStats::bump(&self.stats.declined);
                    continue;
                }
            };

            // Another job may have registered it since the check above
            if !self.registry.register(entity) {
                drop(permit);
                summary.already_known += 1;
                FanOutStats::bump(&self.stats.already_known);
                continue;
            }

            summary.registered += 1;
            summary.spawned += 1;
            FanOutStats::bump(&self.stats.spawned);
            self.spawn(entity.clone(), steps, permit);
        }

        if summary.spawned > 0 || summary.declined > 0 {
            tracing::info!(
                "{}: {} new entities, {} dependent tasks spawned, {} declined",
                origin,
                summary.registered,
                summary.spawned,
                summary.declined
            );
        }

        summary
    }

    fn spawn(&self, entity: EntityRef, steps: Vec<Arc<dyn EntityStep>>, permit: OwnedSemaphorePermit) {
        let stats = Arc::clone(&self.stats);
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let _permit = permit;
            let mut failed = false;

            for step in steps {
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Dependent task for {} cancelled", entity);
                        return;
                    }
                    result = step.run(&entity.id) => result,
                };

                match result {
                    Ok(report) => tracing::debug!(
                        "{} for {}: {} records",
                        step.name(),
                        entity,
                        report.records_written()
                    ),
                    Err(e) => {
                        tracing::warn!("{} failed for new {}: {}", step.name(), entity, e);
                        failed = true;
                    }
                }
            }

            if failed {
                FanOutStats::bump(&stats.failed);
            } else {
                FanOutStats::bump(&stats.completed);
            }
        });
    }

    /// Wait until every dependent task spawned so far has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting work and wait for in-flight tasks
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::application::job::{CycleReport, JobError};
    use crate::domain::EntityId;
    use crate::ports::FetchError;

    struct CountingStep {
        kind: EntityKind,
        runs: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingStep {
        fn new(kind: EntityKind) -> Self {
            Self {
                kind,
                runs: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl EntityStep for CountingStep {
        fn name(&self) -> &str {
            "counting"
        }

        fn kind(&self) -> EntityKind {
            self.kind
        }

        async fn run(&self, _entity: &EntityId) -> Result<CycleReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(JobError::Fetch {
                    written: 0,
                    source: FetchError::Transient("timeout".into()),
                });
            }
            Ok(CycleReport::default())
        }
    }

    fn token(n: u8) -> EntityRef {
        EntityRef::token(EntityId::new(format!("token-{}", n)))
    }

    #[tokio::test]
    async fn test_one_task_across_two_discovery_events() {
        let step = Arc::new(CountingStep::new(EntityKind::Token));
        let fanout = FanOut::new(Arc::new(EntityRegistry::new()), 4, CancellationToken::new())
            .with_step(step.clone());

        let first = fanout.dispatch("trending", &[token(1)]);
        fanout.wait_idle().await;
        let second = fanout.dispatch("trending", &[token(1)]);
        fanout.wait_idle().await;

        assert_eq!(first.spawned, 1);
        assert_eq!(second.spawned, 0);
        assert_eq!(second.already_known, 1);
        assert_eq!(step.runs.load(Ordering::SeqCst), 1);
        assert_eq!(fanout.stats().snapshot().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_discovery_is_not_registered() {
        let mut step = CountingStep::new(EntityKind::Token);
        step.delay = Duration::from_secs(5);
        let registry = Arc::new(EntityRegistry::new());
        let fanout = FanOut::new(Arc::clone(&registry), 1, CancellationToken::new())
            .with_step(Arc::new(step));

        let summary = fanout.dispatch("trending", &[token(1), token(2), token(3)]);
        assert_eq!(summary.spawned, 1);
        assert_eq!(summary.declined, 2);
        assert!(registry.contains(&token(1)));
        assert!(!registry.contains(&token(2)));

        fanout.wait_idle().await;
        // capacity is back; the dropped ones are picked up next time
        let retry = fanout.dispatch("trending", &[token(2), token(3)]);
        assert_eq!(retry.spawned, 1);
        assert_eq!(retry.declined, 1);
    }

    #[tokio::test]
    async fn test_failed_task_is_counted_not_propagated() {
        let mut failing = CountingStep::new(EntityKind::Wallet);
        failing.fail = true;
        let fanout = FanOut::new(Arc::new(EntityRegistry::new()), 4, CancellationToken::new())
            .with_step(Arc::new(failing));

        let wallet = EntityRef::wallet(EntityId::new("wallet-1"));
        assert_eq!(fanout.dispatch("top_traders", &[wallet]).spawned, 1);
        fanout.wait_idle().await;

        let snap = fanout.stats().snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.completed, 0);
    }

    #[tokio::test]
    async fn test_kind_without_steps_only_registers() {
        let registry = Arc::new(EntityRegistry::new());
        let fanout = FanOut::new(Arc::clone(&registry), 4, CancellationToken::new())
            .with_step(Arc::new(CountingStep::new(EntityKind::Token)));

        let wallet = EntityRef::wallet(EntityId::new("wallet-1"));
        let summary = fanout.dispatch("top_traders", &[wallet.clone()]);
        assert_eq!(summary.registered, 1);
        assert_eq!(summary.spawned, 0);
        assert!(registry.contains(&wallet));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_running_tasks() {
        let mut slow = CountingStep::new(EntityKind::Token);
        slow.delay = Duration::from_secs(3600);
        let cancel = CancellationToken::new();
        let fanout = FanOut::new(Arc::new(EntityRegistry::new()), 4, cancel.clone())
            .with_step(Arc::new(slow));

        fanout.dispatch("trending", &[token(1), token(2)]);
        assert_eq!(fanout.in_flight(), 2);

        cancel.cancel();
        fanout.drain().await;
        assert_eq!(fanout.in_flight(), 0);
        assert_eq!(fanout.stats().snapshot().completed, 0);
    }
}
