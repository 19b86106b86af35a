//! Scheduler
//!
//! Owns the registered jobs and runs one perpetual loop per job:
//! `Idle → Running → (Succeeded | Failed) → Idle`. A failed cycle is logged
//! and the loop carries on. Discoveries from a successful cycle go to the
//! shared [`FanOut`]. Shutdown is cooperative through a cancellation token
//! with a bounded grace period.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::fanout::FanOut;
use super::job::{EntityStep, JobDescriptor};
use super::stats::{JobStats, SchedulerStats, StatsSnapshot};
use crate::domain::EntityRegistry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("Job '{0}' has a zero interval")]
    ZeroInterval(String),

    #[error("No jobs registered")]
    NoJobs,
}

/// Whether a job polls right away or waits one interval first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstCycle {
    /// Fetch, then sleep
    #[default]
    Immediate,
    /// Sleep, then fetch
    AfterInterval,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub first_cycle: FirstCycle,
    pub max_concurrent_tasks: usize,
    pub shutdown_grace: Duration,
    /// Zero disables periodic stats logging
    pub stats_interval: Duration,
    /// Drop registry entries older than this; None keeps them forever
    pub registry_retention: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            first_cycle: FirstCycle::Immediate,
            max_concurrent_tasks: 8,
            shutdown_grace: Duration::from_secs(10),
            stats_interval: Duration::from_secs(300),
            registry_retention: None,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<EntityRegistry>,
    jobs: Vec<JobDescriptor>,
    dependents: Vec<Arc<dyn EntityStep>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, registry: Arc<EntityRegistry>) -> Self {
        Self {
            config,
            registry,
            jobs: Vec::new(),
            dependents: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn register_job(&mut self, job: JobDescriptor) -> Result<(), SchedulerError> {
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(SchedulerError::DuplicateJob(job.name));
        }
        if job.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval(job.name));
        }
        tracing::debug!("Registered job {} every {:?}", job.name, job.interval);
        self.jobs.push(job);
        Ok(())
    }

    /// Add a step run once for every newly discovered entity of its kind
    pub fn with_dependent(mut self, step: Arc<dyn EntityStep>) -> Self {
        self.dependents.push(step);
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn build(&self) -> (Arc<FanOut>, Arc<SchedulerStats>, BTreeMap<String, Arc<JobStats>>) {
        let fanout = self.dependents.iter().fold(
            FanOut::new(
                Arc::clone(&self.registry),
                self.config.max_concurrent_tasks,
                self.cancel.child_token(),
            ),
            |fanout, step| fanout.with_step(Arc::clone(step)),
        );

        let jobs: BTreeMap<String, Arc<JobStats>> = self
            .jobs
            .iter()
            .map(|j| (j.name.clone(), Arc::new(JobStats::default())))
            .collect();

        let stats = Arc::new(SchedulerStats {
            jobs: jobs.clone(),
            fan_out: fanout.stats(),
        });

        (Arc::new(fanout), stats, jobs)
    }

    /// Run one cycle of every job, then wait for the dependent tasks
    pub async fn run_once(&self) -> Result<StatsSnapshot, SchedulerError> {
        if self.jobs.is_empty() {
            return Err(SchedulerError::NoJobs);
        }

        let (fanout, stats, job_stats) = self.build();
        let mut cycles = JoinSet::new();
        for job in &self.jobs {
            let job = job.clone();
            let fanout = Arc::clone(&fanout);
            let counters = Arc::clone(&job_stats[&job.name]);
            cycles.spawn(async move { run_cycle(&job, &counters, &fanout).await });
        }
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Job cycle panicked: {}", e);
            }
        }

        fanout.wait_idle().await;
        Ok(stats.snapshot(self.registry.len()))
    }

    /// Spawn every job loop plus housekeeping and return a handle
    pub fn start(self) -> Result<SchedulerHandle, SchedulerError> {
        if self.jobs.is_empty() {
            return Err(SchedulerError::NoJobs);
        }

        let (fanout, stats, job_stats) = self.build();
        tracing::info!(
            "Starting scheduler with {} jobs, first cycle {:?}, max {} dependent tasks",
            self.jobs.len(),
            self.config.first_cycle,
            self.config.max_concurrent_tasks
        );

        let mut loops = Vec::with_capacity(self.jobs.len() + 1);
        for job in self.jobs {
            let counters = Arc::clone(&job_stats[&job.name]);
            loops.push(tokio::spawn(job_loop(
                job,
                counters,
                Arc::clone(&fanout),
                self.config.first_cycle,
                self.cancel.clone(),
            )));
        }
        loops.push(tokio::spawn(housekeeping(
            Arc::clone(&stats),
            Arc::clone(&self.registry),
            self.config.clone(),
            self.cancel.clone(),
        )));

        Ok(SchedulerHandle {
            cancel: self.cancel,
            loops,
            fanout,
            stats,
            registry: self.registry,
            grace: self.config.shutdown_grace,
        })
    }
}

async fn run_cycle(job: &JobDescriptor, stats: &JobStats, fanout: &FanOut) {
    let poll = stats.record_poll();
    match job.poll.poll().await {
        Ok(report) => {
            stats.record_success(report.records_written());
            tracing::info!(
                "{} poll #{}: {} records written over {} pages",
                job.name,
                poll,
                report.records_written(),
                report.pages
            );
            if !report.discovered.is_empty() {
                fanout.dispatch(&job.name, &report.discovered);
            }
        }
        Err(e) => {
            stats.record_failure(e.written());
            tracing::error!("{} poll #{} failed: {}", job.name, poll, e);
        }
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn idle(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

async fn job_loop(
    job: JobDescriptor,
    stats: Arc<JobStats>,
    fanout: Arc<FanOut>,
    first_cycle: FirstCycle,
    cancel: CancellationToken,
) {
    if first_cycle == FirstCycle::AfterInterval && !idle(job.interval, &cancel).await {
        return;
    }

    while !cancel.is_cancelled() {
        run_cycle(&job, &stats, &fanout).await;
        if !idle(job.interval, &cancel).await {
            break;
        }
    }
    tracing::debug!("{} loop stopped", job.name);
}

async fn housekeeping(
    stats: Arc<SchedulerStats>,
    registry: Arc<EntityRegistry>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) {
    if config.stats_interval.is_zero() {
        return;
    }

    while idle(config.stats_interval, &cancel).await {
        if let Some(retention) = config.registry_retention {
            let pruned = registry.prune_older_than(retention);
            if pruned > 0 {
                tracing::info!("Pruned {} registry entries older than {:?}", pruned, retention);
            }
        }

        let snapshot = stats.snapshot(registry.len());
        match serde_json::to_string(&snapshot) {
            Ok(json) => tracing::info!("Stats: {}", json),
            Err(e) => tracing::warn!("Failed to serialise stats: {}", e),
        }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
    fanout: Arc<FanOut>,
    stats: Arc<SchedulerStats>,
    registry: Arc<EntityRegistry>,
    grace: Duration,
}

impl SchedulerHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.registry.len())
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal every loop and dependent task, wait up to the grace period,
    /// then abort whatever is still running
    pub async fn shutdown(mut self) -> StatsSnapshot {
        tracing::info!("Stop signal sent to scheduler");
        self.cancel.cancel();

        let loops = &mut self.loops;
        let fanout = &self.fanout;
        let drained = tokio::time::timeout(self.grace, async {
            for handle in loops.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!("Job loop ended abnormally: {}", e);
                }
            }
            fanout.drain().await;
        })
        .await;

        if drained.is_err() {
            tracing::warn!("Shutdown grace period of {:?} elapsed, aborting", self.grace);
            for handle in &self.loops {
                handle.abort();
            }
        }

        let snapshot = self.stats();
        tracing::info!("Scheduler stopped");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::job::{CycleReport, JobError, PollJob};
    use crate::domain::{EntityId, EntityRef};
    use crate::ports::FetchError;

    /// Counts polls; fails the polls listed in `fail_on` (1-based)
    struct CountingJob {
        polls: AtomicUsize,
        fail_on: Vec<usize>,
        discovered: Vec<EntityRef>,
    }

    impl CountingJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                polls: AtomicUsize::new(0),
                fail_on: Vec::new(),
                discovered: Vec::new(),
            })
        }

        fn failing_on(fail_on: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                polls: AtomicUsize::new(0),
                fail_on,
                discovered: Vec::new(),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PollJob for CountingJob {
        async fn poll(&self) -> Result<CycleReport, JobError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                return Err(JobError::Fetch {
                    written: 0,
                    source: FetchError::invalid("missing sort_by"),
                });
            }
            Ok(CycleReport {
                discovered: self.discovered.clone(),
                ..Default::default()
            })
        }
    }

    fn descriptor(name: &str, secs: u64, job: Arc<CountingJob>) -> JobDescriptor {
        JobDescriptor::new(name, Duration::from_secs(secs), job)
    }

    fn scheduler(first_cycle: FirstCycle) -> Scheduler {
        let config = SchedulerConfig {
            first_cycle,
            stats_interval: Duration::ZERO,
            ..Default::default()
        };
        Scheduler::new(config, Arc::new(EntityRegistry::new()))
    }

    #[test]
    fn test_register_rejects_duplicates_and_zero_interval() {
        let mut s = scheduler(FirstCycle::Immediate);
        s.register_job(descriptor("trending", 60, CountingJob::new())).unwrap();
        assert_eq!(
            s.register_job(descriptor("trending", 30, CountingJob::new())),
            Err(SchedulerError::DuplicateJob("trending".into()))
        );
        assert_eq!(
            s.register_job(descriptor("boosts", 0, CountingJob::new())),
            Err(SchedulerError::ZeroInterval("boosts".into()))
        );
        assert_eq!(s.job_names(), vec!["trending"]);
    }

    #[tokio::test]
    async fn test_start_without_jobs_fails() {
        assert!(matches!(
            scheduler(FirstCycle::Immediate).start(),
            Err(SchedulerError::NoJobs)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_does_not_stop_loop() {
        let failing = CountingJob::failing_on(vec![1]);
        let healthy = CountingJob::new();
        let mut s = scheduler(FirstCycle::Immediate);
        s.register_job(descriptor("failing", 60, failing.clone())).unwrap();
        s.register_job(descriptor("healthy", 60, healthy.clone())).unwrap();

        let handle = s.start().unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(failing.polls(), 2);
        assert_eq!(healthy.polls(), 2);
        let snap = handle.shutdown().await;
        let failing_stats = snap.job("failing").unwrap();
        assert_eq!(failing_stats.failures, 1);
        assert_eq!(failing_stats.successes, 1);
        assert_eq!(snap.job("healthy").unwrap().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_interval_waits_before_first_poll() {
        let job = CountingJob::new();
        let mut s = scheduler(FirstCycle::AfterInterval);
        s.register_job(descriptor("overview", 300, job.clone())).unwrap();

        let handle = s.start().unwrap();
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(job.polls(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.polls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loops() {
        let job = CountingJob::new();
        let mut s = scheduler(FirstCycle::Immediate);
        s.register_job(descriptor("boosts", 6, job.clone())).unwrap();

        let handle = s.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown().await;

        let polls = job.polls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.polls(), polls);
    }

    #[tokio::test]
    async fn test_run_once_registers_discoveries() {
        let job = Arc::new(CountingJob {
            polls: AtomicUsize::new(0),
            fail_on: Vec::new(),
            discovered: vec![
                EntityRef::token(EntityId::new("a")),
                EntityRef::token(EntityId::new("b")),
            ],
        });
        let mut s = scheduler(FirstCycle::Immediate);
        s.register_job(JobDescriptor::new("trending", Duration::from_secs(60), job)).unwrap();

        let snap = s.run_once().await.unwrap();
        assert_eq!(snap.registry_size, 2);
        assert_eq!(snap.job("trending").unwrap().polls, 1);
    }
}
