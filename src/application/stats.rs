//! Runtime counters
//!
//! Lock-free counters updated by job loops and the fan-out, read as a
//! serialisable snapshot for periodic logging.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct JobStats {
    polls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    records_written: AtomicU64,
    last_cycle_written: AtomicU64,
}

impl JobStats {
    /// Returns the 1-based number of the poll just started
    pub fn record_poll(&self) -> u64 {
        self.polls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_success(&self, written: usize) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_written(written);
    }

    /// A failed cycle may still have written records before it failed
    pub fn record_failure(&self, written: usize) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_written(written);
    }

    fn record_written(&self, written: usize) {
        self.records_written.fetch_add(written as u64, Ordering::Relaxed);
        self.last_cycle_written.store(written as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            last_cycle_written: self.last_cycle_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStatsSnapshot {
    pub polls: u64,
    pub successes: u64,
    pub failures: u64,
    pub records_written: u64,
    pub last_cycle_written: u64,
}

#[derive(Debug, Default)]
pub struct FanOutStats {
    pub(crate) spawned: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) declined: AtomicU64,
    pub(crate) already_known: AtomicU64,
}

impl FanOutStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FanOutSnapshot {
        FanOutSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            already_known: self.already_known.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutSnapshot {
    pub spawned: u64,
    pub completed: u64,
    pub failed: u64,
    pub declined: u64,
    pub already_known: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub jobs: BTreeMap<String, JobStatsSnapshot>,
    pub fan_out: FanOutSnapshot,
    pub registry_size: usize,
}

impl StatsSnapshot {
    pub fn job(&self, name: &str) -> Option<&JobStatsSnapshot> {
        self.jobs.get(name)
    }
}

/// Every counter the scheduler owns
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub(crate) jobs: BTreeMap<String, Arc<JobStats>>,
    pub(crate) fan_out: Arc<FanOutStats>,
}

impl SchedulerStats {
    pub fn snapshot(&self, registry_size: usize) -> StatsSnapshot {
        StatsSnapshot {
            jobs: self
                .jobs
                .iter()
                .map(|(name, stats)| (name.clone(), stats.snapshot()))
                .collect(),
            fan_out: self.fan_out.snapshot(),
            registry_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_counters() {
        let stats = JobStats::default();
        assert_eq!(stats.record_poll(), 1);
        stats.record_success(45);
        assert_eq!(stats.record_poll(), 2);
        stats.record_failure(5);

        let snap = stats.snapshot();
        assert_eq!(snap.polls, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.records_written, 50);
        assert_eq!(snap.last_cycle_written, 5);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut stats = SchedulerStats::default();
        stats.jobs.insert("trending".into(), Arc::new(JobStats::default()));
        FanOutStats::bump(&stats.fan_out.spawned);

        let json = serde_json::to_value(stats.snapshot(3)).unwrap();
        assert_eq!(json["registry_size"], 3);
        assert_eq!(json["fan_out"]["spawned"], 1);
        assert_eq!(json["jobs"]["trending"]["polls"], 0);
    }
}
