//! Idempotent keyed upsert
//!
//! Insert-or-update built from the row store primitives. Writes to the
//! same (table, key) are serialised through a per-key async lock; a record
//! that fails is logged and skipped without affecting the rest of the batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::{Record, RecordError, UpsertKey};
use crate::ports::{RowStore, StoreError};

/// Counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    /// Inserted plus updated
    pub written: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.attempted += other.attempted;
        self.written += other.written;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Lazily created per-key locks, dropped once nobody holds or waits on them
#[derive(Debug, Default)]
struct KeyedLocks {
    /// Lock plus the number of callers holding or waiting on it
    locks: Mutex<HashMap<String, (Arc<AsyncMutex<()>>, usize)>>,
}

/// One caller's claim on a key; the last claim out removes the entry
struct Interest<'a> {
    owner: &'a KeyedLocks,
    key: String,
}

impl Drop for Interest<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, users)) = locks.get_mut(&self.key) {
            *users -= 1;
            if *users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

struct KeyGuard<'a> {
    // Fields drop in order: the mutex is released before the claim
    _guard: OwnedMutexGuard<()>,
    _interest: Interest<'a>,
}

impl KeyedLocks {
    async fn lock(&self, key: String) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let (lock, users) = locks
                .entry(key.clone())
                .or_insert_with(|| (Arc::default(), 0));
            *users += 1;
            Arc::clone(lock)
        };
        // Registered before waiting so a cancelled waiter still releases it
        let interest = Interest { owner: self, key };
        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _interest: interest,
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn storage_error(key: &UpsertKey, e: StoreError) -> RecordError {
    RecordError::Storage {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

pub struct UpsertStore {
    store: Arc<dyn RowStore>,
    locks: KeyedLocks,
}

impl UpsertStore {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Write one record under its key lock
    pub async fn upsert<R: Record>(&self, record: &R) -> Result<UpsertOutcome, RecordError> {
        let key = record.upsert_key()?;
        let fields = record.fields()?;
        let _guard = self
            .locks
            .lock(format!("{}\u{0}{}", R::TABLE, key))
            .await;

        let existing = self
            .store
            .find_by_key(R::TABLE, &key)
            .await
            .map_err(|e| storage_error(&key, e))?;

        if existing.is_some() {
            self.store
                .update(R::TABLE, &key, &fields)
                .await
                .map_err(|e| storage_error(&key, e))?;
            return Ok(UpsertOutcome::Updated);
        }

        match self.store.insert(R::TABLE, &key, &fields).await {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(StoreError::Conflict { .. }) => {
                // Written by another process since the lookup
                self.store
                    .update(R::TABLE, &key, &fields)
                    .await
                    .map_err(|e| storage_error(&key, e))?;
                Ok(UpsertOutcome::Updated)
            }
            Err(e) => Err(storage_error(&key, e)),
        }
    }

    /// Write every record, skipping the ones that fail
    pub async fn upsert_batch<R: Record>(&self, records: &[R]) -> BatchReport {
        self.write_batch(records).await.0
    }

    /// Like [`upsert_batch`](Self::upsert_batch), also returning the records
    /// that reached the store, in input order
    pub async fn write_batch<'a, R: Record>(&self, records: &'a [R]) -> (BatchReport, Vec<&'a R>) {
        let mut report = BatchReport {
            attempted: records.len(),
            ..Default::default()
        };
        let mut written = Vec::with_capacity(records.len());

        for record in records {
            match self.upsert(record).await {
                Ok(outcome) => {
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                    }
                    report.written += 1;
                    written.push(record);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} record: {}", R::TABLE, e);
                    report.skipped += 1;
                }
            }
        }

        (report, written)
    }
}
