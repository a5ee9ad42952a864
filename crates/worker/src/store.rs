//! In-memory progress store: the single source of truth for job state.
//!
//! [`ProgressStore`] maps each [`JobId`] to its current [`ProgressState`].
//! Job executors write, any number of pollers read. The map is sharded
//! (`dashmap`), so every read or write of one job's entry happens under that
//! shard's lock and a reader always sees a whole state, never a torn one.
//!
//! Designed to be shared via `Arc<ProgressStore>`.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use emoti_core::job::{JobId, ProgressState};
use emoti_core::types::Timestamp;

/// Errors returned by [`ProgressStore`] writes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} is already registered")]
    AlreadyRegistered(JobId),

    #[error("job {0} is not registered")]
    NotFound(JobId),

    #[error("job {0} has already reached a terminal state")]
    Terminal(JobId),

    #[error("progress for job {id} would regress from {current} to {next}")]
    Regression { id: JobId, current: f64, next: f64 },
}

/// Stored state plus bookkeeping for retention.
#[derive(Debug)]
struct TrackedJob {
    state: ProgressState,
    /// Set when the job reaches a terminal state.
    finished_at: Option<Timestamp>,
}

/// Concurrent map from job id to current progress.
#[derive(Debug, Default)]
pub struct ProgressStore {
    jobs: DashMap<JobId, TrackedJob>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id` in the `Pending` state.
    ///
    /// Never overwrites: registering an existing id is an error.
    pub fn register(&self, id: JobId) -> Result<(), StoreError> {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                slot.insert(TrackedJob {
                    state: ProgressState::Pending,
                    finished_at: None,
                });
                Ok(())
            }
        }
    }

    /// Atomically replace the state of `id`.
    ///
    /// Rejects writes to unknown or already-terminal jobs, and in-progress
    /// updates whose fraction is lower than the stored one.
    pub fn update(&self, id: JobId, state: ProgressState) -> Result<(), StoreError> {
        let mut job = self.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.state.is_terminal() {
            return Err(StoreError::Terminal(id));
        }
        if let (Some(current), Some(next)) = (job.state.fraction(), state.fraction()) {
            if next < current {
                return Err(StoreError::Regression { id, current, next });
            }
        }

        if state.is_terminal() {
            job.finished_at = Some(Utc::now());
        }
        job.state = state;
        Ok(())
    }

    /// Snapshot of the current state, or `None` if `id` is unknown.
    pub fn get(&self, id: &JobId) -> Option<ProgressState> {
        self.jobs.get(id).map(|job| job.state.clone())
    }

    /// Remove terminal jobs that finished before `cutoff`.
    ///
    /// Jobs still pending or in progress are never evicted. Returns the
    /// number of entries removed.
    pub fn evict_finished(&self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        self.jobs.retain(|_, job| {
            let expired = job.finished_at.is_some_and(|at| at < cutoff);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
