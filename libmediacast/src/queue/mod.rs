//! Publishing job queue
//!
//! `JobQueue` ties together the [`JobStore`], the [`PriorityIndex`] and the
//! in-flight set behind a single mutex, so every transition (enqueue, claim,
//! report, pause, delete, cleanup) is one critical section. Nothing in here
//! blocks on I/O: the publish itself happens outside the queue, and the
//! caller reports the outcome with [`JobQueue::report_success`] or
//! [`JobQueue::report_failure`].
//!
//! # Example
//!
//! ```
//! use libmediacast::config::QueueConfig;
//! use libmediacast::queue::JobQueue;
//! use libmediacast::types::{NewJob, Platform};
//!
//! let queue = JobQueue::new(QueueConfig::default());
//! let job = queue
//!     .add_job(NewJob::new(Platform::TikTok, serde_json::json!({"video": "clip.mp4"})).priority(8))
//!     .unwrap();
//!
//! let claimed = queue.acquire_next().unwrap();
//! assert_eq!(claimed.id, job.id);
//! queue.report_success(&claimed.id).unwrap();
//! ```

pub mod events;
pub mod priority;
pub mod retry;
pub mod store;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::types::{Job, JobId, JobStatus, NewJob, MAX_PRIORITY, MIN_PRIORITY};

use self::events::{EventBus, EventReceiver, QueueEvent};
use self::priority::PriorityIndex;
use self::retry::{RetryDecision, RetryPolicy};
use self::store::JobStore;

/// Aggregate counts over every job in the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
    pub avg_retries: f64,
    /// Ids waiting in the priority index (paused jobs are not counted)
    pub queue_length: usize,
    /// Size of the in-flight set
    pub processing_count: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    store: JobStore,
    index: PriorityIndex,
    in_flight: HashSet<JobId>,
}

pub struct JobQueue {
    config: QueueConfig,
    retry: RetryPolicy,
    state: Mutex<QueueState>,
    events: EventBus,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_retry_policy(config, RetryPolicy::default())
    }

    pub fn with_retry_policy(config: QueueConfig, retry: RetryPolicy) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            retry,
            state: Mutex::new(QueueState::default()),
            events,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Receive lifecycle events for every job in this queue.
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.events.subscribe();
        debug!(subscribers = self.events.subscriber_count(), "queue event subscriber added");
        receiver
    }

    // No mutation leaves the state half-written, so a poisoned lock is usable.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new job as `pending`.
    pub fn add_job(&self, new_job: NewJob) -> Result<Job, QueueError> {
        let priority = new_job.priority.unwrap_or(self.config.default_priority);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(QueueError::InvalidPriority(priority));
        }
        let max_retries = new_job
            .max_retries
            .unwrap_or(self.config.default_max_retries);

        let job = {
            let mut state = self.state();
            let job = state.store.create(new_job, priority, max_retries, Utc::now());
            state.index.insert(job.id, job.priority);
            job
        };

        info!(
            job_id = %job.id,
            platform = %job.platform,
            priority = job.priority,
            max_retries = job.max_retries,
            "job queued"
        );
        self.events.emit(QueueEvent::JobQueued {
            job_id: job.id,
            platform: job.platform,
            priority: job.priority,
        });

        Ok(job)
    }

    /// Claim the highest-priority pending job.
    ///
    /// Returns `None` without waiting when the in-flight set is at capacity
    /// or nothing is eligible. Concurrent callers never receive the same job.
    pub fn acquire_next(&self) -> Option<Job> {
        let job = {
            let mut state = self.state();

            if state.in_flight.len() >= self.config.max_concurrent {
                debug!(
                    in_flight = state.in_flight.len(),
                    max_concurrent = self.config.max_concurrent,
                    "at capacity"
                );
                return None;
            }

            let QueueState {
                store,
                index,
                in_flight,
            } = &mut *state;

            let id = index.next(|id| {
                !in_flight.contains(id)
                    && store
                        .get(id)
                        .is_some_and(|job| job.status == JobStatus::Pending)
            })?;

            index.remove(&id);
            in_flight.insert(id);
            store.update(&id, Utc::now(), |job| job.status = JobStatus::Processing)?
        };

        info!(job_id = %job.id, platform = %job.platform, priority = job.priority, "job started");
        self.events.emit(QueueEvent::JobStarted {
            job_id: job.id,
            platform: job.platform,
        });

        Some(job)
    }

    /// Mark a job as published.
    ///
    /// Only a claimed job changes state. Reporting a terminal job, a queued
    /// job or one paused while it was running returns it as-is.
    pub fn report_success(&self, id: &JobId) -> Result<Job, QueueError> {
        let job = {
            let mut state = self.state();
            let claimed = state.in_flight.remove(id);

            let current = state.store.get(id).ok_or(QueueError::NotFound(*id))?;
            if current.status.is_terminal() || !claimed {
                debug!(job_id = %id, status = %current.status, claimed, "success report ignored");
                return Ok(current.clone());
            }

            state.index.remove(id);
            let now = Utc::now();
            state
                .store
                .update(id, now, |job| {
                    job.status = JobStatus::Success;
                    job.processed_at = Some(now);
                })
                .ok_or(QueueError::NotFound(*id))?
        };

        info!(job_id = %job.id, platform = %job.platform, "job succeeded");
        self.events.emit(QueueEvent::JobSucceeded {
            job_id: job.id,
            platform: job.platform,
        });

        Ok(job)
    }

    /// Record a failed attempt and let the retry policy decide what happens.
    ///
    /// The job always leaves the in-flight set. A claimed job is either
    /// re-queued at a decayed priority or marked `failed` for good. A job
    /// that is not claimed (queued, or paused mid-publish) only records the
    /// error and stays where it is.
    pub fn report_failure(&self, id: &JobId, reason: &str) -> Result<Job, QueueError> {
        let (job, decision) = {
            let mut state = self.state();
            let claimed = state.in_flight.remove(id);

            let current = state.store.get(id).ok_or(QueueError::NotFound(*id))?;
            if current.status.is_terminal() {
                debug!(job_id = %id, status = %current.status, "failure report ignored");
                return Ok(current.clone());
            }
            if !claimed {
                debug!(job_id = %id, error = %reason, "failure recorded on unclaimed job");
                return state
                    .store
                    .update(id, Utc::now(), |job| job.error = Some(reason.to_string()))
                    .ok_or(QueueError::NotFound(*id));
            }

            let mut decision = None;
            let job = state
                .store
                .update(id, Utc::now(), |job| {
                    decision = Some(self.retry.on_failure(job, reason));
                })
                .ok_or(QueueError::NotFound(*id))?;
            let decision = decision.ok_or(QueueError::NotFound(*id))?;

            match decision {
                RetryDecision::Retry { priority, .. } => state.index.insert(job.id, priority),
                RetryDecision::Exhausted { .. } => {
                    state.index.remove(id);
                }
            }
            (job, decision)
        };

        match decision {
            RetryDecision::Retry { retries, priority } => {
                warn!(
                    job_id = %job.id,
                    retries,
                    max_retries = job.max_retries,
                    priority,
                    error = %reason,
                    "job failed, retrying"
                );
                self.events.emit(QueueEvent::JobRetrying {
                    job_id: job.id,
                    retries,
                    priority,
                    error: reason.to_string(),
                });
            }
            RetryDecision::Exhausted { retries } => {
                warn!(job_id = %job.id, retries, error = %reason, "job failed permanently");
                self.events.emit(QueueEvent::JobFailed {
                    job_id: job.id,
                    retries,
                    error: reason.to_string(),
                });
            }
        }

        Ok(job)
    }

    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.state().store.get(id).cloned()
    }

    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.state().store.get(id).map(|job| job.status)
    }

    /// Snapshot of every job, oldest first.
    pub fn all_jobs(&self) -> Vec<Job> {
        self.state().store.list()
    }

    pub fn jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.state().store.list_by_status(status)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state();
        let mut stats = QueueStats {
            total: state.store.len(),
            queue_length: state.index.len(),
            processing_count: state.in_flight.len(),
            ..Default::default()
        };

        let mut retries_sum: u64 = 0;
        for job in state.store.iter() {
            retries_sum += u64::from(job.retries);
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Success => stats.success += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        if stats.total > 0 {
            stats.avg_retries = retries_sum as f64 / stats.total as f64;
        }

        stats
    }

    /// Remove a job from the store, the priority index and the in-flight set.
    pub fn delete_job(&self, id: &JobId) -> bool {
        let removed = {
            let mut state = self.state();
            state.index.remove(id);
            state.in_flight.remove(id);
            state.store.delete(id).is_some()
        };

        if removed {
            info!(job_id = %id, "job deleted");
            self.events.emit(QueueEvent::JobDeleted { job_id: *id });
        }
        removed
    }

    /// Put a job on hold: back to `pending`, out of the in-flight set and out
    /// of the priority index. It stays in the store until resumed or deleted.
    pub fn pause_job(&self, id: &JobId) -> Result<Job, QueueError> {
        let job = {
            let mut state = self.state();
            let current = state.store.get(id).ok_or(QueueError::NotFound(*id))?;
            if current.status.is_terminal() {
                return Err(QueueError::Terminal {
                    id: *id,
                    status: current.status,
                });
            }

            state.index.remove(id);
            state.in_flight.remove(id);
            state
                .store
                .update(id, Utc::now(), |job| job.status = JobStatus::Pending)
                .ok_or(QueueError::NotFound(*id))?
        };

        info!(job_id = %id, "job paused");
        self.events.emit(QueueEvent::JobPaused { job_id: *id });
        Ok(job)
    }

    /// Return a paused job to the priority index at its current priority.
    ///
    /// A job that is already queued or currently processing is left alone.
    pub fn resume_job(&self, id: &JobId) -> Result<Job, QueueError> {
        let job = {
            let mut state = self.state();
            let current = state.store.get(id).ok_or(QueueError::NotFound(*id))?.clone();
            match current.status {
                JobStatus::Success | JobStatus::Failed => {
                    return Err(QueueError::Terminal {
                        id: *id,
                        status: current.status,
                    });
                }
                JobStatus::Processing => return Ok(current),
                JobStatus::Pending if state.index.contains(id) => return Ok(current),
                JobStatus::Pending => {
                    state.index.insert(current.id, current.priority);
                    state
                        .store
                        .update(id, Utc::now(), |_| {})
                        .ok_or(QueueError::NotFound(*id))?
                }
            }
        };

        info!(job_id = %id, priority = job.priority, "job resumed");
        self.events.emit(QueueEvent::JobResumed {
            job_id: *id,
            priority: job.priority,
        });
        Ok(job)
    }

    /// Purge jobs untouched for longer than the retention window.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// [`cleanup`](Self::cleanup) evaluated as if the current time were `now`.
    ///
    /// Jobs in `processing` are never purged, whatever their age.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };

        let removed = {
            let mut state = self.state();
            let doomed = state
                .store
                .purge(|job| job.status != JobStatus::Processing && job.updated_at < cutoff);
            for id in &doomed {
                state.index.remove(id);
                state.in_flight.remove(id);
            }
            doomed.len()
        };

        if removed > 0 {
            info!(removed, "cleanup removed stale jobs");
        }
        self.events.emit(QueueEvent::CleanedUp { removed });
        removed
    }
}
