//! Retry policy with priority decay.

use crate::types::{Job, JobStatus, MIN_PRIORITY};

/// Outcome of routing a failed attempt through [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `pending` at the decayed priority; caller must re-insert it.
    Retry { retries: u32, priority: u8 },
    /// Retries exhausted; the job is now permanently `failed`.
    Exhausted { retries: u32 },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Priority levels lost per failed attempt
    pub priority_decay: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { priority_decay: 1 }
    }
}

impl RetryPolicy {
    /// Record a failed attempt on `job` and move it to its next state.
    ///
    /// `retries` never exceeds `max_retries` and priority never rises.
    pub fn on_failure(&self, job: &mut Job, reason: &str) -> RetryDecision {
        job.retries = job.retries.saturating_add(1).min(job.max_retries);
        job.error = Some(reason.to_string());

        if job.retries < job.max_retries {
            job.status = JobStatus::Pending;
            job.priority = job
                .priority
                .saturating_sub(self.priority_decay)
                .max(MIN_PRIORITY);
            RetryDecision::Retry {
                retries: job.retries,
                priority: job.priority,
            }
        } else {
            job.status = JobStatus::Failed;
            RetryDecision::Exhausted {
                retries: job.retries,
            }
        }
    }
}
