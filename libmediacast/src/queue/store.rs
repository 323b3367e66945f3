//! Keyed table of job records, the source of truth for job state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{Job, JobId, JobStatus, NewJob};

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id and timestamps to `new_job`, store it and return a copy.
    ///
    /// Priority and retry ceiling are resolved by the caller so the store
    /// never has to know about configured defaults.
    pub fn create(
        &mut self,
        new_job: NewJob,
        priority: u8,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Job {
        let job = Job {
            id: JobId::new(),
            platform: new_job.platform,
            status: JobStatus::Pending,
            priority,
            payload: new_job.payload,
            retries: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            processed_at: None,
            error: None,
            metadata: new_job.metadata,
        };

        self.jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Apply `mutation` to the job and refresh `updated_at`.
    ///
    /// Returns the updated job, or `None` if the id is unknown.
    pub fn update<F>(&mut self, id: &JobId, now: DateTime<Utc>, mutation: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let job = self.jobs.get_mut(id)?;
        mutation(job);
        job.updated_at = now;
        Some(job.clone())
    }

    pub fn delete(&mut self, id: &JobId) -> Option<Job> {
        self.jobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshot of every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        self.snapshot(|_| true)
    }

    pub fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.snapshot(|job| job.status == status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Remove every job matching `predicate`, returning the removed ids.
    pub fn purge<F>(&mut self, mut predicate: F) -> Vec<JobId>
    where
        F: FnMut(&Job) -> bool,
    {
        let doomed: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| predicate(job))
            .map(|job| job.id)
            .collect();

        for id in &doomed {
            self.jobs.remove(id);
        }
        doomed
    }

    fn snapshot<F>(&self, predicate: F) -> Vec<Job>
    where
        F: Fn(&Job) -> bool,
    {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| predicate(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}
