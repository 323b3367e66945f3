//! Dispatch worker
//!
//! `Dispatcher` drives a [`JobQueue`]: it claims jobs with
//! [`JobQueue::acquire_next`] until the queue's concurrency cap is reached,
//! publishes them concurrently on a `tokio` [`JoinSet`], and reports every
//! outcome back to the queue. A publish that panics or overruns the
//! configured timeout is reported as an ordinary failure.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::PlatformError;
use crate::publisher::{PublishReceipt, Publisher};
use crate::queue::JobQueue;
use crate::types::{Job, JobId};

/// One publish attempt and the job state it produced.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptOutcome {
    /// Job as recorded by the queue after the report
    pub job: Job,
    pub receipt: Option<PublishReceipt>,
    pub error: Option<String>,
}

impl AttemptOutcome {
    pub fn succeeded(&self) -> bool {
        self.receipt.is_some()
    }

    /// True when the attempt left the job in a terminal state.
    pub fn is_final(&self) -> bool {
        self.job.status.is_terminal()
    }
}

type Attempt = (JobId, Result<PublishReceipt, String>);

pub struct Dispatcher {
    queue: Arc<JobQueue>,
    publisher: Arc<dyn Publisher>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(queue: Arc<JobQueue>, publisher: Arc<dyn Publisher>, config: DispatchConfig) -> Self {
        Self {
            queue,
            publisher,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Publish until nothing is pending or in flight.
    ///
    /// Retried jobs are picked up again in the same run, so on return every
    /// job that was reachable from the priority index is terminal.
    pub async fn run_until_idle(&self) -> Vec<AttemptOutcome> {
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();

        loop {
            self.fill(&mut tasks);

            match tasks.join_next().await {
                Some(Ok(attempt)) => {
                    if let Some(outcome) = self.report(attempt) {
                        outcomes.push(outcome);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "publish task aborted"),
                None => break,
            }
        }

        debug!(attempts = outcomes.len(), "dispatcher idle");
        outcomes
    }

    /// Publish until `shutdown` is set.
    ///
    /// The queue is polled every `poll_interval`, including while publishes
    /// are running, so free slots are filled without waiting for a running
    /// attempt to finish. Attempts already in flight when shutdown is
    /// requested are awaited and reported before returning.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Vec<AttemptOutcome> {
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();

        info!(
            publisher = %self.publisher.name(),
            max_concurrent = self.queue.config().max_concurrent,
            "dispatcher started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            self.fill(&mut tasks);

            if tasks.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(attempt)) => outcomes.extend(self.report(attempt)),
                    Some(Err(e)) => warn!(error = %e, "publish task aborted"),
                    None => {}
                },
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "waiting for in-flight publishes");
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(attempt) => outcomes.extend(self.report(attempt)),
                Err(e) => warn!(error = %e, "publish task aborted"),
            }
        }

        info!(attempts = outcomes.len(), "dispatcher stopped");
        outcomes
    }

    fn fill(&self, tasks: &mut JoinSet<Attempt>) {
        while let Some(job) = self.queue.acquire_next() {
            let publisher = self.publisher.clone();
            let timeout = self.config.publish_timeout;
            tasks.spawn(attempt(publisher, job, timeout));
        }
    }

    fn report(&self, (id, result): Attempt) -> Option<AttemptOutcome> {
        let (reported, receipt, error) = match result {
            Ok(receipt) => (self.queue.report_success(&id), Some(receipt), None),
            Err(reason) => (self.queue.report_failure(&id, &reason), None, Some(reason)),
        };

        match reported {
            Ok(job) => Some(AttemptOutcome {
                job,
                receipt,
                error,
            }),
            Err(e) => {
                // Deleted while the publish was running
                warn!(job_id = %id, error = %e, "could not report publish outcome");
                None
            }
        }
    }
}

async fn attempt(publisher: Arc<dyn Publisher>, job: Job, timeout: Option<Duration>) -> Attempt {
    debug!(job_id = %job.id, publisher = %publisher.name(), "publishing");

    let publish = AssertUnwindSafe(publisher.publish(&job)).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, publish).await {
            Ok(result) => result,
            Err(_) => Ok(Err(PlatformError::Timeout(limit))),
        },
        None => publish.await,
    };

    let result = match result {
        Ok(Ok(receipt)) => Ok(receipt),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("publisher '{}' panicked", publisher.name())),
    };

    if let Err(reason) = &result {
        debug!(job_id = %job.id, error = %reason, "publish attempt failed");
    }
    (job.id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::publisher::mock::MockPublisher;
    use crate::types::{JobStatus, NewJob, Platform};
    use serde_json::json;

    fn dispatcher(queue: &Arc<JobQueue>, publisher: Arc<dyn Publisher>) -> Dispatcher {
        Dispatcher::new(queue.clone(), publisher, DispatchConfig::default())
    }

    #[tokio::test]
    async fn drains_queue_with_successful_publisher() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        for _ in 0..5 {
            queue.add_job(NewJob::new(Platform::TikTok, json!({}))).unwrap();
        }
        let publisher = Arc::new(MockPublisher::success("tiktok"));

        let outcomes = dispatcher(&queue, publisher.clone()).run_until_idle().await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.succeeded() && o.is_final()));
        assert_eq!(publisher.call_count(), 5);
        assert_eq!(queue.stats().success, 5);
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_retried_until_exhausted() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let job = queue
            .add_job(NewJob::new(Platform::YouTube, json!({})).max_retries(3))
            .unwrap();
        let publisher = Arc::new(MockPublisher::failure("youtube", "quota"));

        let outcomes = dispatcher(&queue, publisher.clone()).run_until_idle().await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(publisher.call_count(), 3);
        let failed = queue.get_job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retries, 3);
        assert_eq!(failed.error.as_deref(), Some("Publishing failed: quota"));
    }

    #[tokio::test]
    async fn flaky_publisher_eventually_succeeds() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let job = queue
            .add_job(NewJob::new(Platform::Facebook, json!({})).priority(6).max_retries(3))
            .unwrap();

        let outcomes = dispatcher(&queue, Arc::new(MockPublisher::flaky("fb", 1)))
            .run_until_idle()
            .await;

        assert_eq!(outcomes.len(), 2);
        let done = queue.get_job(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Success);
        assert_eq!(done.retries, 1);
        assert_eq!(done.priority, 5);
    }

    #[tokio::test]
    async fn panicking_publisher_is_reported_as_failure() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let job = queue
            .add_job(NewJob::new(Platform::TikTok, json!({})).max_retries(1))
            .unwrap();

        dispatcher(&queue, Arc::new(MockPublisher::panicking("boom")))
            .run_until_idle()
            .await;

        let failed = queue.get_job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("panicked"));
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn slow_publish_times_out() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let job = queue
            .add_job(NewJob::new(Platform::YouTube, json!({})).max_retries(1))
            .unwrap();
        let config = DispatchConfig {
            publish_timeout: Some(Duration::from_millis(20)),
            ..DispatchConfig::default()
        };
        let slow = Arc::new(MockPublisher::with_delay("slow", Duration::from_secs(5)));

        Dispatcher::new(queue.clone(), slow, config).run_until_idle().await;

        let failed = queue.get_job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_flag() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        queue.add_job(NewJob::new(Platform::TikTok, json!({}))).unwrap();
        let config = DispatchConfig {
            poll_interval: Duration::from_millis(10),
            ..DispatchConfig::default()
        };
        let dispatcher = Dispatcher::new(queue.clone(), Arc::new(MockPublisher::success("t")), config);
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let outcomes = dispatcher.run(shutdown).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(queue.stats().success, 1);
    }

    #[tokio::test]
    async fn run_claims_new_jobs_while_a_publish_is_running() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default().with_max_concurrent(3)));
        queue.add_job(NewJob::new(Platform::YouTube, json!({}))).unwrap();
        let config = DispatchConfig {
            poll_interval: Duration::from_millis(10),
            ..DispatchConfig::default()
        };
        let slow = Arc::new(MockPublisher::with_delay("slow", Duration::from_millis(600)));
        let dispatcher = Dispatcher::new(queue.clone(), slow, config);
        let shutdown = Arc::new(AtomicBool::new(false));

        let running = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { dispatcher.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let late = queue.add_job(NewJob::new(Platform::TikTok, json!({}))).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(queue.job_status(&late.id), Some(JobStatus::Processing));
        assert_eq!(queue.in_flight_count(), 2);

        shutdown.store(true, Ordering::SeqCst);
        let outcomes = running.await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(queue.stats().success, 2);
    }
}
