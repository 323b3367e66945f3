//! Mock publisher for testing
//!
//! A configurable [`Publisher`] that can succeed, fail, fail a fixed number
//! of times before succeeding, stall, or panic. Call counts and the ids of
//! published jobs are recorded so tests can assert on what the worker did.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::publisher::{PublishReceipt, Publisher};
use crate::types::{Job, JobId};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Number of leading calls that fail before calls start succeeding
    pub failures_before_success: usize,

    /// Fail every call regardless of `failures_before_success`
    pub always_fail: bool,

    /// Error message for failed calls
    pub error: String,

    /// Simulated network latency
    pub delay: Duration,

    /// Panic inside `publish` instead of returning
    pub panics: bool,

    pub call_count: Arc<Mutex<usize>>,

    /// Jobs published successfully, in completion order
    pub published: Arc<Mutex<Vec<JobId>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            failures_before_success: 0,
            always_fail: false,
            error: "Mock publish failed".to_string(),
            delay: Duration::from_millis(0),
            panics: false,
            call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            always_fail: true,
            error: error.to_string(),
            ..Default::default()
        })
    }

    /// Fails the first `failures` calls, then succeeds.
    pub fn flaky(name: &str, failures: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            failures_before_success: failures,
            error: "transient failure".to_string(),
            ..Default::default()
        })
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn panicking(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            panics: true,
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        *self.config.call_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn published(&self) -> Vec<JobId> {
        self.config
            .published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn publish(&self, job: &Job) -> Result<PublishReceipt, PlatformError> {
        let call = {
            let mut count = self.config.call_count.lock().unwrap_or_else(|e| e.into_inner());
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panics {
            panic!("{}: simulated publisher panic", self.config.name);
        }

        if self.config.always_fail || call <= self.config.failures_before_success {
            return Err(PlatformError::Publish(self.config.error.clone()));
        }

        self.config
            .published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.id);

        Ok(PublishReceipt::new(
            job.platform,
            format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::JobStore;
    use crate::types::{NewJob, Platform};
    use chrono::Utc;

    fn job() -> Job {
        JobStore::new().create(
            NewJob::new(Platform::TikTok, serde_json::json!({"video": "a.mp4"})),
            5,
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_mock_success() {
        let publisher = MockPublisher::success("test");
        let job = job();

        let receipt = publisher.publish(&job).await.unwrap();

        assert!(receipt.remote_id.starts_with("test:mock-"));
        assert_eq!(publisher.call_count(), 1);
        assert_eq!(publisher.published(), vec![job.id]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let publisher = MockPublisher::failure("test", "quota exceeded");

        let result = publisher.publish(&job()).await;

        match result {
            Err(PlatformError::Publish(msg)) => assert_eq!(msg, "quota exceeded"),
            other => panic!("expected publish error, got {:?}", other),
        }
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_flaky_recovers() {
        let publisher = MockPublisher::flaky("test", 2);
        let job = job();

        assert!(publisher.publish(&job).await.is_err());
        assert!(publisher.publish(&job).await.is_err());
        assert!(publisher.publish(&job).await.is_ok());
        assert_eq!(publisher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_delay() {
        let publisher = MockPublisher::with_delay("test", Duration::from_millis(50));

        let start = std::time::Instant::now();
        publisher.publish(&job()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
