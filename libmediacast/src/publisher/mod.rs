//! Publishing capability consumed by the dispatch worker
//!
//! The queue never talks to a social platform itself. A [`Publisher`] takes a
//! claimed [`Job`] and performs the actual upload; the worker reports the
//! outcome back to the queue. Real platform clients live outside this crate
//! and plug in through this trait.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libmediacast::publisher::{DryRunPublisher, Publisher, PublisherRegistry};
//! use libmediacast::types::Platform;
//!
//! # async fn example(job: libmediacast::types::Job) {
//! let registry = PublisherRegistry::new()
//!     .with(Platform::TikTok, Arc::new(DryRunPublisher::new("tiktok-dry-run")));
//!
//! match registry.publish(&job).await {
//!     Ok(receipt) => println!("published as {}", receipt.remote_id),
//!     Err(e) => eprintln!("publish failed: {}", e),
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::PlatformError;
use crate::types::{Job, Platform};

// Mock publisher is available for all builds (not just tests) to support integration tests
pub mod mock;

/// What a platform handed back for a successful publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReceipt {
    pub platform: Platform,
    /// Identifier assigned by the remote platform
    pub remote_id: String,
    pub published_at: DateTime<Utc>,
}

impl PublishReceipt {
    pub fn new(platform: Platform, remote_id: impl Into<String>) -> Self {
        Self {
            platform,
            remote_id: remote_id.into(),
            published_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this publisher can handle jobs for `platform`.
    fn supports(&self, _platform: Platform) -> bool {
        true
    }

    /// Publish the job's payload.
    ///
    /// Any error counts as one failed attempt; the queue's retry policy
    /// decides whether the job runs again.
    async fn publish(&self, job: &Job) -> Result<PublishReceipt, PlatformError>;
}

/// Routes each job to the publisher registered for its platform.
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same publisher for every platform it supports.
    pub fn uniform(publisher: Arc<dyn Publisher>) -> Self {
        let publishers = Platform::ALL
            .iter()
            .filter(|p| publisher.supports(**p))
            .map(|p| (*p, publisher.clone()))
            .collect();
        Self { publishers }
    }

    pub fn with(mut self, platform: Platform, publisher: Arc<dyn Publisher>) -> Self {
        self.register(platform, publisher);
        self
    }

    pub fn register(&mut self, platform: Platform, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(platform, publisher);
    }

    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn Publisher>> {
        self.publishers.get(&platform)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.publishers.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

#[async_trait]
impl Publisher for PublisherRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    fn supports(&self, platform: Platform) -> bool {
        self.publishers.contains_key(&platform)
    }

    async fn publish(&self, job: &Job) -> Result<PublishReceipt, PlatformError> {
        match self.publishers.get(&job.platform) {
            Some(publisher) => publisher.publish(job).await,
            None => Err(PlatformError::Unsupported(job.platform)),
        }
    }
}

/// Logs the job instead of publishing it. Always succeeds.
#[derive(Debug, Clone)]
pub struct DryRunPublisher {
    name: String,
}

impl DryRunPublisher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for DryRunPublisher {
    fn default() -> Self {
        Self::new("dry-run")
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, job: &Job) -> Result<PublishReceipt, PlatformError> {
        info!(
            publisher = %self.name,
            job_id = %job.id,
            platform = %job.platform,
            payload = %job.payload,
            "dry run: skipping upload"
        );
        Ok(PublishReceipt::new(job.platform, format!("dry-run:{}", job.id)))
    }
}
