//! Mediacast - publishing queue and engagement webhooks for social media
//!
//! This library provides an in-process priority queue for publishing
//! generated media to social platforms, with bounded concurrency and
//! retry-with-decay, plus normalization of inbound platform webhooks into
//! a uniform engagement event stream.

pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod queue;
pub mod types;
pub mod webhooks;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{MediacastError, Result};
pub use publisher::{PublishReceipt, Publisher, PublisherRegistry};
pub use queue::JobQueue;
pub use types::{
    EngagementEvent, EngagementKind, Job, JobId, JobStatus, NewJob, Platform, WebhookConfig,
};
pub use webhooks::WebhookManager;
pub use worker::Dispatcher;
