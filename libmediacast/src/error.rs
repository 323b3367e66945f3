//! Error types for Mediacast

use thiserror::Error;

use crate::types::{JobId, JobStatus, Platform};

pub type Result<T> = std::result::Result<T, MediacastError>;

#[derive(Error, Debug)]
pub enum MediacastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MediacastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MediacastError::InvalidInput(_) => 3,
            MediacastError::Queue(QueueError::InvalidPriority(_)) => 3,
            MediacastError::Config(_) => 2,
            MediacastError::Queue(_) => 1,
            MediacastError::Webhook(_) => 1,
            MediacastError::Platform(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Errors returned by queue operations that reference a job.
///
/// Routine absence is `NotFound`; an empty or saturated queue is never an
/// error (`acquire_next` returns `None`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is already {status}")]
    Terminal { id: JobId, status: JobStatus },

    #[error("priority {0} is outside 1..=10")]
    InvalidPriority(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed {platform} webhook payload: {reason}")]
    Malformed { platform: Platform, reason: String },

    #[error("webhook verification failed for {platform}")]
    VerificationFailed { platform: Platform },
}

impl WebhookError {
    pub fn malformed(platform: Platform, reason: impl Into<String>) -> Self {
        WebhookError::Malformed {
            platform,
            reason: reason.into(),
        }
    }
}

/// Errors reported by a [`Publisher`](crate::publisher::Publisher).
///
/// Every variant is treated as a transient failure by the queue; the retry
/// policy alone decides when a job is exhausted.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Publish timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("No publisher registered for {0}")]
    Unsupported(Platform),
}
