//! Job lifecycle events for queue observers
//!
//! The queue publishes a [`QueueEvent`] on every state transition through a
//! `tokio::sync::broadcast` channel. Emitting never blocks: with no
//! subscribers the event is dropped, and a lagging subscriber loses the
//! oldest events instead of slowing the queue down.
//!
//! # Example
//!
//! ```no_run
//! use libmediacast::queue::events::{EventBus, QueueEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(QueueEvent::CleanedUp { removed: 0 });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{JobId, Platform};

pub type EventReceiver = broadcast::Receiver<QueueEvent>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// `capacity` is the number of events buffered per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: QueueEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    JobQueued {
        job_id: JobId,
        platform: Platform,
        priority: u8,
    },
    JobStarted {
        job_id: JobId,
        platform: Platform,
    },
    JobSucceeded {
        job_id: JobId,
        platform: Platform,
    },
    /// Failed attempt that went back to the queue
    JobRetrying {
        job_id: JobId,
        retries: u32,
        priority: u8,
        error: String,
    },
    /// Retries exhausted
    JobFailed {
        job_id: JobId,
        retries: u32,
        error: String,
    },
    JobPaused {
        job_id: JobId,
    },
    JobResumed {
        job_id: JobId,
        priority: u8,
    },
    JobDeleted {
        job_id: JobId,
    },
    CleanedUp {
        removed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let job_id = JobId::new();

        bus.emit(QueueEvent::JobStarted {
            job_id,
            platform: Platform::TikTok,
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(
            received,
            QueueEvent::JobStarted {
                job_id,
                platform: Platform::TikTok
            }
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(QueueEvent::CleanedUp { removed: 3 });

        assert_eq!(first.recv().await.unwrap(), QueueEvent::CleanedUp { removed: 3 });
        assert_eq!(second.recv().await.unwrap(), QueueEvent::CleanedUp { removed: 3 });
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(10);
        bus.emit(QueueEvent::CleanedUp { removed: 0 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = QueueEvent::JobPaused { job_id: JobId::new() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_paused");
    }
}
