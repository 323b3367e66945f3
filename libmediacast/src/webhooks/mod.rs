//! Webhook verification and engagement ingestion
//!
//! `WebhookManager` keeps one [`WebhookConfig`] per platform, answers the
//! subscription handshake, and turns raw platform payloads into
//! [`EngagementEvent`]s delivered to listeners registered with
//! [`WebhookManager::on`].
//!
//! Each entry of a payload is handled on its own: a malformed entry is logged
//! and skipped while the rest of the batch is still delivered. Listeners run
//! synchronously in registration order, outside the registry lock, so a
//! listener may itself subscribe or unsubscribe.
//!
//! # Example
//!
//! ```
//! use libmediacast::types::Platform;
//! use libmediacast::webhooks::WebhookManager;
//!
//! let manager = WebhookManager::new();
//! let subscription = manager.on(Platform::TikTok, |event| {
//!     println!("{} from {}", event.event_type, event.user_name);
//!     Ok(())
//! });
//!
//! let report = manager.process_webhook(
//!     Platform::TikTok,
//!     &serde_json::json!({"events": [{"type": "like", "video_id": "v1", "user_id": "u1"}]}),
//! );
//! assert_eq!(report.emitted, 1);
//!
//! subscription.unsubscribe();
//! ```

pub mod listeners;
pub mod normalize;
pub mod payload;

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{EngagementEvent, Platform, WebhookConfig};

use self::listeners::{lock, Listener, SharedRegistry, Subscription};
use self::payload::WebhookPayload;

/// Outcome of one [`WebhookManager::process_webhook`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub emitted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookStats {
    pub registered: usize,
    pub active: usize,
    pub listeners: usize,
    pub listeners_by_platform: BTreeMap<Platform, usize>,
    pub events_emitted: u64,
    pub entries_skipped: u64,
    pub listener_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_emitted: AtomicU64,
    entries_skipped: AtomicU64,
    listener_failures: AtomicU64,
}

#[derive(Debug, Default)]
pub struct WebhookManager {
    configs: RwLock<HashMap<Platform, WebhookConfig>>,
    listeners: SharedRegistry,
    counters: Counters,
}

impl WebhookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = WebhookConfig>) -> Self {
        let manager = Self::new();
        for config in configs {
            manager.register_webhook(config);
        }
        manager
    }

    /// Store `config` for its platform, returning the config it replaced.
    pub fn register_webhook(&self, config: WebhookConfig) -> Option<WebhookConfig> {
        info!(
            platform = %config.platform,
            url = %config.webhook_url,
            active = config.is_active,
            "webhook registered"
        );
        self.configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(config.platform, config)
    }

    pub fn unregister_webhook(&self, platform: Platform) -> bool {
        let removed = self
            .configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&platform)
            .is_some();
        if removed {
            info!(platform = %platform, "webhook unregistered");
        }
        removed
    }

    pub fn webhook_config(&self, platform: Platform) -> Option<WebhookConfig> {
        self.configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&platform)
            .cloned()
    }

    /// Check a subscription handshake.
    ///
    /// True only when `platform` has a registered config whose verify token
    /// equals `token` exactly. The challenge is accepted for symmetry with
    /// the platform's request but does not affect the result.
    pub fn verify_webhook(&self, platform: Platform, token: &str, challenge: Option<&str>) -> bool {
        let verified = self
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&platform)
            .is_some_and(|config| config.verify_token == token);

        if verified {
            debug!(platform = %platform, challenge = ?challenge, "webhook verified");
        } else {
            warn!(platform = %platform, "webhook verification failed");
        }
        verified
    }

    /// Challenge string to echo back when the handshake succeeds.
    pub fn verify_challenge(
        &self,
        platform: Platform,
        token: &str,
        challenge: &str,
    ) -> Option<String> {
        self.verify_webhook(platform, token, Some(challenge))
            .then(|| challenge.to_string())
    }

    /// Normalize a raw payload and emit one event per well-formed entry.
    pub fn process_webhook(&self, platform: Platform, raw: &Value) -> IngestReport {
        let payload = match WebhookPayload::parse(platform, raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(platform = %platform, error = %e, "dropping malformed webhook payload");
                self.counters.entries_skipped.fetch_add(1, Ordering::Relaxed);
                return IngestReport {
                    emitted: 0,
                    skipped: 1,
                };
            }
        };

        let mut report = IngestReport::default();
        for result in normalize::normalize(payload) {
            match result {
                Ok(event) => {
                    self.emit(&event);
                    report.emitted += 1;
                }
                Err(e) => {
                    warn!(platform = %platform, error = %e, "skipping malformed webhook entry");
                    report.skipped += 1;
                }
            }
        }

        self.counters
            .entries_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        debug!(
            platform = %platform,
            emitted = report.emitted,
            skipped = report.skipped,
            "webhook processed"
        );
        report
    }

    /// Deliver `event` to every listener of its platform in registration
    /// order. Returns how many listeners handled it without failing.
    pub fn emit(&self, event: &EngagementEvent) -> usize {
        let listeners = lock(&self.listeners).snapshot(event.platform);
        self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(platform = %event.platform, event_id = %event.id, error = %e, "listener failed");
                    self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    warn!(platform = %event.platform, event_id = %event.id, "listener panicked");
                    self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        delivered
    }

    pub fn on<F>(&self, platform: Platform, callback: F) -> Subscription
    where
        F: Fn(&EngagementEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        let id = lock(&self.listeners).add(platform, listener);
        debug!(platform = %platform, subscription = id, "listener added");
        Subscription::new(&self.listeners, platform, id)
    }

    pub fn stats(&self) -> WebhookStats {
        let (registered, active) = {
            let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
            (
                configs.len(),
                configs.values().filter(|c| c.is_active).count(),
            )
        };

        let (listeners, listeners_by_platform) = {
            let registry = lock(&self.listeners);
            let by_platform = Platform::ALL
                .iter()
                .map(|p| (*p, registry.count(*p)))
                .filter(|(_, count)| *count > 0)
                .collect();
            (registry.total(), by_platform)
        };

        WebhookStats {
            registered,
            active,
            listeners,
            listeners_by_platform,
            events_emitted: self.counters.events_emitted.load(Ordering::Relaxed),
            entries_skipped: self.counters.entries_skipped.load(Ordering::Relaxed),
            listener_failures: self.counters.listener_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngagementKind;
    use serde_json::json;
    use std::sync::Mutex;

    fn config(platform: Platform, token: &str) -> WebhookConfig {
        WebhookConfig {
            platform,
            webhook_url: format!("https://example.com/hooks/{}", platform),
            verify_token: token.to_string(),
            is_active: true,
            subscribed_events: vec!["comment".to_string()],
        }
    }

    fn collector(manager: &WebhookManager, platform: Platform) -> Arc<Mutex<Vec<EngagementEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on(platform, move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn verify_requires_matching_token() {
        let manager = WebhookManager::new();
        manager.register_webhook(config(Platform::Facebook, "secret"));

        assert!(manager.verify_webhook(Platform::Facebook, "secret", Some("c")));
        assert!(!manager.verify_webhook(Platform::Facebook, "wrong", Some("c")));
        assert!(!manager.verify_webhook(Platform::TikTok, "secret", None));
    }

    #[test]
    fn verify_challenge_echoes_on_success() {
        let manager = WebhookManager::from_configs([config(Platform::YouTube, "t")]);

        assert_eq!(
            manager.verify_challenge(Platform::YouTube, "t", "1234"),
            Some("1234".to_string())
        );
        assert_eq!(manager.verify_challenge(Platform::YouTube, "x", "1234"), None);
    }

    #[test]
    fn register_overwrites_and_unregister_removes() {
        let manager = WebhookManager::new();
        assert!(manager.register_webhook(config(Platform::TikTok, "a")).is_none());
        let previous = manager.register_webhook(config(Platform::TikTok, "b")).unwrap();
        assert_eq!(previous.verify_token, "a");
        assert_eq!(manager.webhook_config(Platform::TikTok).unwrap().verify_token, "b");

        assert!(manager.unregister_webhook(Platform::TikTok));
        assert!(!manager.unregister_webhook(Platform::TikTok));
        assert!(!manager.verify_webhook(Platform::TikTok, "b", None));
    }

    #[test]
    fn malformed_entry_is_skipped_rest_delivered() {
        let manager = WebhookManager::new();
        let seen = collector(&manager, Platform::Facebook);

        let report = manager.process_webhook(
            Platform::Facebook,
            &json!({"object": "page", "entry": [{"id": "p", "messaging": [
                {"sender": {"id": "a"}, "message": {"text": "first"}},
                {"message": {"text": "no sender"}},
                {"sender": {"id": "c"}, "message": {"text": "third"}}
            ]}]}),
        );

        assert_eq!(report, IngestReport { emitted: 2, skipped: 1 });
        let seen = seen.lock().unwrap();
        let contents: Vec<_> = seen.iter().map(|e| e.content.as_deref()).collect();
        assert_eq!(contents, vec![Some("first"), Some("third")]);
    }

    #[test]
    fn malformed_envelope_counts_one_skip() {
        let manager = WebhookManager::new();
        let report = manager.process_webhook(Platform::TikTok, &json!({"data": []}));
        assert_eq!(report, IngestReport { emitted: 0, skipped: 1 });
        assert_eq!(manager.stats().entries_skipped, 1);
    }

    #[test]
    fn listeners_only_see_their_platform() {
        let manager = WebhookManager::new();
        let tiktok = collector(&manager, Platform::TikTok);
        let youtube = collector(&manager, Platform::YouTube);

        manager.process_webhook(
            Platform::TikTok,
            &json!({"events": [{"type": "share", "video_id": "v", "user_id": "u"}]}),
        );

        assert_eq!(tiktok.lock().unwrap().len(), 1);
        assert_eq!(tiktok.lock().unwrap()[0].event_type, EngagementKind::Share);
        assert!(youtube.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let manager = WebhookManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        manager.on(Platform::TikTok, move |_| {
            o.lock().unwrap().push("first");
            anyhow::bail!("listener error")
        });
        manager.on(Platform::TikTok, |_| panic!("listener panic"));
        let o = order.clone();
        manager.on(Platform::TikTok, move |_| {
            o.lock().unwrap().push("third");
            Ok(())
        });

        let report = manager.process_webhook(
            Platform::TikTok,
            &json!({"events": [{"type": "like", "video_id": "v", "user_id": "u"}]}),
        );

        assert_eq!(report.emitted, 1);
        assert_eq!(*order.lock().unwrap(), vec!["first", "third"]);
        assert_eq!(manager.stats().listener_failures, 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let manager = WebhookManager::new();
        let kept = collector(&manager, Platform::YouTube);
        let dropped = Arc::new(Mutex::new(0));
        let d = dropped.clone();
        let subscription = manager.on(Platform::YouTube, move |_| {
            *d.lock().unwrap() += 1;
            Ok(())
        });

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());

        manager.process_webhook(
            Platform::YouTube,
            &json!({"feed": {"entry": [{"videoId": "v", "summary": "x liked"}]}}),
        );

        assert_eq!(kept.lock().unwrap().len(), 1);
        assert_eq!(*dropped.lock().unwrap(), 0);
    }

    #[test]
    fn listener_may_subscribe_reentrantly() {
        let manager = Arc::new(WebhookManager::new());
        let inner = Arc::downgrade(&manager);
        manager.on(Platform::Instagram, move |_| {
            if let Some(manager) = inner.upgrade() {
                manager.on(Platform::Instagram, |_| Ok(()));
            }
            Ok(())
        });

        let event_payload = json!({"entry": [{"messaging": [{"sender": {"id": "a"}}]}]});
        manager.process_webhook(Platform::Instagram, &event_payload);

        assert_eq!(manager.stats().listeners, 2);
    }

    #[test]
    fn stats_reflect_configs_and_listeners() {
        let manager = WebhookManager::new();
        manager.register_webhook(config(Platform::Facebook, "a"));
        let mut inactive = config(Platform::TikTok, "b");
        inactive.is_active = false;
        manager.register_webhook(inactive);
        manager.on(Platform::Facebook, |_| Ok(()));
        manager.on(Platform::Facebook, |_| Ok(()));

        let stats = manager.stats();
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.listeners, 2);
        assert_eq!(stats.listeners_by_platform.get(&Platform::Facebook), Some(&2));
        assert_eq!(stats.listeners_by_platform.get(&Platform::TikTok), None);
    }
}
