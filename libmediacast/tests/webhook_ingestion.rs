//! Webhook verification and ingestion through `WebhookManager`

use std::sync::{Arc, Mutex};

use libmediacast::types::WebhookConfig;
use libmediacast::{EngagementEvent, EngagementKind, Platform, WebhookManager};
use serde_json::json;

fn facebook_config(token: &str) -> WebhookConfig {
    WebhookConfig {
        platform: Platform::Facebook,
        webhook_url: "https://example.com/hooks/facebook".to_string(),
        verify_token: token.to_string(),
        is_active: true,
        subscribed_events: vec![],
    }
}

fn record(manager: &WebhookManager, platform: Platform) -> Arc<Mutex<Vec<EngagementEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.on(platform, move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    events
}

#[test]
fn verification_matches_registered_token() {
    let manager = WebhookManager::new();
    manager.register_webhook(facebook_config("right-token"));

    assert!(!manager.verify_webhook(Platform::Facebook, "wrong-token", None));
    assert!(manager.verify_webhook(Platform::Facebook, "right-token", None));
}

#[test]
fn malformed_second_entry_does_not_block_first_and_third() {
    let manager = WebhookManager::new();
    let events = record(&manager, Platform::Facebook);

    let report = manager.process_webhook(
        Platform::Facebook,
        &json!({
            "object": "page",
            "entry": [
                {"id": "p", "time": 1, "messaging": [
                    {"sender": {"id": "one"}, "recipient": {"id": "p"}, "timestamp": 1_700_000_000_000_i64, "message": {"mid": "m1", "text": "first"}}
                ]},
                {"id": "p", "time": 2, "messaging": [
                    {"sender": "not-an-object", "message": {"text": "second"}}
                ]},
                {"id": "p", "time": 3, "messaging": [
                    {"sender": {"id": "three"}, "postback": {"title": "Like"}}
                ]}
            ]
        }),
    );

    assert_eq!(report.emitted, 2);
    assert_eq!(report.skipped, 1);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].user_id, "one");
    assert_eq!(events[0].event_type, EngagementKind::Comment);
    assert_eq!(events[1].user_id, "three");
    assert_eq!(events[1].event_type, EngagementKind::Like);
    assert_ne!(events[0].id, events[1].id);
}

#[test]
fn every_platform_normalizes_to_the_same_shape() {
    let manager = WebhookManager::new();
    let all = Arc::new(Mutex::new(Vec::new()));
    for platform in Platform::ALL {
        let sink = all.clone();
        manager.on(platform, move |event| {
            sink.lock().unwrap().push((event.platform, event.event_type));
            Ok(())
        });
    }

    manager.process_webhook(
        Platform::Instagram,
        &json!({"entry": [{"messaging": [{"sender": {"id": "i"}, "delivery": {}}]}]}),
    );
    manager.process_webhook(
        Platform::TikTok,
        &json!({"events": [{"type": "follow", "video_id": "v", "user_id": "t"}]}),
    );
    manager.process_webhook(
        Platform::YouTube,
        &json!({"feed": {"entry": [{"yt:videoId": "y", "summary": "Sam subscribed to your channel"}]}}),
    );

    assert_eq!(
        *all.lock().unwrap(),
        vec![
            (Platform::Instagram, EngagementKind::View),
            (Platform::TikTok, EngagementKind::Follower),
            (Platform::YouTube, EngagementKind::Follower),
        ]
    );
}

#[test]
fn emit_reaches_listeners_in_registration_order() {
    let manager = WebhookManager::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for n in 0..4 {
        let order = order.clone();
        manager.on(Platform::YouTube, move |_| {
            order.lock().unwrap().push(n);
            Ok(())
        });
    }

    let event = EngagementEvent {
        id: "evt-1".to_string(),
        platform: Platform::YouTube,
        event_type: EngagementKind::View,
        video_id: "v".to_string(),
        user_id: "u".to_string(),
        user_name: "u".to_string(),
        content: None,
        timestamp: chrono::Utc::now(),
        metadata: None,
    };

    assert_eq!(manager.emit(&event), 4);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn listener_can_unsubscribe_itself_during_delivery() {
    let manager = Arc::new(WebhookManager::new());
    let calls = Arc::new(Mutex::new(0));
    let slot: Arc<Mutex<Option<libmediacast::webhooks::listeners::Subscription>>> =
        Arc::new(Mutex::new(None));

    let counter = calls.clone();
    let own = slot.clone();
    let subscription = manager.on(Platform::TikTok, move |_| {
        *counter.lock().unwrap() += 1;
        if let Some(subscription) = own.lock().unwrap().take() {
            subscription.unsubscribe();
        }
        Ok(())
    });
    *slot.lock().unwrap() = Some(subscription);

    let payload = json!({"events": [
        {"type": "like", "video_id": "v", "user_id": "a"},
        {"type": "like", "video_id": "v", "user_id": "b"}
    ]});
    let report = manager.process_webhook(Platform::TikTok, &payload);

    assert_eq!(report.emitted, 2);
    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(manager.stats().listeners, 0);
}

#[test]
fn youtube_atom_entry_with_published_and_updated_is_emitted() {
    let manager = WebhookManager::new();
    let events = record(&manager, Platform::YouTube);

    let report = manager.process_webhook(
        Platform::YouTube,
        &json!({"feed": {"entry": [{
            "yt:videoId": "abc",
            "summary": "Alice liked your video",
            "published": "2024-05-01T12:00:00Z",
            "updated": "2024-05-03T09:00:00Z"
        }]}}),
    );

    assert_eq!(report.emitted, 1);
    assert_eq!(report.skipped, 0);

    let events = events.lock().unwrap();
    assert_eq!(events[0].event_type, EngagementKind::Like);
    assert_eq!(events[0].timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
}
