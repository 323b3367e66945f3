//! Per-platform mapping from decoded webhook entries to [`EngagementEvent`]s.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::types::{EngagementEvent, EngagementKind, Platform};

use super::payload::{MetaMessaging, TikTokEvent, WebhookPayload, YouTubeEntry};

const UNKNOWN: &str = "unknown";

/// Turn every decoded entry into an event; undecodable entries pass through
/// as errors so the caller can log and skip them.
pub fn normalize(payload: WebhookPayload) -> Vec<Result<EngagementEvent, WebhookError>> {
    match payload {
        WebhookPayload::Meta { platform, items } => items
            .into_iter()
            .map(|item| item.map(|m| meta_event(platform, m)))
            .collect(),
        WebhookPayload::TikTok { items } => items
            .into_iter()
            .map(|item| item.map(tiktok_event))
            .collect(),
        WebhookPayload::YouTube { items } => items
            .into_iter()
            .map(|item| item.map(youtube_event))
            .collect(),
    }
}

pub fn classify_meta(messaging: &MetaMessaging) -> EngagementKind {
    if messaging.message.is_some() {
        EngagementKind::Comment
    } else if messaging.postback.is_some() || messaging.reaction.is_some() {
        EngagementKind::Like
    } else if messaging.delivery.is_some() {
        EngagementKind::View
    } else {
        EngagementKind::Message
    }
}

pub fn classify_tiktok(kind: Option<&str>) -> EngagementKind {
    match kind {
        Some("like") => EngagementKind::Like,
        Some("comment") => EngagementKind::Comment,
        Some("share") => EngagementKind::Share,
        Some("follow") => EngagementKind::Follower,
        _ => EngagementKind::View,
    }
}

/// Best-effort text match on YouTube's human-readable summary.
pub fn classify_youtube(summary: Option<&str>) -> EngagementKind {
    let summary = summary.unwrap_or_default().to_lowercase();
    if summary.contains("liked") {
        EngagementKind::Like
    } else if summary.contains("commented") {
        EngagementKind::Comment
    } else if summary.contains("shared") {
        EngagementKind::Share
    } else if summary.contains("subscribed") {
        EngagementKind::Follower
    } else {
        EngagementKind::View
    }
}

fn event_id() -> String {
    Uuid::new_v4().to_string()
}

fn meta_event(platform: Platform, messaging: MetaMessaging) -> EngagementEvent {
    let event_type = classify_meta(&messaging);
    let timestamp = messaging
        .timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let video_id = messaging
        .recipient
        .as_ref()
        .map(|r| r.id.clone())
        .or_else(|| messaging.page_id.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let user_name = messaging
        .sender
        .name
        .clone()
        .unwrap_or_else(|| messaging.sender.id.clone());

    let (mid, content) = match messaging.message {
        Some(message) => (message.mid, message.text),
        None => (None, None),
    };

    EngagementEvent {
        id: event_id(),
        platform,
        event_type,
        video_id,
        user_id: messaging.sender.id,
        user_name,
        content,
        timestamp,
        metadata: Some(json!({
            "page_id": messaging.page_id,
            "mid": mid,
            "postback": messaging.postback,
            "reaction": messaging.reaction,
        })),
    }
}

fn tiktok_event(event: TikTokEvent) -> EngagementEvent {
    let timestamp = event
        .timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    EngagementEvent {
        id: event_id(),
        platform: Platform::TikTok,
        event_type: classify_tiktok(event.kind.as_deref()),
        video_id: event.video_id,
        user_name: event.user_name.unwrap_or_else(|| event.user_id.clone()),
        user_id: event.user_id,
        content: event.content,
        timestamp,
        metadata: Some(json!({ "type": event.kind })),
    }
}

fn youtube_event(entry: YouTubeEntry) -> EngagementEvent {
    let event_type = classify_youtube(entry.summary.as_deref());
    let timestamp = entry.occurred_at().unwrap_or_else(Utc::now);
    let (user_name, author_uri) = match entry.author {
        Some(author) => (author.name, author.uri),
        None => (None, None),
    };

    let user_id = author_uri
        .or_else(|| entry.channel_id.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    EngagementEvent {
        id: event_id(),
        platform: Platform::YouTube,
        event_type,
        video_id: entry.video_id,
        user_name: user_name.unwrap_or_else(|| user_id.clone()),
        user_id,
        content: entry.summary,
        timestamp,
        metadata: Some(json!({
            "title": entry.title,
            "channel_id": entry.channel_id,
        })),
    }
}
