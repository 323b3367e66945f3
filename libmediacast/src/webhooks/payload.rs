//! Validated shapes of inbound webhook payloads.
//!
//! Parsing happens in two stages. The envelope (the part that locates the
//! entries) must be well formed or the whole payload is rejected. Each
//! entry is then decoded on its own, so one malformed entry yields one
//! `Err` item while its siblings still decode.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WebhookError;
use crate::types::Platform;

/// One decoded entry, or the reason it could not be decoded.
pub type Item<T> = Result<T, WebhookError>;

#[derive(Debug, Clone)]
pub enum WebhookPayload {
    /// Facebook and Instagram share the Graph API `entry[].messaging[]` envelope.
    Meta {
        platform: Platform,
        items: Vec<Item<MetaMessaging>>,
    },
    TikTok {
        items: Vec<Item<TikTokEvent>>,
    },
    YouTube {
        items: Vec<Item<YouTubeEntry>>,
    },
}

impl WebhookPayload {
    pub fn parse(platform: Platform, raw: &Value) -> Result<Self, WebhookError> {
        match platform {
            Platform::Facebook | Platform::Instagram => parse_meta(platform, raw),
            Platform::TikTok => parse_tiktok(raw),
            Platform::YouTube => parse_youtube(raw),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            WebhookPayload::Meta { platform, .. } => *platform,
            WebhookPayload::TikTok { .. } => Platform::TikTok,
            WebhookPayload::YouTube { .. } => Platform::YouTube,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WebhookPayload::Meta { items, .. } => items.len(),
            WebhookPayload::TikTok { items } => items.len(),
            WebhookPayload::YouTube { items } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaParty {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// One item of `entry[].messaging[]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaMessaging {
    pub sender: MetaParty,
    #[serde(default)]
    pub recipient: Option<MetaParty>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<MetaMessage>,
    #[serde(default)]
    pub postback: Option<Value>,
    #[serde(default)]
    pub reaction: Option<Value>,
    #[serde(default)]
    pub delivery: Option<Value>,
    /// Id of the enclosing `entry` (the page or account)
    #[serde(skip)]
    pub page_id: Option<String>,
}

/// One item of TikTok's flat `events[]` array.
///
/// TikTok has shipped both snake_case and camelCase field names, sometimes
/// in the same event. The first spelling present wins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTikTokEvent")]
pub struct TikTokEvent {
    pub kind: Option<String>,
    pub video_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: Option<String>,
    /// Seconds since the epoch
    pub timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct RawTikTokEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default, rename = "videoId")]
    video_id_camel: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default, rename = "userId")]
    user_id_camel: Option<String>,
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default, rename = "userName")]
    user_name_camel: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    create_time: Option<i64>,
}

impl TryFrom<RawTikTokEvent> for TikTokEvent {
    type Error = String;

    fn try_from(raw: RawTikTokEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: raw.kind,
            video_id: raw
                .video_id
                .or(raw.video_id_camel)
                .ok_or("missing field `video_id`")?,
            user_id: raw
                .user_id
                .or(raw.user_id_camel)
                .or(raw.open_id)
                .ok_or("missing field `user_id`")?,
            user_name: raw
                .user_name
                .or(raw.user_name_camel)
                .or(raw.username)
                .or(raw.display_name),
            content: raw.content.or(raw.text).or(raw.comment),
            timestamp: raw.timestamp.or(raw.create_time),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YouTubeAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// One item of the `feed.entry` list.
///
/// Atom entries carry both `published` and `updated`; the two are kept
/// apart and [`YouTubeEntry::occurred_at`] prefers `published`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawYouTubeEntry")]
pub struct YouTubeEntry {
    pub video_id: String,
    pub channel_id: Option<String>,
    pub author: Option<YouTubeAuthor>,
    pub title: Option<String>,
    /// Free-text description of the activity ("Alice liked your video")
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl YouTubeEntry {
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }
}

#[derive(Deserialize)]
struct RawYouTubeEntry {
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default, rename = "yt:videoId")]
    video_id_atom: Option<String>,
    #[serde(default, rename = "videoId")]
    video_id_camel: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default, rename = "yt:channelId")]
    channel_id_atom: Option<String>,
    #[serde(default, rename = "channelId")]
    channel_id_camel: Option<String>,
    #[serde(default)]
    author: Option<YouTubeAuthor>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published: Option<DateTime<Utc>>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

impl TryFrom<RawYouTubeEntry> for YouTubeEntry {
    type Error = String;

    fn try_from(raw: RawYouTubeEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            video_id: raw
                .video_id_atom
                .or(raw.video_id)
                .or(raw.video_id_camel)
                .ok_or("missing field `yt:videoId`")?,
            channel_id: raw
                .channel_id_atom
                .or(raw.channel_id)
                .or(raw.channel_id_camel),
            author: raw.author,
            title: raw.title,
            summary: raw.summary,
            published: raw.published,
            updated: raw.updated,
        })
    }
}

fn decode<T: DeserializeOwned>(platform: Platform, index: usize, value: &Value) -> Item<T> {
    T::deserialize(value)
        .map_err(|e| WebhookError::malformed(platform, format!("entry {}: {}", index, e)))
}

fn array_field<'a>(
    platform: Platform,
    value: &'a Value,
    field: &str,
) -> Result<&'a Vec<Value>, WebhookError> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| WebhookError::malformed(platform, format!("missing '{}' array", field)))
}

fn parse_meta(platform: Platform, raw: &Value) -> Result<WebhookPayload, WebhookError> {
    let entries = array_field(platform, raw, "entry")?;

    let mut items = Vec::new();
    for (entry_index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            items.push(Err(WebhookError::malformed(
                platform,
                format!("entry {} is not an object", entry_index),
            )));
            continue;
        };

        let page_id = entry.get("id").and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        // Entries without messaging (feed `changes`, for instance) carry no events
        let Some(messaging) = entry.get("messaging").and_then(Value::as_array) else {
            continue;
        };

        for message in messaging {
            let index = items.len();
            items.push(
                decode::<MetaMessaging>(platform, index, message).map(|mut m| {
                    m.page_id = page_id.clone();
                    m
                }),
            );
        }
    }

    Ok(WebhookPayload::Meta { platform, items })
}

fn parse_tiktok(raw: &Value) -> Result<WebhookPayload, WebhookError> {
    let events = array_field(Platform::TikTok, raw, "events")?;
    let items = events
        .iter()
        .enumerate()
        .map(|(index, event)| decode(Platform::TikTok, index, event))
        .collect();
    Ok(WebhookPayload::TikTok { items })
}

fn parse_youtube(raw: &Value) -> Result<WebhookPayload, WebhookError> {
    let feed = raw
        .get("feed")
        .ok_or_else(|| WebhookError::malformed(Platform::YouTube, "missing 'feed'"))?;

    // A feed with a single entry arrives as an object rather than a list
    let entries: Vec<&Value> = match feed.get("entry") {
        Some(Value::Array(entries)) => entries.iter().collect(),
        Some(entry @ Value::Object(_)) => vec![entry],
        None => Vec::new(),
        Some(_) => {
            return Err(WebhookError::malformed(
                Platform::YouTube,
                "'feed.entry' is neither a list nor an object",
            ))
        }
    };

    let items = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| decode(Platform::YouTube, index, entry))
        .collect();
    Ok(WebhookPayload::YouTube { items })
}
