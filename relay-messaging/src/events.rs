use serde::{Deserialize, Serialize};

/// Top-level inbound notification payload.
///
/// Decoding is tolerant: unknown fields are ignored, an absent `events` array
/// decodes as empty. The envelope is owned by whichever component currently
/// processes it and is moved, never shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default)]
    pub mode: Option<String>,
    /// Milliseconds since the epoch, as sent by the platform.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub unsend: Option<UnsendPayload>,
}

/// Webhook event discriminator.
///
/// `Other` absorbs event types this crate does not know about so that an
/// envelope carrying them still decodes; the dispatcher treats them as no-ops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Message,
    Unsend,
    Follow,
    Unfollow,
    Join,
    Leave,
    MemberJoined,
    MemberLeft,
    Postback,
    VideoPlayComplete,
    Beacon,
    AccountLink,
    Things,
    #[default]
    #[serde(other)]
    Other,
}

/// Where the event came from. Exactly one of the three identifiers is the
/// primary one depending on `source_type` ("user", "group", "room").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Inbound message payload. Only `id`, `message_type` and `text` are consumed
/// by the dispatcher; the remaining fields decode tolerantly and pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub emojis: Option<serde_json::Value>,
    #[serde(default)]
    pub content_provider: Option<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub sticker_id: Option<String>,
    #[serde(default)]
    pub sticker_resource_type: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsendPayload {
    #[serde(default)]
    pub message_id: Option<String>,
}
