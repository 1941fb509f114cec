use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{ChangeFilter, PresenceMeta};
use crate::models::{Author, MessageContent};

/// Cap on how many recent messages a room loads.
pub const HISTORY_LIMIT: u32 = 50;

// -- Places --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlace {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Uuid,
    pub is_temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivityUpdate {
    pub activity_level: u8,
    pub last_activity: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub place_id: Uuid,
    pub author: Author,
    pub content: MessageContent,
}

// -- Reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
}

/// Reactions on one message folded per emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

// -- Profiles --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpsert {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

// -- Files --

/// A file to put in public storage under `path`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Publicly resolvable reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub public_url: String,
}

// -- Realtime --

/// What a realtime channel listens to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub topic: String,
    pub changes: Vec<ChangeFilter>,
    /// Join the topic's presence room. `Some` also tracks the caller as a member.
    pub presence: Option<PresenceJoin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PresenceJoin {
    /// Observe snapshots without being counted
    Observe,
    /// Observe and be counted as this member
    Track(PresenceMeta),
}

impl ChannelSpec {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            changes: Vec::new(),
            presence: None,
        }
    }

    pub fn listen(mut self, filter: ChangeFilter) -> Self {
        self.changes.push(filter);
        self
    }

    pub fn observe_presence(mut self) -> Self {
        self.presence = Some(PresenceJoin::Observe);
        self
    }

    pub fn track_presence(mut self, meta: PresenceMeta) -> Self {
        self.presence = Some(PresenceJoin::Track(meta));
        self
    }
}
