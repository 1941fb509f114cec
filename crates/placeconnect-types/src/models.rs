use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound of a place's activity counter.
pub const MAX_ACTIVITY: u8 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: Uuid,
    pub name: String,
    /// Category tag, e.g. `cafe`, `basketball_court` or `custom`.
    #[serde(rename = "type")]
    pub kind: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub activity_level: u8,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_temporary: bool,
    /// Only meaningful while `is_temporary` is set.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Who wrote a message. Guests only have the display name they picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Author {
    User { id: Uuid, display_name: String },
    Guest { display_name: String },
}

impl Author {
    pub fn display_name(&self) -> &str {
        match self {
            Self::User { display_name, .. } | Self::Guest { display_name } => display_name,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::Guest { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Media(MediaRef),
    /// Tombstone left behind when the author retracts a message.
    Retracted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub mime_type: String,
}

impl MediaRef {
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub place_id: Uuid,
    pub author: Author,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_retracted(&self) -> bool {
        matches!(self.content, MessageContent::Retracted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    /// The (message, author, emoji) triple a reaction is unique on.
    pub fn matches(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> bool {
        self.message_id == message_id && self.user_id == user_id && self.emoji == emoji
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    /// True if this row links `a` and `b`, in either direction.
    pub fn connects(&self, a: Uuid, b: Uuid) -> bool {
        (self.requester_id == a && self.addressee_id == b)
            || (self.requester_id == b && self.addressee_id == a)
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id || self.addressee_id == user_id
    }

    pub fn other_party(&self, user_id: Uuid) -> Option<Uuid> {
        if self.requester_id == user_id {
            Some(self.addressee_id)
        } else if self.addressee_id == user_id {
            Some(self.requester_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("Anonymous")
    }
}

/// The identity the local user acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    User { id: Uuid, display_name: String },
    Guest { display_name: String },
}

impl Identity {
    pub fn display_name(&self) -> &str {
        match self {
            Self::User { display_name, .. } | Self::Guest { display_name } => display_name,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::Guest { .. } => None,
        }
    }

    /// Key used to deduplicate this identity in presence rooms.
    pub fn presence_key(&self) -> String {
        match self {
            Self::User { id, .. } => format!("user:{id}"),
            Self::Guest { display_name } => format!("guest:{display_name}"),
        }
    }

    pub fn as_author(&self) -> Author {
        match self {
            Self::User { id, display_name } => Author::User {
                id: *id,
                display_name: display_name.clone(),
            },
            Self::Guest { display_name } => Author::Guest {
                display_name: display_name.clone(),
            },
        }
    }
}

/// Authenticated user as handed over by the hosted auth service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}
