use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Friendship, Message, Place, Profile, Reaction};

/// Events delivered on a realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// A row changed in a table the channel listens to
    Change(ChangeEvent),

    /// Full membership of the channel's presence room
    PresenceSync(PresenceSnapshot),
}

/// A single row change. Deletes only carry the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "record", rename_all = "snake_case")]
pub enum Change<T> {
    Insert(T),
    Update(T),
    Delete { id: Uuid },
}

impl<T> Change<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update(_) => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }

    pub fn record(&self) -> Option<&T> {
        match self {
            Self::Insert(r) | Self::Update(r) => Some(r),
            Self::Delete { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "change", rename_all = "snake_case")]
pub enum ChangeEvent {
    Places(Change<Place>),
    Messages(Change<Message>),
    Reactions(Change<Reaction>),
    Friendships(Change<Friendship>),
    Profiles(Change<Profile>),
}

impl ChangeEvent {
    pub fn table(&self) -> Table {
        match self {
            Self::Places(_) => Table::Places,
            Self::Messages(_) => Table::Messages,
            Self::Reactions(_) => Table::Reactions,
            Self::Friendships(_) => Table::Friendships,
            Self::Profiles(_) => Table::Profiles,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Places(c) => c.kind(),
            Self::Messages(c) => c.kind(),
            Self::Reactions(c) => c.kind(),
            Self::Friendships(c) => c.kind(),
            Self::Profiles(c) => c.kind(),
        }
    }

    /// Whether a channel listening with `filter` should see this change.
    ///
    /// Deletes only carry an id, so row filters cannot be evaluated on them and
    /// every listener on the table receives them.
    pub fn matches(&self, filter: &ChangeFilter) -> bool {
        if self.table() != filter.table {
            return false;
        }
        let Some(row_filter) = filter.row else {
            return true;
        };
        match (self, row_filter) {
            (Self::Messages(c), RowFilter::PlaceId(place_id)) => {
                c.record().is_none_or(|m| m.place_id == place_id)
            }
            (Self::Places(c), RowFilter::Id(id)) => c.record().is_none_or(|p| p.id == id),
            (Self::Profiles(c), RowFilter::Id(id)) => c.record().is_none_or(|p| p.id == id),
            (Self::Friendships(c), RowFilter::AddresseeId(id)) => {
                c.record().is_none_or(|f| f.addressee_id == id)
            }
            (Self::Friendships(c), RowFilter::Party(id)) => {
                c.record().is_none_or(|f| f.involves(id))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Places,
    Messages,
    Reactions,
    Friendships,
    Profiles,
}

/// Table-scoped subscription with an optional row predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub table: Table,
    #[serde(default)]
    pub row: Option<RowFilter>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self { table, row: None }
    }

    pub fn with_row(table: Table, row: RowFilter) -> Self {
        Self {
            table,
            row: Some(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "column", content = "eq", rename_all = "snake_case")]
pub enum RowFilter {
    Id(Uuid),
    PlaceId(Uuid),
    AddresseeId(Uuid),
    /// Matches friendships where the id is requester or addressee
    Party(Uuid),
}

/// What a client publishes about itself when it tracks presence in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// Identity key; the same identity on two connections counts once.
    pub key: String,
    pub display_name: String,
    pub online_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub topic: String,
    pub members: Vec<PresenceMeta>,
}

/// Presence room topic of a place's chat.
pub fn place_room(place_id: Uuid) -> String {
    format!("place:{place_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, MessageContent};

    fn message(place_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            place_id,
            author: Author::Guest {
                display_name: "nino".into(),
            },
            content: MessageContent::Text("hi".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_filter_selects_place() {
        let here = Uuid::new_v4();
        let filter = ChangeFilter::with_row(Table::Messages, RowFilter::PlaceId(here));

        assert!(ChangeEvent::Messages(Change::Insert(message(here))).matches(&filter));
        assert!(!ChangeEvent::Messages(Change::Insert(message(Uuid::new_v4()))).matches(&filter));
        assert!(!ChangeEvent::Places(Change::Delete { id: here }).matches(&filter));
    }

    #[test]
    fn deletes_reach_every_listener_of_the_table() {
        let filter = ChangeFilter::with_row(Table::Messages, RowFilter::PlaceId(Uuid::new_v4()));
        let delete = ChangeEvent::Messages(Change::Delete { id: Uuid::new_v4() });
        assert!(delete.matches(&filter));
    }

    #[test]
    fn wire_shape_is_tagged() {
        let id = Uuid::new_v4();
        let event = RealtimeEvent::Change(ChangeEvent::Reactions(Change::Delete { id }));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Change");
        assert_eq!(json["data"]["table"], "reactions");
        assert_eq!(json["data"]["change"]["op"], "delete");
        assert_eq!(json["data"]["change"]["record"]["id"], id.to_string());

        let back: RealtimeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
