use chrono::{DateTime, Utc};
use placeconnect_types::events::Change;
use placeconnect_types::models::{Friendship, Message, MessageContent, Place, Profile, Reaction};
use uuid::Uuid;

/// A row that can live in a reconciled collection.
pub trait Entity: Clone {
    fn id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;

    /// Fold a newer version of the same row into this one.
    fn merge(&mut self, newer: Self) {
        *self = newer;
    }
}

/// What `apply` did with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    /// Duplicate insert or delete of an absent id
    Ignored,
}

impl Applied {
    pub fn changed(self) -> bool {
        self != Self::Ignored
    }
}

/// Fold one change into `items`.
///
/// Delivery is at-least-once and may be reordered: a duplicate insert is a
/// no-op, an update for an unknown id inserts it, and deleting an absent id
/// does nothing. New rows go to their `(created_at, id)` position, which is the
/// tail for anything newer than what is already held.
pub fn apply<T: Entity>(items: &mut Vec<T>, change: Change<T>) -> Applied {
    match change {
        Change::Insert(record) => {
            if position(items, record.id()).is_some() {
                return Applied::Ignored;
            }
            insert_ordered(items, record);
            Applied::Inserted
        }
        Change::Update(record) => match position(items, record.id()) {
            Some(index) => {
                items[index].merge(record);
                Applied::Updated
            }
            None => {
                insert_ordered(items, record);
                Applied::Inserted
            }
        },
        Change::Delete { id } => match position(items, id) {
            Some(index) => {
                items.remove(index);
                Applied::Removed
            }
            None => Applied::Ignored,
        },
    }
}

/// Put a bulk-loaded result in the order `apply` maintains, dropping repeated ids.
pub fn from_snapshot<T: Entity>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_key(|e| (e.created_at(), e.id()));
    items.dedup_by_key(|e| e.id());
    items
}

pub fn position<T: Entity>(items: &[T], id: Uuid) -> Option<usize> {
    items.iter().position(|e| e.id() == id)
}

fn insert_ordered<T: Entity>(items: &mut Vec<T>, record: T) {
    let key = (record.created_at(), record.id());
    let at = items.partition_point(|e| (e.created_at(), e.id()) <= key);
    items.insert(at, record);
}

impl Entity for Place {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Message {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // A retraction is final.
    fn merge(&mut self, newer: Self) {
        let retracted = self.is_retracted();
        *self = newer;
        if retracted {
            self.content = MessageContent::Retracted;
        }
    }
}

impl Entity for Reaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Friendship {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Profile {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
