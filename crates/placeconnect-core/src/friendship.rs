//! Friend requests between two identities.
//!
//! A pair is in one of three states: no row, a pending row pointing from
//! requester to addressee, or an accepted row. Lookups ignore direction, but
//! only the addressee may accept.

use placeconnect_types::models::{Friendship, FriendshipStatus};
use uuid::Uuid;

use crate::error::FriendshipError;

/// Something one party can do to the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendAction {
    Send,
    Accept,
    Decline,
    Cancel,
    Remove,
}

/// Row operation a permitted action turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendEffect {
    Insert { requester_id: Uuid, addressee_id: Uuid },
    MarkAccepted { id: Uuid },
    Delete { id: Uuid },
}

/// Decide what `action` by `actor` towards `other` does, given the row that
/// currently links them (if any).
pub fn transition(
    row: Option<&Friendship>,
    actor: Uuid,
    other: Uuid,
    action: FriendAction,
) -> Result<FriendEffect, FriendshipError> {
    if actor == other {
        return Err(FriendshipError::SelfRequest);
    }
    if let Some(row) = row {
        if !row.connects(actor, other) {
            return Err(FriendshipError::NotAParty);
        }
    }

    match (action, row) {
        (FriendAction::Send, None) => Ok(FriendEffect::Insert {
            requester_id: actor,
            addressee_id: other,
        }),
        (FriendAction::Send, Some(_)) => Err(FriendshipError::AlreadyExists),
        (_, None) => Err(FriendshipError::NotFound),

        (FriendAction::Accept, Some(row)) => {
            if row.status != FriendshipStatus::Pending {
                return Err(FriendshipError::NotPending);
            }
            if row.addressee_id != actor {
                return Err(FriendshipError::NotAddressee);
            }
            Ok(FriendEffect::MarkAccepted { id: row.id })
        }
        (FriendAction::Decline, Some(row)) => {
            if row.status != FriendshipStatus::Pending {
                return Err(FriendshipError::NotPending);
            }
            if row.addressee_id != actor {
                return Err(FriendshipError::NotAddressee);
            }
            Ok(FriendEffect::Delete { id: row.id })
        }
        (FriendAction::Cancel, Some(row)) => {
            if row.status != FriendshipStatus::Pending {
                return Err(FriendshipError::NotPending);
            }
            if row.requester_id != actor {
                return Err(FriendshipError::NotRequester);
            }
            Ok(FriendEffect::Delete { id: row.id })
        }
        (FriendAction::Remove, Some(row)) => {
            if row.status != FriendshipStatus::Accepted {
                return Err(FriendshipError::NotAccepted);
            }
            Ok(FriendEffect::Delete { id: row.id })
        }
    }
}

/// The relationship as seen from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipView {
    None,
    PendingSent { id: Uuid },
    PendingReceived { id: Uuid },
    Friends { id: Uuid },
}

impl FriendshipView {
    pub fn of(row: Option<&Friendship>, viewer: Uuid) -> Self {
        match row {
            None => Self::None,
            Some(f) if f.status == FriendshipStatus::Accepted => Self::Friends { id: f.id },
            Some(f) if f.requester_id == viewer => Self::PendingSent { id: f.id },
            Some(f) => Self::PendingReceived { id: f.id },
        }
    }

    pub fn friendship_id(&self) -> Option<Uuid> {
        match *self {
            Self::None => None,
            Self::PendingSent { id } | Self::PendingReceived { id } | Self::Friends { id } => Some(id),
        }
    }
}

/// The row linking `a` and `b`, whichever way it points.
pub fn find_between<'a, I>(rows: I, a: Uuid, b: Uuid) -> Option<&'a Friendship>
where
    I: IntoIterator<Item = &'a Friendship>,
{
    rows.into_iter().find(|f| f.connects(a, b))
}

/// Accepted friends of `user_id`.
pub fn friends_of<'a, I>(rows: I, user_id: Uuid) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a Friendship>,
{
    rows.into_iter()
        .filter(|f| f.status == FriendshipStatus::Accepted)
        .filter_map(|f| f.other_party(user_id))
        .collect()
}
