use tracing::{debug, info};
use uuid::Uuid;

use placeconnect_core::FriendshipError;
use placeconnect_core::friendship::{self, FriendAction, FriendEffect};
use placeconnect_core::reconcile;
use placeconnect_types::api::ChannelSpec;
use placeconnect_types::events::{Change, ChangeEvent, ChangeFilter, RealtimeEvent, RowFilter, Table};
use placeconnect_types::models::{Friendship, FriendshipStatus, Identity};

use crate::backend::{Backend, Subscription};
use crate::error::ClientError;

/// Incoming friend requests of the signed-in user.
pub struct FriendRequestsController<B> {
    backend: B,
    user_id: Uuid,
    /// Oldest first; `requests()` reverses.
    pending: Vec<Friendship>,
    subscription: Subscription,
}

impl<B: Backend> FriendRequestsController<B> {
    pub async fn open(backend: B, identity: &Identity) -> Result<Self, ClientError> {
        let user_id = identity
            .user_id()
            .ok_or(ClientError::SignInRequired("see friend requests"))?;

        let subscription = backend.subscribe(
            ChannelSpec::new(format!("friend-requests:{user_id}"))
                .listen(ChangeFilter::with_row(Table::Friendships, RowFilter::AddresseeId(user_id))),
        )?;
        let pending = reconcile::from_snapshot(backend.pending_requests(user_id).await?);
        info!("{} pending friend requests for {}", pending.len(), user_id);

        Ok(Self {
            backend,
            user_id,
            pending,
            subscription,
        })
    }

    /// Pending requests, newest first.
    pub fn requests(&self) -> impl Iterator<Item = &Friendship> {
        self.pending.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fold one change; returns true if the list changed.
    pub fn handle(&mut self, event: RealtimeEvent) -> bool {
        let RealtimeEvent::Change(ChangeEvent::Friendships(change)) = event else {
            return false;
        };
        match change {
            Change::Insert(row) | Change::Update(row) if row.addressee_id != self.user_id => false,
            Change::Insert(row) | Change::Update(row) => match row.status {
                FriendshipStatus::Pending => {
                    reconcile::apply(&mut self.pending, Change::Update(row)).changed()
                }
                // Accepted requests leave the list.
                FriendshipStatus::Accepted => self.remove(row.id),
            },
            Change::Delete { id } => self.remove(id),
        }
    }

    pub async fn next_update(&mut self) -> Option<usize> {
        loop {
            let event = self.subscription.recv().await?;
            if self.handle(event) {
                return Some(self.pending.len());
            }
        }
    }

    pub async fn accept(&mut self, request_id: Uuid) -> Result<Friendship, ClientError> {
        let row = self.pending_row(request_id)?;
        match friendship::transition(Some(row), self.user_id, row.requester_id, FriendAction::Accept)? {
            FriendEffect::MarkAccepted { id } => {
                let accepted = self.backend.accept_friendship(id).await?;
                self.remove(id);
                info!("Accepted friend request from {}", accepted.requester_id);
                Ok(accepted)
            }
            _ => Err(ClientError::NotAllowed("request cannot be accepted")),
        }
    }

    pub async fn decline(&mut self, request_id: Uuid) -> Result<(), ClientError> {
        let row = self.pending_row(request_id)?;
        if let FriendEffect::Delete { id } =
            friendship::transition(Some(row), self.user_id, row.requester_id, FriendAction::Decline)?
        {
            self.backend.delete_friendship(id).await?;
            self.remove(id);
            debug!("Declined friend request {}", id);
        }
        Ok(())
    }

    fn pending_row(&self, id: Uuid) -> Result<&Friendship, ClientError> {
        self.pending
            .iter()
            .find(|f| f.id == id)
            .ok_or(ClientError::Friendship(FriendshipError::NotFound))
    }

    fn remove(&mut self, id: Uuid) -> bool {
        reconcile::apply(&mut self.pending, Change::Delete { id }).changed()
    }
}
