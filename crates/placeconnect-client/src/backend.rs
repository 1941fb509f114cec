use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use placeconnect_types::api::{
    ActivityUpdate, ChannelSpec, FileRef, NewMessage, NewPlace, NewReaction, ProfileUpdate,
    ProfileUpsert, Upload,
};
use placeconnect_types::events::RealtimeEvent;
use placeconnect_types::models::{Friendship, Message, Place, Profile, Reaction};

use crate::error::BackendError;

pub type BackendResult<T> = Result<T, BackendError>;

/// Client facade of the hosted platform.
///
/// Requests act as whoever the facade is signed in as; row-level rules on the
/// platform side reject what that identity may not do.
pub trait Backend: Send + Sync {
    // -- Places --

    fn load_places(&self) -> impl Future<Output = BackendResult<Vec<Place>>> + Send;

    fn insert_place(&self, place: NewPlace) -> impl Future<Output = BackendResult<Place>> + Send;

    fn update_place_activity(
        &self,
        place_id: Uuid,
        update: ActivityUpdate,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    fn update_place_image(
        &self,
        place_id: Uuid,
        image_url: String,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    // -- Messages --

    /// The `limit` most recent messages of a place, oldest first.
    fn recent_messages(
        &self,
        place_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = BackendResult<Vec<Message>>> + Send;

    fn insert_message(&self, message: NewMessage) -> impl Future<Output = BackendResult<Message>> + Send;

    /// Replace a message's content with the retraction tombstone.
    fn retract_message(&self, message_id: Uuid) -> impl Future<Output = BackendResult<Message>> + Send;

    // -- Reactions --

    fn reactions_for(
        &self,
        message_ids: Vec<Uuid>,
    ) -> impl Future<Output = BackendResult<Vec<Reaction>>> + Send;

    fn insert_reaction(&self, reaction: NewReaction) -> impl Future<Output = BackendResult<Reaction>> + Send;

    fn delete_reaction(&self, reaction_id: Uuid) -> impl Future<Output = BackendResult<()>> + Send;

    // -- Profiles --

    fn upsert_profile(&self, profile: ProfileUpsert) -> impl Future<Output = BackendResult<Profile>> + Send;

    fn fetch_profile(&self, id: Uuid) -> impl Future<Output = BackendResult<Option<Profile>>> + Send;

    fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> impl Future<Output = BackendResult<Profile>> + Send;

    // -- Friendships --

    /// The row linking `a` and `b`, in either direction.
    fn friendship_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> impl Future<Output = BackendResult<Option<Friendship>>> + Send;

    /// Pending requests addressed to `user_id`, newest first.
    fn pending_requests(&self, user_id: Uuid) -> impl Future<Output = BackendResult<Vec<Friendship>>> + Send;

    fn count_friends(&self, user_id: Uuid) -> impl Future<Output = BackendResult<usize>> + Send;

    fn insert_friendship(
        &self,
        requester_id: Uuid,
        addressee_id: Uuid,
    ) -> impl Future<Output = BackendResult<Friendship>> + Send;

    fn accept_friendship(&self, id: Uuid) -> impl Future<Output = BackendResult<Friendship>> + Send;

    fn delete_friendship(&self, id: Uuid) -> impl Future<Output = BackendResult<()>> + Send;

    // -- Files --

    fn upload(&self, upload: Upload) -> impl Future<Output = BackendResult<FileRef>> + Send;

    // -- Realtime --

    /// Open a realtime channel. It stays open until the returned handle drops.
    fn subscribe(&self, spec: ChannelSpec) -> BackendResult<Subscription>;
}

/// An open realtime channel. Dropping it leaves the channel and, if presence
/// was tracked, the room.
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(topic: String, rx: mpsc::UnboundedReceiver<RealtimeEvent>, on_close: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            topic,
            rx,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event, or `None` once the backend closed the channel.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            debug!("Closing channel {}", self.topic);
            on_close();
        }
    }
}

impl Stream for Subscription {
    type Item = RealtimeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}
