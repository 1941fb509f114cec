use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use placeconnect_core::activity::ActivityLevel;
use placeconnect_core::presence::PresenceRoom;
use placeconnect_core::reactions::{self, Toggle};
use placeconnect_core::reconcile::{self, Applied};
use placeconnect_core::validate;
use placeconnect_types::api::{
    ActivityUpdate, ChannelSpec, NewMessage, NewReaction, ReactionGroup, Upload,
};
use placeconnect_types::events::{
    Change, ChangeEvent, ChangeFilter, PresenceMeta, RealtimeEvent, RowFilter, Table, place_room,
};
use placeconnect_types::models::{Identity, MediaRef, Message, MessageContent, Reaction};

use crate::PickedFile;
use crate::backend::{Backend, Subscription};
use crate::error::ClientError;

/// Reactions held back for messages that have not arrived yet.
const MAX_WAITING_REACTIONS: usize = 256;

/// What a chat room event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    Message { id: Uuid, applied: Applied },
    Reaction { message_id: Option<Uuid>, applied: Applied },
    Presence { online: usize },
}

/// One place's chat room: history, live messages, reactions and who is here.
pub struct ChatController<B> {
    backend: B,
    identity: Identity,
    place_id: Uuid,
    history_limit: u32,
    messages: Vec<Message>,
    reactions: Vec<Reaction>,
    /// Reactions whose message is not held (yet). The reactions feed is not
    /// scoped to the room, so this is bounded.
    waiting_reactions: Vec<Reaction>,
    presence: PresenceRoom,
    subscription: Subscription,
}

impl<B: Backend> ChatController<B> {
    pub async fn open(
        backend: B,
        identity: Identity,
        place_id: Uuid,
        history_limit: u32,
    ) -> Result<Self, ClientError> {
        let subscription = join_room(&backend, &identity, place_id)?;
        let (messages, reactions) = load_history(&backend, place_id, history_limit).await?;
        info!(
            "Joined room {} as {} ({} messages)",
            place_id,
            identity.display_name(),
            messages.len()
        );

        Ok(Self {
            backend,
            identity,
            place_id,
            history_limit,
            messages,
            reactions,
            waiting_reactions: Vec::new(),
            presence: PresenceRoom::new(place_room(place_id)),
            subscription,
        })
    }

    pub fn place_id(&self) -> Uuid {
        self.place_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Messages oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn reaction_groups(&self, message_id: Uuid) -> Vec<ReactionGroup> {
        reactions::group_reactions(&self.reactions, message_id)
    }

    pub fn online_count(&self) -> usize {
        self.presence.count()
    }

    pub fn online_names(&self) -> Vec<String> {
        self.presence.display_names()
    }

    /// Leave the current room and join another one.
    ///
    /// On failure the controller stays in the current room.
    pub async fn switch_place(&mut self, place_id: Uuid) -> Result<(), ClientError> {
        if place_id == self.place_id {
            return Ok(());
        }
        let subscription = join_room(&self.backend, &self.identity, place_id)?;
        let (messages, reactions) = load_history(&self.backend, place_id, self.history_limit).await?;

        info!("Switched room {} -> {}", self.place_id, place_id);
        // Replacing the handle drops the old channel and leaves its presence room.
        self.subscription = subscription;
        self.place_id = place_id;
        self.messages = messages;
        self.reactions = reactions;
        self.waiting_reactions.clear();
        self.presence = PresenceRoom::new(place_room(place_id));
        Ok(())
    }

    /// Fold one realtime event into the room.
    pub fn handle(&mut self, event: RealtimeEvent) -> Option<ChatUpdate> {
        match event {
            RealtimeEvent::Change(ChangeEvent::Messages(change)) => {
                if change.record().is_some_and(|m| m.place_id != self.place_id) {
                    return None;
                }
                let id = match &change {
                    Change::Insert(m) | Change::Update(m) => m.id,
                    Change::Delete { id } => *id,
                };
                let applied = reconcile::apply(&mut self.messages, change);
                match applied {
                    Applied::Inserted => self.adopt_waiting_reactions(id),
                    Applied::Removed => self.reactions.retain(|r| r.message_id != id),
                    _ => {}
                }
                debug!("Message {} in {}: {:?}", id, self.place_id, applied);
                Some(ChatUpdate::Message { id, applied })
            }
            RealtimeEvent::Change(ChangeEvent::Reactions(change)) => {
                let message_id = change.record().map(|r| r.message_id);
                if message_id.is_some_and(|id| reconcile::position(&self.messages, id).is_none()) {
                    self.hold_reaction(change);
                    return None;
                }
                if let Change::Delete { id } = &change {
                    reconcile::apply(&mut self.waiting_reactions, Change::Delete { id: *id });
                }
                let applied = reconcile::apply(&mut self.reactions, change);
                Some(ChatUpdate::Reaction { message_id, applied })
            }
            RealtimeEvent::PresenceSync(snapshot) => {
                self.presence.apply_snapshot(snapshot).then(|| ChatUpdate::Presence {
                    online: self.presence.count(),
                })
            }
            RealtimeEvent::Change(other) => {
                warn!("Unexpected {:?} change on room {}", other.table(), self.place_id);
                None
            }
        }
    }

    /// Wait for the next event that changed the room.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        loop {
            let event = self.subscription.recv().await?;
            if let Some(update) = self.handle(event) {
                return Some(update);
            }
        }
    }

    pub async fn send_text(&mut self, input: &str) -> Result<Message, ClientError> {
        let text = validate::chat_message(input)?;
        self.post(MessageContent::Text(text)).await
    }

    /// Upload an image or video, then post it.
    pub async fn send_media(&mut self, file: PickedFile) -> Result<Message, ClientError> {
        validate::chat_media(&file.mime_type, file.bytes.len())?;

        let path = format!(
            "chat-media/{}/{}.{}",
            self.place_id,
            Utc::now().timestamp_millis(),
            validate::file_extension(&file.file_name)
        );
        let mime_type = file.mime_type.clone();
        let stored = self
            .backend
            .upload(Upload {
                path,
                mime_type: file.mime_type,
                bytes: file.bytes,
            })
            .await
            .inspect_err(|e| warn!("Chat media upload failed: {}", e))?;

        self.post(MessageContent::Media(MediaRef {
            url: stored.public_url,
            mime_type,
        }))
        .await
    }

    /// Replace one of the user's own messages with a tombstone.
    pub async fn retract(&mut self, message_id: Uuid) -> Result<(), ClientError> {
        let user_id = self
            .identity
            .user_id()
            .ok_or(ClientError::SignInRequired("delete a message"))?;
        let own = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .is_some_and(|m| m.author.user_id() == Some(user_id));
        if !own {
            return Err(ClientError::NotAllowed("only your own messages can be deleted"));
        }

        let message = self.backend.retract_message(message_id).await?;
        reconcile::apply(&mut self.messages, Change::Update(message));
        Ok(())
    }

    /// Add the user's `emoji` reaction, or remove it if already there.
    /// Returns whether the reaction is present afterwards.
    pub async fn toggle_reaction(&mut self, message_id: Uuid, emoji: &str) -> Result<bool, ClientError> {
        let user_id = self
            .identity
            .user_id()
            .ok_or(ClientError::SignInRequired("react to messages"))?;

        match reactions::toggle_plan(&self.reactions, message_id, user_id, emoji) {
            Toggle::Add => {
                let reaction = self
                    .backend
                    .insert_reaction(NewReaction {
                        message_id,
                        user_id,
                        emoji: emoji.to_string(),
                    })
                    .await?;
                reconcile::apply(&mut self.reactions, Change::Insert(reaction));
                Ok(true)
            }
            Toggle::Remove { id } => {
                self.backend.delete_reaction(id).await?;
                reconcile::apply(&mut self.reactions, Change::Delete { id });
                Ok(false)
            }
        }
    }

    fn hold_reaction(&mut self, change: Change<Reaction>) {
        reconcile::apply(&mut self.waiting_reactions, change);
        if self.waiting_reactions.len() > MAX_WAITING_REACTIONS {
            // Oldest first, so this drops the stalest.
            let excess = self.waiting_reactions.len() - MAX_WAITING_REACTIONS;
            self.waiting_reactions.drain(..excess);
        }
    }

    fn adopt_waiting_reactions(&mut self, message_id: Uuid) {
        let (adopted, still_waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiting_reactions)
            .into_iter()
            .partition(|r| r.message_id == message_id);
        self.waiting_reactions = still_waiting;
        if !adopted.is_empty() {
            debug!("{} early reactions joined message {}", adopted.len(), message_id);
        }
        for reaction in adopted {
            reconcile::apply(&mut self.reactions, Change::Insert(reaction));
        }
    }

    async fn post(&mut self, content: MessageContent) -> Result<Message, ClientError> {
        let message = self
            .backend
            .insert_message(NewMessage {
                place_id: self.place_id,
                author: self.identity.as_author(),
                content,
            })
            .await?;
        if reconcile::apply(&mut self.messages, Change::Insert(message.clone())) == Applied::Inserted {
            self.adopt_waiting_reactions(message.id);
        }
        self.bump_activity().await;
        Ok(message)
    }

    /// The message is already stored, so a failed bump is only logged.
    async fn bump_activity(&self) {
        let level = ActivityLevel::from_message_count(self.messages.len());
        let update = ActivityUpdate {
            activity_level: level.get(),
            last_activity: Utc::now(),
        };
        if let Err(e) = self.backend.update_place_activity(self.place_id, update).await {
            warn!("Failed to update activity of {}: {}", self.place_id, e);
        }
    }
}

fn join_room<B: Backend>(backend: &B, identity: &Identity, place_id: Uuid) -> Result<Subscription, ClientError> {
    let meta = PresenceMeta {
        key: identity.presence_key(),
        display_name: identity.display_name().to_string(),
        online_at: Utc::now(),
    };
    let spec = ChannelSpec::new(place_room(place_id))
        .listen(ChangeFilter::with_row(Table::Messages, RowFilter::PlaceId(place_id)))
        .listen(ChangeFilter::table(Table::Reactions))
        .track_presence(meta);
    Ok(backend.subscribe(spec)?)
}

async fn load_history<B: Backend>(
    backend: &B,
    place_id: Uuid,
    limit: u32,
) -> Result<(Vec<Message>, Vec<Reaction>), ClientError> {
    let messages = reconcile::from_snapshot(backend.recent_messages(place_id, limit).await?);
    let ids = messages.iter().map(|m| m.id).collect();
    let reactions = reconcile::from_snapshot(backend.reactions_for(ids).await?);
    Ok((messages, reactions))
}
