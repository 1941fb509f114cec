//! In-process stand-in for the hosted platform, used for local development
//! and tests. It keeps every table in memory, enforces the same ownership
//! rules the platform's row policies do, and fans changes out to subscribed
//! channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use placeconnect_core::FriendshipError;
use placeconnect_core::friendship::{FriendAction, FriendEffect, find_between, friends_of, transition};
use placeconnect_types::api::{
    ActivityUpdate, ChannelSpec, FileRef, NewMessage, NewPlace, NewReaction, PresenceJoin,
    ProfileUpdate, ProfileUpsert, Upload,
};
use placeconnect_types::events::{
    Change, ChangeEvent, ChangeFilter, PresenceSnapshot, RealtimeEvent,
};
use placeconnect_types::models::{
    Author, Friendship, FriendshipStatus, MAX_ACTIVITY, Message, MessageContent, Place, Profile,
    Reaction,
};

use crate::backend::{Backend, BackendResult, Subscription};
use crate::error::BackendError;

/// Handle on a shared in-memory backend, signed in as one identity (or none).
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
    acting: Option<Uuid>,
}

struct MemoryInner {
    tables: Mutex<Tables>,
    channels: Mutex<Channels>,
    public_base_url: String,
    fail_uploads: AtomicBool,
    duplicate_delivery: AtomicBool,
}

#[derive(Default)]
struct Tables {
    places: Vec<Place>,
    messages: Vec<Message>,
    reactions: Vec<Reaction>,
    friendships: Vec<Friendship>,
    profiles: Vec<Profile>,
    files: HashMap<String, (String, Bytes)>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing timestamps so creation order is unambiguous.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }
}

#[derive(Default)]
struct Channels {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    topic: String,
    changes: Vec<ChangeFilter>,
    presence: Option<PresenceJoin>,
    tx: mpsc::UnboundedSender<RealtimeEvent>,
}

impl Channels {
    fn broadcast_presence(&self, topic: &str) {
        let members = self
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .filter_map(|s| match &s.presence {
                Some(PresenceJoin::Track(meta)) => Some(meta.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();

        let snapshot = PresenceSnapshot {
            topic: topic.to_string(),
            members,
        };
        for sub in self.subscribers.iter().filter(|s| s.topic == topic && s.presence.is_some()) {
            let _ = sub.tx.send(RealtimeEvent::PresenceSync(snapshot.clone()));
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_public_url("http://localhost:54321/storage/v1/object/public")
    }

    pub fn with_public_url(base: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                tables: Mutex::new(Tables::default()),
                channels: Mutex::new(Channels::default()),
                public_base_url: base.into(),
                fail_uploads: AtomicBool::new(false),
                duplicate_delivery: AtomicBool::new(false),
            }),
            acting: None,
        }
    }

    /// Another handle on the same data, signed in as `user_id`.
    pub fn as_user(&self, user_id: Uuid) -> Self {
        Self {
            inner: self.inner.clone(),
            acting: Some(user_id),
        }
    }

    /// Another handle on the same data with no session.
    pub fn as_guest(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            acting: None,
        }
    }

    pub fn acting_user(&self) -> Option<Uuid> {
        self.acting
    }

    /// Insert a place as the platform's own seed data would.
    pub fn seed_place(&self, place: Place) {
        self.tables().places.push(place.clone());
        self.emit(ChangeEvent::Places(Change::Insert(place)));
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.tables().profiles.push(profile.clone());
        self.emit(ChangeEvent::Profiles(Change::Insert(profile)));
    }

    /// Deliver a raw change to subscribers without touching any table, to
    /// replay duplicated or reordered feeds.
    pub fn inject(&self, event: ChangeEvent) {
        self.emit(event);
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.inner.fail_uploads.store(fail, Ordering::Release);
    }

    /// Deliver every change twice.
    pub fn set_duplicate_delivery(&self, duplicate: bool) {
        self.inner.duplicate_delivery.store(duplicate, Ordering::Release);
    }

    /// Open channels on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels().subscribers.iter().filter(|s| s.topic == topic).count()
    }

    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.tables().files.get(path).map(|(_, bytes)| bytes.clone())
    }

    pub fn place(&self, id: Uuid) -> Option<Place> {
        self.tables().places.iter().find(|p| p.id == id).cloned()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.inner.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_user(&self) -> BackendResult<Uuid> {
        self.acting.ok_or(BackendError::Unauthenticated)
    }

    fn require_self(&self, user_id: Uuid, what: &str) -> BackendResult<()> {
        if self.require_user()? != user_id {
            return Err(BackendError::Forbidden(what.to_string()));
        }
        Ok(())
    }

    fn emit(&self, event: ChangeEvent) {
        let copies = if self.inner.duplicate_delivery.load(Ordering::Acquire) { 2 } else { 1 };
        let channels = self.channels();
        for sub in &channels.subscribers {
            if sub.changes.iter().any(|f| event.matches(f)) {
                for _ in 0..copies {
                    let _ = sub.tx.send(RealtimeEvent::Change(event.clone()));
                }
            }
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.inner.public_base_url.trim_end_matches('/'), path)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn friendship_error(e: FriendshipError) -> BackendError {
    match e {
        FriendshipError::AlreadyExists => BackendError::Conflict(e.to_string()),
        FriendshipError::NotFound => BackendError::NotFound(e.to_string()),
        _ => BackendError::Forbidden(e.to_string()),
    }
}

impl Backend for MemoryBackend {
    async fn load_places(&self) -> BackendResult<Vec<Place>> {
        Ok(self.tables().places.clone())
    }

    async fn insert_place(&self, new: NewPlace) -> BackendResult<Place> {
        self.require_self(new.created_by, "places can only be created as yourself")?;

        let place = {
            let mut tables = self.tables();
            let place = Place {
                id: Uuid::new_v4(),
                name: new.name,
                kind: new.kind,
                latitude: new.latitude,
                longitude: new.longitude,
                address: None,
                description: new.description,
                bio: new.bio,
                image_url: new.image_url,
                activity_level: 0,
                last_activity: None,
                is_temporary: new.is_temporary,
                expires_at: new.expires_at,
                created_by: Some(new.created_by),
                created_at: tables.now(),
            };
            tables.places.push(place.clone());
            place
        };

        info!("Place {} ({}) created", place.name, place.id);
        self.emit(ChangeEvent::Places(Change::Insert(place.clone())));
        Ok(place)
    }

    async fn update_place_activity(&self, place_id: Uuid, update: ActivityUpdate) -> BackendResult<()> {
        let place = {
            let mut tables = self.tables();
            let place = tables
                .places
                .iter_mut()
                .find(|p| p.id == place_id)
                .ok_or_else(|| BackendError::NotFound(format!("place {place_id}")))?;
            place.activity_level = update.activity_level.min(MAX_ACTIVITY);
            place.last_activity = Some(update.last_activity);
            place.clone()
        };
        self.emit(ChangeEvent::Places(Change::Update(place)));
        Ok(())
    }

    async fn update_place_image(&self, place_id: Uuid, image_url: String) -> BackendResult<()> {
        let user_id = self.require_user()?;
        let place = {
            let mut tables = self.tables();
            let place = tables
                .places
                .iter_mut()
                .find(|p| p.id == place_id)
                .ok_or_else(|| BackendError::NotFound(format!("place {place_id}")))?;
            if place.created_by != Some(user_id) {
                return Err(BackendError::Forbidden("only the creator can change the image".into()));
            }
            place.image_url = Some(image_url);
            place.clone()
        };
        self.emit(ChangeEvent::Places(Change::Update(place)));
        Ok(())
    }

    async fn recent_messages(&self, place_id: Uuid, limit: u32) -> BackendResult<Vec<Message>> {
        let tables = self.tables();
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.place_id == place_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse((m.created_at, m.id)));
        messages.truncate(limit as usize);
        messages.reverse();
        Ok(messages)
    }

    async fn insert_message(&self, new: NewMessage) -> BackendResult<Message> {
        if let Author::User { id, .. } = &new.author {
            self.require_self(*id, "messages can only be posted as yourself")?;
        }

        let message = {
            let mut tables = self.tables();
            if !tables.places.iter().any(|p| p.id == new.place_id) {
                return Err(BackendError::NotFound(format!("place {}", new.place_id)));
            }
            let message = Message {
                id: Uuid::new_v4(),
                place_id: new.place_id,
                author: new.author,
                content: new.content,
                created_at: tables.now(),
            };
            tables.messages.push(message.clone());
            message
        };

        debug!("Message {} posted in {}", message.id, message.place_id);
        self.emit(ChangeEvent::Messages(Change::Insert(message.clone())));
        Ok(message)
    }

    async fn retract_message(&self, message_id: Uuid) -> BackendResult<Message> {
        let user_id = self.require_user()?;
        let message = {
            let mut tables = self.tables();
            let message = tables
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| BackendError::NotFound(format!("message {message_id}")))?;
            if message.author.user_id() != Some(user_id) {
                return Err(BackendError::Forbidden("only the author can retract".into()));
            }
            message.content = MessageContent::Retracted;
            message.clone()
        };
        self.emit(ChangeEvent::Messages(Change::Update(message.clone())));
        Ok(message)
    }

    async fn reactions_for(&self, message_ids: Vec<Uuid>) -> BackendResult<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self
            .tables()
            .reactions
            .iter()
            .filter(|r| message_ids.contains(&r.message_id))
            .cloned()
            .collect())
    }

    async fn insert_reaction(&self, new: NewReaction) -> BackendResult<Reaction> {
        self.require_self(new.user_id, "reactions can only be added as yourself")?;

        let reaction = {
            let mut tables = self.tables();
            if !tables.messages.iter().any(|m| m.id == new.message_id) {
                return Err(BackendError::NotFound(format!("message {}", new.message_id)));
            }
            if tables
                .reactions
                .iter()
                .any(|r| r.matches(new.message_id, new.user_id, &new.emoji))
            {
                return Err(BackendError::Conflict("reaction already exists".into()));
            }
            let reaction = Reaction {
                id: Uuid::new_v4(),
                message_id: new.message_id,
                user_id: new.user_id,
                emoji: new.emoji,
                created_at: tables.now(),
            };
            tables.reactions.push(reaction.clone());
            reaction
        };

        self.emit(ChangeEvent::Reactions(Change::Insert(reaction.clone())));
        Ok(reaction)
    }

    async fn delete_reaction(&self, reaction_id: Uuid) -> BackendResult<()> {
        let user_id = self.require_user()?;
        {
            let mut tables = self.tables();
            let index = tables
                .reactions
                .iter()
                .position(|r| r.id == reaction_id)
                .ok_or_else(|| BackendError::NotFound(format!("reaction {reaction_id}")))?;
            if tables.reactions[index].user_id != user_id {
                return Err(BackendError::Forbidden("only the author can remove a reaction".into()));
            }
            tables.reactions.remove(index);
        }
        self.emit(ChangeEvent::Reactions(Change::Delete { id: reaction_id }));
        Ok(())
    }

    async fn upsert_profile(&self, upsert: ProfileUpsert) -> BackendResult<Profile> {
        self.require_self(upsert.id, "profiles can only be written by their owner")?;

        let (profile, inserted) = {
            let mut tables = self.tables();
            let now = tables.now();
            match tables.profiles.iter_mut().find(|p| p.id == upsert.id) {
                Some(existing) => {
                    // Names and avatars edited in the app win over auth metadata.
                    if existing.full_name.is_none() {
                        existing.full_name = upsert.full_name;
                    }
                    if existing.avatar_url.is_none() {
                        existing.avatar_url = upsert.avatar_url;
                    }
                    if upsert.email.is_some() {
                        existing.email = upsert.email;
                    }
                    existing.updated_at = now;
                    (existing.clone(), false)
                }
                None => {
                    let profile = Profile {
                        id: upsert.id,
                        full_name: upsert.full_name,
                        avatar_url: upsert.avatar_url,
                        email: upsert.email,
                        created_at: now,
                        updated_at: now,
                    };
                    tables.profiles.push(profile.clone());
                    (profile, true)
                }
            }
        };

        let change = if inserted {
            Change::Insert(profile.clone())
        } else {
            Change::Update(profile.clone())
        };
        self.emit(ChangeEvent::Profiles(change));
        Ok(profile)
    }

    async fn fetch_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        Ok(self.tables().profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> BackendResult<Profile> {
        self.require_self(id, "profiles can only be written by their owner")?;

        let profile = {
            let mut tables = self.tables();
            let now = tables.now();
            let profile = tables
                .profiles
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("profile {id}")))?;
            if let Some(name) = update.full_name {
                profile.full_name = Some(name);
            }
            if let Some(url) = update.avatar_url {
                profile.avatar_url = Some(url);
            }
            profile.updated_at = now;
            profile.clone()
        };

        self.emit(ChangeEvent::Profiles(Change::Update(profile.clone())));
        Ok(profile)
    }

    async fn friendship_between(&self, a: Uuid, b: Uuid) -> BackendResult<Option<Friendship>> {
        Ok(find_between(&self.tables().friendships, a, b).cloned())
    }

    async fn pending_requests(&self, user_id: Uuid) -> BackendResult<Vec<Friendship>> {
        let mut rows: Vec<Friendship> = self
            .tables()
            .friendships
            .iter()
            .filter(|f| f.addressee_id == user_id && f.status == FriendshipStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|f| std::cmp::Reverse(f.created_at));
        Ok(rows)
    }

    async fn count_friends(&self, user_id: Uuid) -> BackendResult<usize> {
        Ok(friends_of(&self.tables().friendships, user_id).len())
    }

    async fn insert_friendship(&self, requester_id: Uuid, addressee_id: Uuid) -> BackendResult<Friendship> {
        self.require_self(requester_id, "requests can only be sent as yourself")?;

        let row = {
            let mut tables = self.tables();
            let existing = find_between(&tables.friendships, requester_id, addressee_id);
            transition(existing, requester_id, addressee_id, FriendAction::Send)
                .map_err(friendship_error)?;
            let now = tables.now();
            let row = Friendship {
                id: Uuid::new_v4(),
                requester_id,
                addressee_id,
                status: FriendshipStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            tables.friendships.push(row.clone());
            row
        };

        self.emit(ChangeEvent::Friendships(Change::Insert(row.clone())));
        Ok(row)
    }

    async fn accept_friendship(&self, id: Uuid) -> BackendResult<Friendship> {
        let actor = self.require_user()?;

        let row = {
            let mut tables = self.tables();
            let now = tables.now();
            let row = tables
                .friendships
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("friendship {id}")))?;
            let other = row
                .other_party(actor)
                .ok_or_else(|| friendship_error(FriendshipError::NotAParty))?;
            match transition(Some(&*row), actor, other, FriendAction::Accept).map_err(friendship_error)? {
                FriendEffect::MarkAccepted { .. } => {
                    row.status = FriendshipStatus::Accepted;
                    row.updated_at = now;
                }
                effect => {
                    warn!("Unexpected effect {:?} for accept", effect);
                    return Err(BackendError::Request("unexpected transition".into()));
                }
            }
            row.clone()
        };

        self.emit(ChangeEvent::Friendships(Change::Update(row.clone())));
        Ok(row)
    }

    async fn delete_friendship(&self, id: Uuid) -> BackendResult<()> {
        let actor = self.require_user()?;
        {
            let mut tables = self.tables();
            let index = tables
                .friendships
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("friendship {id}")))?;
            if !tables.friendships[index].involves(actor) {
                return Err(friendship_error(FriendshipError::NotAParty));
            }
            tables.friendships.remove(index);
        }
        self.emit(ChangeEvent::Friendships(Change::Delete { id }));
        Ok(())
    }

    async fn upload(&self, upload: Upload) -> BackendResult<FileRef> {
        self.require_user()?;
        if self.inner.fail_uploads.load(Ordering::Acquire) {
            return Err(BackendError::Upload("storage unavailable".into()));
        }

        let size = upload.bytes.len();
        self.tables()
            .files
            .insert(upload.path.clone(), (upload.mime_type, upload.bytes));
        debug!("Stored {} ({} bytes)", upload.path, size);

        Ok(FileRef {
            public_url: self.url_for(&upload.path),
            path: upload.path,
        })
    }

    fn subscribe(&self, spec: ChannelSpec) -> BackendResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let has_presence = spec.presence.is_some();

        let id = {
            let mut channels = self.channels();
            let id = channels.next_id;
            channels.next_id += 1;
            channels.subscribers.push(Subscriber {
                id,
                topic: spec.topic.clone(),
                changes: spec.changes,
                presence: spec.presence,
                tx,
            });
            if has_presence {
                channels.broadcast_presence(&spec.topic);
            }
            id
        };

        debug!("Channel {} opened on {}", id, spec.topic);

        let inner: Weak<MemoryInner> = Arc::downgrade(&self.inner);
        let topic = spec.topic.clone();
        Ok(Subscription::new(spec.topic, rx, move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut channels = inner.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.subscribers.retain(|s| s.id != id);
            if has_presence {
                channels.broadcast_presence(&topic);
            }
        }))
    }
}
