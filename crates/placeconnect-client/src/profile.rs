use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use placeconnect_core::friendship::{self, FriendAction, FriendEffect, FriendshipView};
use placeconnect_core::profile_cache::ProfileCache;
use placeconnect_core::validate;
use placeconnect_types::api::{ChannelSpec, ProfileUpdate, Upload};
use placeconnect_types::events::{Change, ChangeEvent, ChangeFilter, RealtimeEvent, RowFilter, Table};
use placeconnect_types::models::{Friendship, Identity, Profile};

use crate::PickedFile;
use crate::backend::{Backend, Subscription};
use crate::error::ClientError;

/// Profiles shared across screens, fetched once and kept fresh by the
/// profiles change feed.
#[derive(Debug, Clone)]
pub struct ProfileDirectory {
    cache: Arc<Mutex<ProfileCache>>,
}

impl ProfileDirectory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(ProfileCache::new(capacity))),
        }
    }

    fn cache(&self) -> MutexGuard<'_, ProfileCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cached(&self, id: Uuid) -> Option<Profile> {
        self.cache().get(id).cloned()
    }

    /// Cached profile, or fetch it from the backend and cache it.
    pub async fn get<B: Backend>(&self, backend: &B, id: Uuid) -> Result<Option<Profile>, ClientError> {
        if let Some(profile) = self.cached(id) {
            return Ok(Some(profile));
        }
        let fetched = backend.fetch_profile(id).await?;
        if let Some(profile) = &fetched {
            debug!("Caching profile {}", id);
            self.cache().insert(profile.clone());
        }
        Ok(fetched)
    }

    pub fn store(&self, profile: Profile) {
        self.cache().insert(profile);
    }

    pub fn invalidate(&self, id: Uuid) {
        self.cache().invalidate(id);
    }

    pub fn observe(&self, event: &ChangeEvent) {
        self.cache().observe(event);
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }
}

impl Default for ProfileDirectory {
    fn default() -> Self {
        Self::new(placeconnect_core::profile_cache::DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdated {
    Profile,
    Friendship(FriendshipView),
}

/// A user's profile page as seen by the viewer.
pub struct ProfileController<B> {
    backend: B,
    directory: ProfileDirectory,
    viewer: Option<Uuid>,
    subject: Uuid,
    profile: Option<Profile>,
    friendship: Option<Friendship>,
    friend_count: usize,
    subscription: Subscription,
}

impl<B: Backend> ProfileController<B> {
    pub async fn open(
        backend: B,
        directory: ProfileDirectory,
        viewer: Option<&Identity>,
        subject: Uuid,
    ) -> Result<Self, ClientError> {
        let viewer = viewer.and_then(Identity::user_id);
        let subscription = backend.subscribe(
            ChannelSpec::new(format!("profile:{subject}"))
                .listen(ChangeFilter::with_row(Table::Profiles, RowFilter::Id(subject)))
                .listen(ChangeFilter::with_row(Table::Friendships, RowFilter::Party(subject))),
        )?;

        let profile = directory.get(&backend, subject).await?;
        let friendship = match viewer {
            Some(viewer) if viewer != subject => backend.friendship_between(viewer, subject).await?,
            _ => None,
        };
        let friend_count = backend.count_friends(subject).await?;

        Ok(Self {
            backend,
            directory,
            viewer,
            subject,
            profile,
            friendship,
            friend_count,
            subscription,
        })
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn display_name(&self) -> &str {
        self.profile.as_ref().map_or("Anonymous", Profile::display_name)
    }

    pub fn friend_count(&self) -> usize {
        self.friend_count
    }

    pub fn is_own(&self) -> bool {
        self.viewer == Some(self.subject)
    }

    /// Relationship between viewer and subject; `None` for guests and on
    /// one's own profile.
    pub fn friendship(&self) -> FriendshipView {
        match self.viewer {
            Some(viewer) if viewer != self.subject => FriendshipView::of(self.friendship.as_ref(), viewer),
            _ => FriendshipView::None,
        }
    }

    pub fn handle(&mut self, event: RealtimeEvent) -> Option<ProfileUpdated> {
        let RealtimeEvent::Change(change) = event else {
            return None;
        };
        self.directory.observe(&change);

        match change {
            ChangeEvent::Profiles(Change::Insert(profile) | Change::Update(profile)) if profile.id == self.subject => {
                self.profile = Some(profile);
                Some(ProfileUpdated::Profile)
            }
            ChangeEvent::Profiles(Change::Delete { id }) if id == self.subject => {
                self.profile = None;
                Some(ProfileUpdated::Profile)
            }
            ChangeEvent::Friendships(Change::Insert(row) | Change::Update(row)) => {
                let viewer = self.viewer?;
                if !row.connects(viewer, self.subject) {
                    return None;
                }
                self.friendship = Some(row);
                Some(ProfileUpdated::Friendship(self.friendship()))
            }
            ChangeEvent::Friendships(Change::Delete { id }) => {
                if self.friendship.as_ref().is_none_or(|f| f.id != id) {
                    return None;
                }
                self.friendship = None;
                Some(ProfileUpdated::Friendship(FriendshipView::None))
            }
            _ => None,
        }
    }

    /// Wait for the next change to this profile or relationship. The friend
    /// count is refetched after friendship changes.
    pub async fn next_update(&mut self) -> Option<ProfileUpdated> {
        loop {
            let event = self.subscription.recv().await?;
            let friendships = matches!(event, RealtimeEvent::Change(ChangeEvent::Friendships(_)));
            let update = self.handle(event);
            if friendships {
                self.refresh_friend_count().await;
            }
            if update.is_some() {
                return update;
            }
        }
    }

    pub async fn send_request(&mut self) -> Result<FriendshipView, ClientError> {
        let viewer = self.require_viewer("send friend requests")?;
        match self.plan(viewer, FriendAction::Send)? {
            FriendEffect::Insert {
                requester_id,
                addressee_id,
            } => {
                let row = self.backend.insert_friendship(requester_id, addressee_id).await?;
                info!("Friend request {} -> {}", requester_id, addressee_id);
                self.friendship = Some(row);
            }
            effect => warn!("Unexpected effect {:?} for a request", effect),
        }
        Ok(self.friendship())
    }

    pub async fn accept(&mut self) -> Result<FriendshipView, ClientError> {
        let viewer = self.require_viewer("accept friend requests")?;
        if let FriendEffect::MarkAccepted { id } = self.plan(viewer, FriendAction::Accept)? {
            self.friendship = Some(self.backend.accept_friendship(id).await?);
            self.refresh_friend_count().await;
        }
        Ok(self.friendship())
    }

    pub async fn decline(&mut self) -> Result<FriendshipView, ClientError> {
        self.delete_with(FriendAction::Decline, "decline friend requests").await
    }

    pub async fn cancel(&mut self) -> Result<FriendshipView, ClientError> {
        self.delete_with(FriendAction::Cancel, "cancel friend requests").await
    }

    pub async fn remove(&mut self) -> Result<FriendshipView, ClientError> {
        let view = self.delete_with(FriendAction::Remove, "remove friends").await?;
        self.refresh_friend_count().await;
        Ok(view)
    }

    /// Change the name on the viewer's own profile.
    pub async fn rename(&mut self, name: &str) -> Result<&Profile, ClientError> {
        let owner = self.require_owner()?;
        let full_name = validate::profile_name(name)?;
        let update = ProfileUpdate {
            full_name: Some(full_name),
            ..Default::default()
        };
        let profile = self.backend.update_profile(owner, update).await?;
        Ok(self.keep(profile))
    }

    /// Upload a new avatar, then point the profile at it. If the upload
    /// fails the profile keeps its current avatar.
    pub async fn change_avatar(&mut self, image: PickedFile) -> Result<&Profile, ClientError> {
        let owner = self.require_owner()?;
        validate::image_upload(&image.mime_type, image.bytes.len())?;

        let path = format!(
            "{}/avatar-{}.{}",
            owner,
            Utc::now().timestamp_millis(),
            validate::file_extension(&image.file_name)
        );
        let file = self
            .backend
            .upload(Upload {
                path,
                mime_type: image.mime_type,
                bytes: image.bytes,
            })
            .await
            .inspect_err(|e| warn!("Avatar upload failed: {}", e))?;

        let update = ProfileUpdate {
            avatar_url: Some(file.public_url),
            ..Default::default()
        };
        let profile = self.backend.update_profile(owner, update).await?;
        Ok(self.keep(profile))
    }

    fn keep(&mut self, profile: Profile) -> &Profile {
        self.directory.store(profile.clone());
        self.profile.insert(profile)
    }

    fn plan(&self, viewer: Uuid, action: FriendAction) -> Result<FriendEffect, ClientError> {
        let row = self.friendship.as_ref();
        Ok(friendship::transition(row, viewer, self.subject, action)?)
    }

    async fn delete_with(&mut self, action: FriendAction, what: &'static str) -> Result<FriendshipView, ClientError> {
        let viewer = self.require_viewer(what)?;
        if let FriendEffect::Delete { id } = self.plan(viewer, action)? {
            self.backend.delete_friendship(id).await?;
            debug!("Friendship {} deleted ({:?})", id, action);
            self.friendship = None;
        }
        Ok(self.friendship())
    }

    async fn refresh_friend_count(&mut self) {
        match self.backend.count_friends(self.subject).await {
            Ok(count) => self.friend_count = count,
            Err(e) => warn!("Failed to count friends of {}: {}", self.subject, e),
        }
    }

    fn require_viewer(&self, what: &'static str) -> Result<Uuid, ClientError> {
        self.viewer.ok_or(ClientError::SignInRequired(what))
    }

    fn require_owner(&self) -> Result<Uuid, ClientError> {
        match self.viewer {
            Some(viewer) if viewer == self.subject => Ok(viewer),
            Some(_) => Err(ClientError::NotAllowed("only your own profile can be edited")),
            None => Err(ClientError::SignInRequired("edit your profile")),
        }
    }
}
