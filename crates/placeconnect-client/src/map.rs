use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use placeconnect_core::expiry::{self, ExpiryChoice};
use placeconnect_core::reconcile::{self, Applied};
use placeconnect_core::ValidationError;
use placeconnect_core::validate::{self, PlaceForm};
use placeconnect_store::Store;
use placeconnect_types::api::{ChannelSpec, NewPlace, Upload};
use placeconnect_types::events::{Change, ChangeEvent, ChangeFilter, RealtimeEvent, Table};
use placeconnect_types::models::{Identity, Place};

use crate::PickedFile;
use crate::backend::{Backend, Subscription};
use crate::config::ClientConfig;
use crate::error::ClientError;

const PLACES_TOPIC: &str = "places-activity";

/// Category tag given to places users create themselves.
pub const CUSTOM_KIND: &str = "custom";

/// What changed on the map after one step of the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapUpdate {
    Place { id: Uuid, applied: Applied },
    Expired(Vec<Uuid>),
}

/// Input of the create-place form.
#[derive(Debug, Clone)]
pub struct PlaceDraft {
    pub name: String,
    pub bio: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<PickedFile>,
    pub temporary: bool,
    pub expiry: Option<ExpiryChoice>,
}

/// Narrowing of the visible places.
#[derive(Debug, Clone, Default)]
pub struct PlaceFilter {
    pub favorites_only: bool,
    /// Case-insensitive match on name or category
    pub query: Option<String>,
}

pub struct MapController<B> {
    backend: B,
    store: Arc<Store>,
    places: Vec<Place>,
    favorites: HashSet<Uuid>,
    subscription: Subscription,
    sweep: Interval,
}

impl<B: Backend> MapController<B> {
    /// Load every place, hide the expired ones, and start listening for changes.
    pub async fn open(backend: B, store: Arc<Store>, config: &ClientConfig) -> Result<Self, ClientError> {
        // Subscribe first so nothing written during the load is missed; the
        // reconciler absorbs the overlap.
        let subscription = backend.subscribe(
            ChannelSpec::new(PLACES_TOPIC).listen(ChangeFilter::table(Table::Places)),
        )?;

        let mut places = reconcile::from_snapshot(backend.load_places().await?);
        let expired = expiry::retain_live(&mut places, Utc::now());
        info!("Loaded {} places ({} expired hidden)", places.len(), expired.len());

        let favorites = store.favorites()?.into_iter().collect();

        let period = config.sweep_interval;
        let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            backend,
            store,
            places,
            favorites,
            subscription,
            sweep,
        })
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn place(&self, id: Uuid) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }

    pub fn visible(&self, filter: &PlaceFilter) -> Vec<&Place> {
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        self.places
            .iter()
            .filter(|p| !filter.favorites_only || self.favorites.contains(&p.id))
            .filter(|p| match &query {
                Some(q) => p.name.to_lowercase().contains(q) || p.kind.to_lowercase().contains(q),
                None => true,
            })
            .collect()
    }

    pub fn is_favorite(&self, id: Uuid) -> bool {
        self.favorites.contains(&id)
    }

    pub fn toggle_favorite(&mut self, id: Uuid) -> Result<bool, ClientError> {
        let now_favorite = self.store.toggle_favorite(id)?;
        if now_favorite {
            self.favorites.insert(id);
        } else {
            self.favorites.remove(&id);
        }
        Ok(now_favorite)
    }

    /// Fold one realtime event into the place list.
    pub fn handle(&mut self, event: RealtimeEvent) -> Option<MapUpdate> {
        let RealtimeEvent::Change(ChangeEvent::Places(change)) = event else {
            return None;
        };
        let id = match &change {
            Change::Insert(p) | Change::Update(p) => p.id,
            Change::Delete { id } => *id,
        };
        let applied = reconcile::apply(&mut self.places, change);
        debug!("Place {} change: {:?}", id, applied);
        Some(MapUpdate::Place { id, applied })
    }

    /// Hide places whose expiry has passed by `now`.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        expiry::retain_live(&mut self.places, now)
    }

    /// Wait for the next change or sweep. `None` once the channel is gone.
    pub async fn next_update(&mut self) -> Option<MapUpdate> {
        loop {
            tokio::select! {
                event = self.subscription.recv() => {
                    let event = event?;
                    if let Some(update) = self.handle(event) {
                        return Some(update);
                    }
                }
                _ = self.sweep.tick() => {
                    let expired = self.sweep_expired(Utc::now());
                    if !expired.is_empty() {
                        return Some(MapUpdate::Expired(expired));
                    }
                }
            }
        }
    }

    /// Validate the form, upload the image, then create the place.
    ///
    /// Nothing is created if the upload fails.
    pub async fn create_place(&mut self, creator: &Identity, draft: PlaceDraft) -> Result<Place, ClientError> {
        let user_id = creator
            .user_id()
            .ok_or(ClientError::SignInRequired("create a place"))?;

        let form = PlaceForm {
            name: draft.name,
            bio: draft.bio,
            has_image: draft.image.is_some(),
            temporary: draft.temporary,
            expiry: draft.expiry,
        };
        let valid = form.validate(&Local::now())?;
        let image = draft.image.ok_or(ValidationError::MissingImage)?;
        validate::image_upload(&image.mime_type, image.bytes.len())?;

        let path = format!(
            "place-images/{}/{}.{}",
            user_id,
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
            .inspect_err(|e| warn!("Place image upload failed: {}", e))?;

        let place = self
            .backend
            .insert_place(NewPlace {
                name: valid.name,
                kind: CUSTOM_KIND.to_string(),
                latitude: draft.latitude,
                longitude: draft.longitude,
                description: valid.bio.clone(),
                bio: valid.bio,
                image_url: Some(file.public_url),
                created_by: user_id,
                is_temporary: draft.temporary,
                expires_at: valid.expires_at,
            })
            .await?;

        reconcile::apply(&mut self.places, Change::Insert(place.clone()));
        Ok(place)
    }

    /// Replace the image of a place the user created.
    pub async fn change_place_image(
        &mut self,
        owner: &Identity,
        place_id: Uuid,
        image: PickedFile,
    ) -> Result<String, ClientError> {
        let user_id = owner
            .user_id()
            .ok_or(ClientError::SignInRequired("edit a place"))?;
        if self.place(place_id).and_then(|p| p.created_by) != Some(user_id) {
            return Err(ClientError::NotAllowed("only the creator can change the image"));
        }
        validate::image_upload(&image.mime_type, image.bytes.len())?;

        let path = format!(
            "place-images/{}/{}.{}",
            user_id,
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
            .await?;
        self.backend
            .update_place_image(place_id, file.public_url.clone())
            .await?;

        if let Some(place) = self.places.iter_mut().find(|p| p.id == place_id) {
            place.image_url = Some(file.public_url.clone());
        }
        Ok(file.public_url)
    }
}
