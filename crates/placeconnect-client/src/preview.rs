use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use placeconnect_core::activity::{ActivityLevel, ActivityTier};
use placeconnect_core::presence::PresenceRoom;
use placeconnect_types::api::ChannelSpec;
use placeconnect_types::events::{RealtimeEvent, place_room};
use placeconnect_types::models::Place;

use crate::backend::Backend;
use crate::error::BackendError;

/// Count who is in a place's chat room without joining it.
///
/// Opens an observe-only channel on the room, waits up to `linger` for the
/// first presence snapshot, then closes the channel. `None` means no snapshot
/// arrived in time.
pub async fn probe_occupancy<B: Backend>(
    backend: &B,
    place_id: Uuid,
    linger: Duration,
) -> Result<Option<usize>, BackendError> {
    let topic = place_room(place_id);
    let mut subscription = backend.subscribe(ChannelSpec::new(topic.clone()).observe_presence())?;
    let mut room = PresenceRoom::new(topic);

    let snapshot = tokio::time::timeout(linger, async {
        while let Some(event) = subscription.recv().await {
            if let RealtimeEvent::PresenceSync(snapshot) = event {
                if room.apply_snapshot(snapshot) {
                    return Some(room.count());
                }
            }
        }
        None
    })
    .await;

    drop(subscription);
    match snapshot {
        Ok(count) => Ok(count),
        Err(_) => {
            debug!("No presence snapshot for {} within {:?}", place_id, linger);
            Ok(None)
        }
    }
}

/// The bottom sheet shown when a place is tapped on the map.
#[derive(Debug, Clone)]
pub struct PreviewController {
    place: Place,
    online: Option<usize>,
}

impl PreviewController {
    pub fn new(place: Place) -> Self {
        Self { place, online: None }
    }

    /// Preview `place` and probe its room once.
    pub async fn open<B: Backend>(backend: &B, place: Place, linger: Duration) -> Result<Self, BackendError> {
        let online = probe_occupancy(backend, place.id, linger).await?;
        Ok(Self { place, online })
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    /// People in the room when it was last probed.
    pub fn online(&self) -> Option<usize> {
        self.online
    }

    pub fn activity(&self) -> ActivityTier {
        ActivityLevel::new(self.place.activity_level).tier()
    }

    /// Take a newer version of the previewed place, e.g. from the map feed.
    pub fn refresh(&mut self, place: &Place) {
        if place.id == self.place.id {
            self.place = place.clone();
        }
    }

    pub async fn reprobe<B: Backend>(&mut self, backend: &B, linger: Duration) -> Result<Option<usize>, BackendError> {
        self.online = probe_occupancy(backend, self.place.id, linger).await?;
        Ok(self.online)
    }
}
