mod common;

use std::time::Duration;

use uuid::Uuid;

use placeconnect_client::MemoryBackend;
use placeconnect_client::chat::ChatController;
use placeconnect_client::config::PROBE_LINGER;
use placeconnect_client::preview::{PreviewController, probe_occupancy};
use placeconnect_core::activity::ActivityTier;
use placeconnect_types::api::HISTORY_LIMIT;
use placeconnect_types::events::place_room;

use common::{guest, place, user};

#[tokio::test]
async fn probe_counts_without_joining_and_closes() {
    let backend = MemoryBackend::new();
    let cafe = place("Stamba");
    backend.seed_place(cafe.clone());

    assert_eq!(probe_occupancy(&backend, cafe.id, PROBE_LINGER).await.unwrap(), Some(0));

    let alice = Uuid::new_v4();
    let _alice = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let _nino = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    assert_eq!(probe_occupancy(&backend, cafe.id, PROBE_LINGER).await.unwrap(), Some(2));
    // Only the two chat channels remain; the probe is gone.
    assert_eq!(backend.subscriber_count(&place_room(cafe.id)), 2);
}

#[tokio::test]
async fn preview_reports_activity_tier() {
    let backend = MemoryBackend::new();
    let mut busy = place("Bassiani");
    busy.activity_level = 18;
    backend.seed_place(busy.clone());

    let mut preview = PreviewController::open(&backend, busy.clone(), Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(preview.online(), Some(0));
    assert_eq!(preview.activity(), ActivityTier::Busy);
    assert_eq!(preview.activity().label(), "Busy");

    let mut quieter = busy.clone();
    quieter.activity_level = 4;
    preview.refresh(&quieter);
    assert_eq!(preview.activity(), ActivityTier::Low);

    // Updates for other places are ignored.
    preview.refresh(&place("Elsewhere"));
    assert_eq!(preview.place().id, busy.id);

    assert_eq!(preview.reprobe(&backend, PROBE_LINGER).await.unwrap(), Some(0));
    assert_eq!(backend.subscriber_count(&place_room(busy.id)), 0);
}
