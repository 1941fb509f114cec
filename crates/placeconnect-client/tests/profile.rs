mod common;

use uuid::Uuid;

use placeconnect_client::profile::{ProfileController, ProfileDirectory, ProfileUpdated};
use placeconnect_client::{Backend, BackendError, ClientError, MemoryBackend};
use placeconnect_types::api::ProfileUpdate;

use common::{png, profile, user, within};

async fn own_profile(backend: &MemoryBackend, id: Uuid, directory: ProfileDirectory) -> ProfileController<MemoryBackend> {
    ProfileController::open(backend.as_user(id), directory, Some(&user(id, "Alice")), id)
        .await
        .unwrap()
}

#[tokio::test]
async fn failed_avatar_upload_keeps_the_old_one() {
    let backend = MemoryBackend::new();
    let alice = Uuid::new_v4();
    let mut seeded = profile(alice, "Alice");
    seeded.avatar_url = Some("https://cdn.example.com/old.png".into());
    backend.seed_profile(seeded);

    let mut page = own_profile(&backend, alice, ProfileDirectory::default()).await;

    backend.set_fail_uploads(true);
    let err = page.change_avatar(png("new.png")).await.unwrap_err();
    assert!(matches!(err, ClientError::Backend(BackendError::Upload(_))));

    let old = Some("https://cdn.example.com/old.png");
    assert_eq!(page.profile().unwrap().avatar_url.as_deref(), old);
    let stored = backend.fetch_profile(alice).await.unwrap().unwrap();
    assert_eq!(stored.avatar_url.as_deref(), old);

    backend.set_fail_uploads(false);
    let updated = page.change_avatar(png("new.png")).await.unwrap();
    let url = updated.avatar_url.clone().unwrap();
    assert!(url.contains(&format!("/{alice}/avatar-")));
    assert!(url.ends_with(".png"));
}

#[tokio::test]
async fn avatar_must_be_a_small_image() {
    let backend = MemoryBackend::new();
    let alice = Uuid::new_v4();
    backend.seed_profile(profile(alice, "Alice"));
    let mut page = own_profile(&backend, alice, ProfileDirectory::default()).await;

    let mut huge = png("huge.png");
    huge.bytes = vec![0u8; 5 * 1024 * 1024 + 1].into();
    assert!(page.change_avatar(huge).await.unwrap_err().is_validation());

    let mut text = png("notes.txt");
    text.mime_type = "text/plain".into();
    assert!(page.change_avatar(text).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn rename_only_own_profile() {
    let backend = MemoryBackend::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    backend.seed_profile(profile(alice, "Alice"));
    backend.seed_profile(profile(bob, "Bob"));

    let mut page = own_profile(&backend, alice, ProfileDirectory::default()).await;
    assert!(page.rename("   ").await.unwrap_err().is_validation());
    assert!(page.rename(&"x".repeat(51)).await.unwrap_err().is_validation());
    assert_eq!(page.rename("  Alice K.  ").await.unwrap().full_name.as_deref(), Some("Alice K."));
    assert_eq!(page.display_name(), "Alice K.");

    let mut bobs = ProfileController::open(
        backend.as_user(alice),
        ProfileDirectory::default(),
        Some(&user(alice, "Alice")),
        bob,
    )
    .await
    .unwrap();
    assert!(!bobs.is_own());
    assert!(matches!(bobs.rename("Robert").await.unwrap_err(), ClientError::NotAllowed(_)));
}

#[tokio::test]
async fn directory_is_shared_and_follows_changes() {
    let backend = MemoryBackend::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    backend.seed_profile(profile(alice, "Alice"));
    backend.seed_profile(profile(bob, "Bob"));

    let directory = ProfileDirectory::new(8);
    let mut bobs_page = ProfileController::open(
        backend.as_user(alice),
        directory.clone(),
        Some(&user(alice, "Alice")),
        bob,
    )
    .await
    .unwrap();
    assert_eq!(bobs_page.display_name(), "Bob");
    assert_eq!(directory.cached(bob).unwrap().full_name.as_deref(), Some("Bob"));

    backend
        .as_user(bob)
        .update_profile(
            bob,
            ProfileUpdate {
                full_name: Some("Bobby".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(within(bobs_page.next_update()).await, Some(ProfileUpdated::Profile));
    assert_eq!(bobs_page.display_name(), "Bobby");
    assert_eq!(directory.cached(bob).unwrap().full_name.as_deref(), Some("Bobby"));
}

#[tokio::test]
async fn unknown_profile_shows_anonymous() {
    let backend = MemoryBackend::new();
    let page = ProfileController::open(backend.as_guest(), ProfileDirectory::default(), None, Uuid::new_v4())
        .await
        .unwrap();
    assert!(page.profile().is_none());
    assert_eq!(page.display_name(), "Anonymous");
    assert_eq!(page.friend_count(), 0);
}
