mod common;

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use placeconnect_client::chat::{ChatController, ChatUpdate};
use placeconnect_client::{Backend, ClientError, MemoryBackend, PickedFile};
use placeconnect_core::reconcile::Applied;
use placeconnect_types::api::{HISTORY_LIMIT, NewMessage};
use placeconnect_types::events::{Change, ChangeEvent, RealtimeEvent};
use placeconnect_types::models::{Message, MessageContent, Place, Reaction};

use common::{guest, place, user, within};

fn setup() -> (MemoryBackend, Place) {
    let backend = MemoryBackend::new();
    let cafe = place("Linville");
    backend.seed_place(cafe.clone());
    (backend, cafe)
}

/// Pump updates until the room reports `online` members.
async fn until_online<B: Backend>(chat: &mut ChatController<B>, online: usize) {
    loop {
        if let Some(ChatUpdate::Presence { online: n }) = within(chat.next_update()).await {
            if n == online {
                return;
            }
        }
    }
}

#[tokio::test]
async fn presence_follows_open_channels() {
    let (backend, cafe) = setup();
    let alice = Uuid::new_v4();

    let mut alice_chat = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    until_online(&mut alice_chat, 1).await;

    let guest_chat = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    until_online(&mut alice_chat, 2).await;
    assert_eq!(alice_chat.online_names(), vec!["Alice", "nino"]);

    drop(guest_chat);
    until_online(&mut alice_chat, 1).await;
    assert_eq!(alice_chat.online_count(), 1);
}

#[tokio::test]
async fn same_identity_twice_counts_once() {
    let (backend, cafe) = setup();
    let alice = Uuid::new_v4();

    let mut phone = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let _laptop = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    // Both snapshots (one and two connections) report a single member.
    until_online(&mut phone, 1).await;
    until_online(&mut phone, 1).await;
    assert_eq!(backend.subscriber_count(&placeconnect_types::events::place_room(cafe.id)), 2);
}

#[tokio::test]
async fn history_is_capped_and_ascending() {
    let (backend, cafe) = setup();
    let poster = backend.as_guest();
    for i in 0..60 {
        poster
            .insert_message(NewMessage {
                place_id: cafe.id,
                author: guest("nino").as_author(),
                content: MessageContent::Text(format!("message {i}")),
            })
            .await
            .unwrap();
    }

    let chat = ChatController::open(backend.as_guest(), guest("tamar"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    let texts: Vec<&MessageContent> = chat.messages().iter().map(|m| &m.content).collect();
    assert_eq!(texts.len(), 50);
    assert_eq!(texts[0], &MessageContent::Text("message 10".into()));
    assert_eq!(texts[49], &MessageContent::Text("message 59".into()));
}

#[tokio::test]
async fn guests_can_chat_and_sending_bumps_activity() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    let sent = chat.send_text("  gamarjoba  ").await.unwrap();
    assert_eq!(sent.content, MessageContent::Text("gamarjoba".into()));
    assert_eq!(sent.author.display_name(), "nino");
    assert_eq!(chat.messages().len(), 1);

    let stored = backend.place(cafe.id).unwrap();
    assert_eq!(stored.activity_level, 1);
    assert!(stored.last_activity.is_some());

    // The echo of our own insert is a no-op.
    loop {
        if let Some(ChatUpdate::Message { id, applied }) = within(chat.next_update()).await {
            assert_eq!(id, sent.id);
            assert_eq!(applied, Applied::Ignored);
            break;
        }
    }
    assert_eq!(chat.messages().len(), 1);
}

#[tokio::test]
async fn invalid_messages_never_reach_the_backend() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    assert!(chat.send_text("   ").await.unwrap_err().is_validation());
    assert!(chat.send_text(&"a".repeat(501)).await.unwrap_err().is_validation());

    let pdf = PickedFile {
        file_name: "menu.pdf".into(),
        mime_type: "application/pdf".into(),
        bytes: Bytes::from_static(b"%PDF"),
    };
    assert!(chat.send_media(pdf).await.unwrap_err().is_validation());

    assert!(backend.recent_messages(cafe.id, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn media_messages_reference_the_upload() {
    let (backend, cafe) = setup();
    let alice = Uuid::new_v4();
    let mut chat = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    let clip = PickedFile {
        file_name: "dance.mp4".into(),
        mime_type: "video/mp4".into(),
        bytes: Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"),
    };
    let sent = chat.send_media(clip).await.unwrap();

    let MessageContent::Media(media) = &sent.content else {
        panic!("expected media, got {:?}", sent.content);
    };
    assert!(media.is_video());
    assert!(media.url.contains(&format!("chat-media/{}/", cafe.id)));
    assert!(media.url.ends_with(".mp4"));
}

#[tokio::test]
async fn only_authors_retract_their_messages() {
    let (backend, cafe) = setup();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let mut alice_chat = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let mut bob_chat = ChatController::open(backend.as_user(bob), user(bob, "Bob"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let mut guest_chat = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();

    let message = alice_chat.send_text("wrong room, sorry").await.unwrap();

    // Let the others see it.
    for chat in [&mut bob_chat, &mut guest_chat] {
        loop {
            if let Some(ChatUpdate::Message { id, .. }) = within(chat.next_update()).await {
                assert_eq!(id, message.id);
                break;
            }
        }
    }

    let err = bob_chat.retract(message.id).await.unwrap_err();
    assert!(matches!(err, ClientError::NotAllowed(_)));
    let err = guest_chat.retract(message.id).await.unwrap_err();
    assert!(matches!(err, ClientError::SignInRequired(_)));

    alice_chat.retract(message.id).await.unwrap();
    assert!(alice_chat.messages()[0].is_retracted());

    loop {
        if let Some(ChatUpdate::Message { applied, .. }) = within(bob_chat.next_update()).await {
            assert_eq!(applied, Applied::Updated);
            break;
        }
    }
    assert!(bob_chat.messages()[0].is_retracted());
}

#[tokio::test]
async fn reaction_toggles_twice_back_to_nothing() {
    let (backend, cafe) = setup();
    let alice = Uuid::new_v4();
    let mut chat = ChatController::open(backend.as_user(alice), user(alice, "Alice"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let message = chat.send_text("khachapuri?").await.unwrap();

    assert!(chat.toggle_reaction(message.id, "🔥").await.unwrap());
    let groups = chat.reaction_groups(message.id);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 1);
    assert_eq!(groups[0].user_ids, vec![alice]);

    assert!(!chat.toggle_reaction(message.id, "🔥").await.unwrap());
    assert!(chat.reaction_groups(message.id).is_empty());
    assert!(backend.reactions_for(vec![message.id]).await.unwrap().is_empty());
}

#[tokio::test]
async fn guests_cannot_react() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("nino"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let message = chat.send_text("hi").await.unwrap();

    let err = chat.toggle_reaction(message.id, "👍").await.unwrap_err();
    assert!(matches!(err, ClientError::SignInRequired(_)));
}

#[tokio::test]
async fn switching_rooms_moves_presence() {
    let backend = MemoryBackend::new();
    let first = place("First");
    let second = place("Second");
    backend.seed_place(first.clone());
    backend.seed_place(second.clone());

    let mut chat = ChatController::open(backend.as_guest(), guest("nino"), first.id, HISTORY_LIMIT)
        .await
        .unwrap();
    chat.send_text("leaving soon").await.unwrap();

    chat.switch_place(second.id).await.unwrap();

    use placeconnect_types::events::place_room;
    assert_eq!(backend.subscriber_count(&place_room(first.id)), 0);
    assert_eq!(backend.subscriber_count(&place_room(second.id)), 1);
    assert_eq!(chat.place_id(), second.id);
    assert!(chat.messages().is_empty());
    until_online(&mut chat, 1).await;
}

fn message_in(place_id: Uuid, text: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        place_id,
        author: guest("nino").as_author(),
        content: MessageContent::Text(text.to_string()),
        created_at: Utc::now(),
    }
}

fn reaction_on(message_id: Uuid, user_id: Uuid, emoji: &str) -> Reaction {
    Reaction {
        id: Uuid::new_v4(),
        message_id,
        user_id,
        emoji: emoji.to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn reaction_arriving_before_its_message_is_kept() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("tamar"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let bob = Uuid::new_v4();
    let message = message_in(cafe.id, "who is coming?");
    let early = reaction_on(message.id, bob, "🙋");

    let held = chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Insert(early.clone()))));
    assert_eq!(held, None);
    assert!(chat.reaction_groups(message.id).is_empty());

    chat.handle(RealtimeEvent::Change(ChangeEvent::Messages(Change::Insert(message.clone()))));
    let groups = chat.reaction_groups(message.id);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 1);
    assert_eq!(groups[0].user_ids, vec![bob]);

    // A late duplicate of the reaction changes nothing.
    let again = chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Insert(early))));
    assert!(matches!(again, Some(ChatUpdate::Reaction { applied: Applied::Ignored, .. })));
    assert_eq!(chat.reaction_groups(message.id)[0].count, 1);
}

#[tokio::test]
async fn early_reaction_deleted_before_its_message_stays_gone() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("tamar"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let message = message_in(cafe.id, "anyone?");
    let early = reaction_on(message.id, Uuid::new_v4(), "👀");

    chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Insert(early.clone()))));
    chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Delete { id: early.id })));
    chat.handle(RealtimeEvent::Change(ChangeEvent::Messages(Change::Insert(message.clone()))));

    assert!(chat.reaction_groups(message.id).is_empty());
}

#[tokio::test]
async fn deleting_a_message_drops_its_reactions() {
    let (backend, cafe) = setup();
    let mut chat = ChatController::open(backend.as_guest(), guest("tamar"), cafe.id, HISTORY_LIMIT)
        .await
        .unwrap();
    let message = message_in(cafe.id, "short-lived");
    let reaction = reaction_on(message.id, Uuid::new_v4(), "👍");

    chat.handle(RealtimeEvent::Change(ChangeEvent::Messages(Change::Insert(message.clone()))));
    chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Insert(reaction.clone()))));
    assert_eq!(chat.reaction_groups(message.id).len(), 1);

    let update = chat.handle(RealtimeEvent::Change(ChangeEvent::Messages(Change::Delete { id: message.id })));
    assert_eq!(
        update,
        Some(ChatUpdate::Message {
            id: message.id,
            applied: Applied::Removed
        })
    );
    assert!(chat.reaction_groups(message.id).is_empty());

    // Its delete arriving afterwards is a no-op.
    let late = chat.handle(RealtimeEvent::Change(ChangeEvent::Reactions(Change::Delete { id: reaction.id })));
    assert!(matches!(late, Some(ChatUpdate::Reaction { applied: Applied::Ignored, .. })));
}
