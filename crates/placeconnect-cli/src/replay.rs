//! Folding a recorded realtime feed (one JSON event per line) into the state
//! a client would end up showing.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use placeconnect_core::expiry;
use placeconnect_core::presence::PresenceRoom;
use placeconnect_core::reconcile;
use placeconnect_types::events::{ChangeEvent, RealtimeEvent};
use placeconnect_types::models::{Message, Place, Reaction};

#[derive(Debug, Default)]
pub struct Replay {
    places: Vec<Place>,
    messages: Vec<Message>,
    reactions: Vec<Reaction>,
    rooms: HashMap<String, PresenceRoom>,
    events: usize,
    ignored: usize,
    skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub places: Vec<Place>,
    pub expired: Vec<Uuid>,
    pub messages: BTreeMap<Uuid, usize>,
    pub reactions: usize,
    pub online: BTreeMap<String, usize>,
    pub events: usize,
    /// Changes that were duplicates or deletes of unknown rows
    pub ignored: usize,
    /// Lines that did not parse
    pub skipped: usize,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the recording. Blank lines are ignored, malformed
    /// ones are logged and counted.
    pub fn feed_line(&mut self, line_no: usize, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<RealtimeEvent>(line) {
            Ok(event) => self.apply(event),
            Err(e) => {
                warn!("Skipping line {}: {}", line_no, e);
                self.skipped += 1;
            }
        }
    }

    pub fn apply(&mut self, event: RealtimeEvent) {
        self.events += 1;
        let applied = match event {
            RealtimeEvent::Change(ChangeEvent::Places(change)) => reconcile::apply(&mut self.places, change),
            RealtimeEvent::Change(ChangeEvent::Messages(change)) => reconcile::apply(&mut self.messages, change),
            RealtimeEvent::Change(ChangeEvent::Reactions(change)) => {
                reconcile::apply(&mut self.reactions, change)
            }
            RealtimeEvent::Change(other) => {
                debug!("Not tracking {:?} changes", other.table());
                return;
            }
            RealtimeEvent::PresenceSync(snapshot) => {
                self.rooms
                    .entry(snapshot.topic.clone())
                    .or_insert_with(|| PresenceRoom::new(snapshot.topic.clone()))
                    .apply_snapshot(snapshot);
                return;
            }
        };
        if !applied.changed() {
            self.ignored += 1;
        }
    }

    /// Drop places expired by `now` and summarise what is left.
    pub fn finish(mut self, now: DateTime<Utc>) -> ReplaySummary {
        let expired = expiry::retain_live(&mut self.places, now);

        let mut messages: BTreeMap<Uuid, usize> = BTreeMap::new();
        for message in &self.messages {
            *messages.entry(message.place_id).or_default() += 1;
        }
        let online = self
            .rooms
            .iter()
            .map(|(topic, room)| (topic.clone(), room.count()))
            .collect();

        ReplaySummary {
            places: self.places,
            expired,
            messages,
            reactions: self.reactions.len(),
            online,
            events: self.events,
            ignored: self.ignored,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use placeconnect_types::events::Change;
    use placeconnect_types::models::{Author, MessageContent};

    fn place(name: &str, expires_at: Option<DateTime<Utc>>) -> Place {
        Place {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: "cafe".into(),
            latitude: 41.7,
            longitude: 44.8,
            address: None,
            description: None,
            bio: None,
            image_url: None,
            activity_level: 0,
            last_activity: None,
            is_temporary: expires_at.is_some(),
            expires_at,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn line(event: &RealtimeEvent) -> String {
        serde_json::to_string(event).unwrap()
    }

    #[test]
    fn duplicated_feed_converges() {
        let cafe = place("Cafe", None);
        let message = Message {
            id: Uuid::new_v4(),
            place_id: cafe.id,
            author: Author::Guest {
                display_name: "nino".into(),
            },
            content: MessageContent::Text("hi".into()),
            created_at: Utc::now(),
        };
        let events = [
            RealtimeEvent::Change(ChangeEvent::Places(Change::Insert(cafe.clone()))),
            RealtimeEvent::Change(ChangeEvent::Messages(Change::Insert(message.clone()))),
            RealtimeEvent::Change(ChangeEvent::Messages(Change::Insert(message))),
            RealtimeEvent::Change(ChangeEvent::Places(Change::Insert(cafe.clone()))),
        ];

        let mut replay = Replay::new();
        for (i, event) in events.iter().enumerate() {
            replay.feed_line(i + 1, &line(event));
        }
        let summary = replay.finish(Utc::now());

        assert_eq!(summary.places.len(), 1);
        assert_eq!(summary.messages.get(&cafe.id), Some(&1));
        assert_eq!(summary.events, 4);
        assert_eq!(summary.ignored, 2);
    }

    #[test]
    fn expired_places_are_dropped_at_the_end() {
        let now = Utc::now();
        let popup = place("Pop-up", Some(now - Duration::minutes(1)));
        let park = place("Park", None);

        let mut replay = Replay::new();
        replay.apply(RealtimeEvent::Change(ChangeEvent::Places(Change::Insert(popup.clone()))));
        replay.apply(RealtimeEvent::Change(ChangeEvent::Places(Change::Insert(park.clone()))));
        let summary = replay.finish(now);

        assert_eq!(summary.expired, vec![popup.id]);
        assert_eq!(summary.places.iter().map(|p| p.id).collect::<Vec<_>>(), vec![park.id]);
    }

    #[test]
    fn malformed_lines_are_counted() {
        let mut replay = Replay::new();
        replay.feed_line(1, "{not json");
        replay.feed_line(2, "   ");
        let summary = replay.finish(Utc::now());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.events, 0);
    }
}
