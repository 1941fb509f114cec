use std::collections::BTreeMap;

use placeconnect_types::events::{PresenceMeta, PresenceSnapshot};
use tracing::{debug, warn};

/// Members currently connected to one presence room.
///
/// Every snapshot replaces the previous membership; nothing is tracked
/// incrementally.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoom {
    topic: String,
    members: BTreeMap<String, PresenceMeta>,
}

impl PresenceRoom {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Replace the member set. Returns false if the snapshot was for another room.
    pub fn apply_snapshot(&mut self, snapshot: PresenceSnapshot) -> bool {
        if snapshot.topic != self.topic {
            warn!(
                "Dropping presence snapshot for {} on room {}",
                snapshot.topic, self.topic
            );
            return false;
        }

        // Same identity on several connections counts once; keep its earliest join.
        let mut members: BTreeMap<String, PresenceMeta> = BTreeMap::new();
        for meta in snapshot.members {
            match members.get(&meta.key) {
                Some(existing) if existing.online_at <= meta.online_at => {}
                _ => {
                    members.insert(meta.key.clone(), meta);
                }
            }
        }

        debug!("Presence {}: {} -> {} online", self.topic, self.members.len(), members.len());
        self.members = members;
        true
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    /// Display names in join order.
    pub fn display_names(&self) -> Vec<String> {
        let mut members: Vec<&PresenceMeta> = self.members.values().collect();
        members.sort_by(|a, b| a.online_at.cmp(&b.online_at).then_with(|| a.key.cmp(&b.key)));
        members.into_iter().map(|m| m.display_name.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
