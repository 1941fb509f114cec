use std::collections::HashMap;

use placeconnect_types::events::{Change, ChangeEvent};
use placeconnect_types::models::Profile;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 256;

/// Profiles by id, evicting the least recently used entry once full.
#[derive(Debug)]
pub struct ProfileCache {
    capacity: usize,
    entries: HashMap<Uuid, Entry>,
    clock: u64,
}

#[derive(Debug)]
struct Entry {
    profile: Profile,
    last_used: u64,
}

impl ProfileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, id: Uuid) -> Option<&Profile> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(&id).map(|e| {
            e.last_used = clock;
            &e.profile
        })
    }

    pub fn insert(&mut self, profile: Profile) {
        self.clock += 1;
        if !self.entries.contains_key(&profile.id) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            profile.id,
            Entry {
                profile,
                last_used: self.clock,
            },
        );
    }

    pub fn invalidate(&mut self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Keep cached entries in line with the profiles change feed. Profiles that
    /// are not cached are left out; they get fetched on first use.
    pub fn observe(&mut self, event: &ChangeEvent) {
        let ChangeEvent::Profiles(change) = event else {
            return;
        };
        match change {
            Change::Insert(profile) | Change::Update(profile) => {
                if let Some(entry) = self.entries.get_mut(&profile.id) {
                    debug!("Refreshing cached profile {}", profile.id);
                    entry.profile = profile.clone();
                }
            }
            Change::Delete { id } => {
                self.invalidate(*id);
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| *id)
        {
            self.entries.remove(&oldest);
        }
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(n: u128, name: &str) -> Profile {
        Profile {
            id: Uuid::from_u128(n),
            full_name: Some(name.into()),
            avatar_url: None,
            email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ProfileCache::new(2);
        cache.insert(profile(1, "Ana"));
        cache.insert(profile(2, "Beka"));
        assert!(cache.get(Uuid::from_u128(1)).is_some());
        cache.insert(profile(3, "Zura"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(Uuid::from_u128(2)).is_none());
        assert!(cache.get(Uuid::from_u128(1)).is_some());
    }

    #[test]
    fn update_event_refreshes_cached_entry() {
        let mut cache = ProfileCache::new(4);
        cache.insert(profile(1, "Ana"));
        cache.observe(&ChangeEvent::Profiles(Change::Update(profile(1, "Ana B."))));
        cache.observe(&ChangeEvent::Profiles(Change::Update(profile(2, "Beka"))));
        assert_eq!(cache.get(Uuid::from_u128(1)).unwrap().display_name(), "Ana B.");
        assert!(cache.get(Uuid::from_u128(2)).is_none());
    }

    #[test]
    fn delete_event_invalidates() {
        let mut cache = ProfileCache::new(4);
        cache.insert(profile(1, "Ana"));
        cache.observe(&ChangeEvent::Profiles(Change::Delete { id: Uuid::from_u128(1) }));
        assert!(cache.is_empty());
    }
}
