//! In-process gateway used by tests and by local runs without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::ConnectionGateway;
use crate::db::StoreResult;
use crate::db::models::connection::{
    ConnectionEvent, ConnectionFilter, ConnectionKey, EventOrder, NewConnectionEvent, UserId,
};
use crate::db::models::profile::Profile;

#[derive(Debug, Default)]
pub struct MemoryGateway {
    events: Mutex<Vec<ConnectionEvent>>,
    profiles: Mutex<HashMap<UserId, Profile>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let gateway = Self::new();
        for profile in profiles {
            gateway.upsert_profile(profile);
        }
        gateway
    }

    pub fn upsert_profile(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(profile.id.clone(), profile);
    }

    /// Writes an event without the once-per-day check, for seeding fixtures.
    pub fn seed(&self, event: ConnectionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ConnectionGateway for MemoryGateway {
    async fn find_one(&self, key: &ConnectionKey) -> StoreResult<Option<ConnectionEvent>> {
        let events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        Ok(events.iter().find(|e| e.key() == *key).cloned())
    }

    async fn insert(&self, event: &NewConnectionEvent) -> StoreResult<Option<ConnectionEvent>> {
        let key = event.key();

        // check and write under one guard
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if events.iter().any(|e| e.key() == key) {
            return Ok(None);
        }

        let stored = event.clone().into_event();
        events.push(stored.clone());
        Ok(Some(stored))
    }

    async fn find_many(&self, filter: &ConnectionFilter) -> StoreResult<Vec<ConnectionEvent>> {
        let mut found: Vec<ConnectionEvent> = self
            .events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        match filter.order {
            EventOrder::ConnectionDateDesc => found.sort_by(|a, b| {
                b.connection_date
                    .cmp(&a.connection_date)
                    .then(b.created_at.cmp(&a.created_at))
            }),
            EventOrder::PointsDesc => found.sort_by(|a, b| {
                b.points_earned
                    .cmp(&a.points_earned)
                    .then(a.created_at.cmp(&b.created_at))
            }),
        }

        Ok(found)
    }

    async fn find_profiles(&self, ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        let profiles = self.profiles.lock().unwrap_or_else(|p| p.into_inner());
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }
}
