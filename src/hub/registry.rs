use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionSender;

/// Opaque connection identifier, assigned at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Generate a fresh id (UUIDv7, so ids sort by connect time).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Role a party currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Broadcaster,
    Admin,
}

/// One connected party.
#[derive(Debug, Clone)]
pub struct Party {
    pub id: PartyId,
    pub role: Role,
    /// Set only by a successful broadcaster login.
    pub authenticated: bool,
    /// Set by a successful admin login; survives broadcasting.
    pub admin: bool,
    /// Identity returned by the verifier on the last successful broadcaster login.
    pub principal: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl Party {
    pub fn new(id: PartyId) -> Self {
        Self {
            id,
            role: Role::Viewer,
            authenticated: false,
            admin: false,
            principal: None,
            connected_at: Utc::now(),
        }
    }

    pub fn is_broadcaster(&self) -> bool {
        self.role == Role::Broadcaster
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Role to fall back to once the party stops broadcasting.
    pub fn resting_role(&self) -> Role {
        if self.admin {
            Role::Admin
        } else {
            Role::Viewer
        }
    }

    /// Admin-facing view of this party.
    pub fn view(&self) -> PartyView {
        PartyView {
            role: self.role,
            is_broadcaster: self.is_broadcaster(),
            is_admin: self.admin,
            authenticated: self.authenticated,
            connected_at: self.connected_at,
        }
    }
}

/// Serialized shape of a party inside the admin `user-list` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyView {
    pub role: Role,
    pub is_broadcaster: bool,
    pub is_admin: bool,
    pub authenticated: bool,
    pub connected_at: DateTime<Utc>,
}

struct Entry {
    party: Party,
    tx: ConnectionSender,
}

/// Every connected party plus the channel used to push events to it.
///
/// Not synchronized on its own; the [`Hub`](super::Hub) owns it behind its lock.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<PartyId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. An existing entry with the same id is replaced.
    pub fn insert(&mut self, id: PartyId, tx: ConnectionSender) {
        let party = Party::new(id.clone());
        if self.entries.insert(id.clone(), Entry { party, tx }).is_some() {
            tracing::warn!(party_id = %id, "Replaced existing registry entry");
        }
    }

    pub fn remove(&mut self, id: &PartyId) -> Option<Party> {
        self.entries.remove(id).map(|entry| entry.party)
    }

    pub fn get(&self, id: &PartyId) -> Option<&Party> {
        self.entries.get(id).map(|entry| &entry.party)
    }

    pub fn get_mut(&mut self, id: &PartyId) -> Option<&mut Party> {
        self.entries.get_mut(id).map(|entry| &mut entry.party)
    }

    pub fn contains(&self, id: &PartyId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All parties keyed by id, in id order.
    pub fn all(&self) -> BTreeMap<PartyId, Party> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.party.clone()))
            .collect()
    }

    /// Push an event to a single party. Returns false if the party is unknown.
    /// A closed channel is not an error: the actor is already tearing down.
    pub fn send_to(&self, id: &PartyId, event: ServerEvent) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                let _ = entry.tx.send(event);
                true
            }
            None => false,
        }
    }

    /// Push an event to every connected party.
    pub fn broadcast_to_all(&self, event: &ServerEvent) {
        for entry in self.entries.values() {
            let _ = entry.tx.send(event.clone());
        }
    }

    /// Push an event to every connected party except `excluded`.
    pub fn broadcast_except(&self, excluded: &PartyId, event: &ServerEvent) {
        for (id, entry) in &self.entries {
            if id != excluded {
                let _ = entry.tx.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_insert_and_remove() {
        let mut registry = Registry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = PartyId::generate();

        registry.insert(id.clone(), tx);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).map(|p| p.role), Some(Role::Viewer));

        let removed = registry.remove(&id).expect("party should be present");
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_broadcast_except_skips_excluded() {
        let mut registry = Registry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = PartyId::from("a");
        let b = PartyId::from("b");
        registry.insert(a.clone(), tx_a);
        registry.insert(b.clone(), tx_b);

        registry.broadcast_except(&a, &ServerEvent::BroadcasterAvailable);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().ok(), Some(ServerEvent::BroadcasterAvailable));
    }

    #[test]
    fn test_send_to_unknown_party() {
        let registry = Registry::new();
        assert!(!registry.send_to(&PartyId::from("ghost"), ServerEvent::ForceStop));
    }

    #[test]
    fn test_send_to_closed_channel_is_not_an_error() {
        let mut registry = Registry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = PartyId::from("closing");
        registry.insert(id.clone(), tx);
        drop(rx);

        assert!(registry.send_to(&id, ServerEvent::ForceStop));
    }

    #[test]
    fn test_party_view_reflects_role() {
        let mut party = Party::new(PartyId::from("p"));
        assert!(!party.view().is_broadcaster);
        party.role = Role::Broadcaster;
        assert!(party.view().is_broadcaster);
    }
}
