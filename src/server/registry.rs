//! # Connection Registry
//!
//! Membership bookkeeping for live peer connections.
//!
//! Each connection starts `Unclassified` and is then placed in exactly one of
//! two sets, web or device. A connection is never in both sets, and a removed
//! connection is in neither. The registry itself is not synchronised: the
//! [`RelayHub`](super::hub::RelayHub) owns it behind a single lock.

use log::warn;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::common::messages::Payload;

/// Opaque identity of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block is plenty to tell connections apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Which population a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Unclassified,
    /// Browser dashboard
    Web,
    /// OLED microcontroller
    Device,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unclassified => write!(f, "unclassified"),
            Role::Web => write!(f, "web"),
            Role::Device => write!(f, "device"),
        }
    }
}

/// A registered connection: its role and the channel feeding its writer task.
#[derive(Debug)]
struct Peer {
    role: Role,
    tx: mpsc::Sender<Payload>,
}

impl Peer {
    /// Queue a payload without waiting.
    ///
    /// Fails when the writer side has gone away or when the peer has stopped
    /// reading and its queue is full. Either way the payload is dropped for
    /// this peer only.
    fn send(&self, id: &ConnectionId, payload: Payload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    "⚠️  Outbound queue of {} is full, dropping {} bytes",
                    id,
                    dropped.len()
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Two disjoint membership sets plus the per-connection table.
#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<ConnectionId, Peer>,
    web: HashSet<ConnectionId>,
    devices: HashSet<ConnectionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection in the `Unclassified` state. It belongs to no set yet.
    pub fn insert(&mut self, id: ConnectionId, tx: mpsc::Sender<Payload>) {
        self.peers.insert(
            id,
            Peer {
                role: Role::Unclassified,
                tx,
            },
        );
    }

    /// Move a connection into the set for `role`, leaving any previous set.
    ///
    /// # Returns
    /// `true` if the role changed, `false` if it already had `role` or the
    /// connection is unknown.
    pub fn assign(&mut self, id: &ConnectionId, role: Role) -> bool {
        let Some(peer) = self.peers.get_mut(id) else {
            return false;
        };
        if peer.role == role {
            return false;
        }

        self.web.remove(id);
        self.devices.remove(id);
        match role {
            Role::Web => {
                self.web.insert(*id);
            }
            Role::Device => {
                self.devices.insert(*id);
            }
            Role::Unclassified => {}
        }
        peer.role = role;
        true
    }

    /// Drop a connection from every set. Safe to call repeatedly.
    ///
    /// # Returns
    /// The role it had, or `None` if it was not registered.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Role> {
        self.web.remove(id);
        self.devices.remove(id);
        self.peers.remove(id).map(|peer| peer.role)
    }

    pub fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        self.peers.get(id).map(|peer| peer.role)
    }

    /// Queue a payload for one connection.
    pub fn send_to(&self, id: &ConnectionId, payload: Payload) -> bool {
        self.peers
            .get(id)
            .map(|peer| peer.send(id, payload))
            .unwrap_or(false)
    }

    /// Queue a payload for every open member of `role`'s set.
    ///
    /// A member whose channel is closed or full is skipped; it does not stop
    /// delivery to the rest.
    ///
    /// # Returns
    /// How many members the payload was queued for.
    pub fn send_to_role(&self, role: Role, payload: &Payload) -> usize {
        self.members(role)
            .filter_map(|id| self.peers.get(id).map(|peer| (id, peer)))
            .filter(|(id, peer)| peer.send(id, payload.clone()))
            .count()
    }

    /// Members of `role`'s set whose channels are still open.
    pub fn open_count(&self, role: Role) -> usize {
        self.members(role)
            .filter_map(|id| self.peers.get(id))
            .filter(|peer| peer.is_open())
            .count()
    }

    /// Size of the (web, device) sets.
    pub fn counts(&self) -> (usize, usize) {
        (self.web.len(), self.devices.len())
    }

    fn members(&self, role: Role) -> Box<dyn Iterator<Item = &ConnectionId> + '_> {
        match role {
            Role::Web => Box::new(self.web.iter()),
            Role::Device => Box::new(self.devices.iter()),
            Role::Unclassified => Box::new(
                self.peers
                    .iter()
                    .filter(|(_, peer)| peer.role == Role::Unclassified)
                    .map(|(id, _)| id),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &mut Registry, role: Role) -> (ConnectionId, mpsc::Receiver<Payload>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(4);
        registry.insert(id, tx);
        registry.assign(&id, role);
        (id, rx)
    }

    #[test]
    fn test_connection_id_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
        assert_eq!(ConnectionId::new().to_string().len(), 8);
    }

    #[test]
    fn test_insert_starts_unclassified() {
        let mut registry = Registry::new();
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.insert(id, tx);

        assert_eq!(registry.role_of(&id), Some(Role::Unclassified));
        assert_eq!(registry.counts(), (0, 0));
    }

    #[test]
    fn test_sets_are_disjoint() {
        let mut registry = Registry::new();
        let (id, _rx) = register(&mut registry, Role::Web);
        assert_eq!(registry.counts(), (1, 0));

        assert!(registry.assign(&id, Role::Device));
        assert_eq!(registry.counts(), (0, 1));
        assert_eq!(registry.role_of(&id), Some(Role::Device));

        // Same role again is a no-op
        assert!(!registry.assign(&id, Role::Device));
        assert_eq!(registry.counts(), (0, 1));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        let (id, _rx) = register(&mut registry, Role::Device);

        assert_eq!(registry.remove(&id), Some(Role::Device));
        assert_eq!(registry.remove(&id), None);
        assert_eq!(registry.counts(), (0, 0));
        assert_eq!(registry.role_of(&id), None);
        assert!(!registry.assign(&id, Role::Web));
    }

    #[test]
    fn test_send_to_role_skips_closed_members() {
        let mut registry = Registry::new();
        let (_a, mut rx_a) = register(&mut registry, Role::Device);
        let (_b, rx_b) = register(&mut registry, Role::Device);
        let (_c, mut rx_c) = register(&mut registry, Role::Web);
        drop(rx_b);

        assert_eq!(registry.open_count(Role::Device), 1);
        let delivered = registry.send_to_role(Role::Device, &Payload::from("ping"));

        assert_eq!(delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap(), Payload::from("ping"));
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_fails_only_that_member() {
        let mut registry = Registry::new();
        let (_stalled, mut rx_stalled) = register(&mut registry, Role::Device);
        let (_live, mut rx_live) = register(&mut registry, Role::Device);

        for _ in 0..4 {
            assert_eq!(registry.send_to_role(Role::Device, &Payload::from("frame")), 2);
            rx_live.try_recv().unwrap();
        }

        // stalled has 4 queued and no room left
        assert_eq!(registry.send_to_role(Role::Device, &Payload::from("frame")), 1);
        assert_eq!(rx_live.try_recv().unwrap(), Payload::from("frame"));

        // Draining one slot makes it deliverable again
        rx_stalled.try_recv().unwrap();
        assert_eq!(registry.send_to_role(Role::Device, &Payload::from("frame")), 2);
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let registry = Registry::new();
        assert!(!registry.send_to(&ConnectionId::new(), Payload::from("x")));
    }
}
