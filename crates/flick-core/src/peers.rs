//! Peer directory.
//!
//! Maintains an in-memory map of every peer seen this session, their
//! display names, online/away state and last-seen time. Records are never
//! removed on disconnect so conversation history stays attached to them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use flick_shared::constants::UNKNOWN_PEER_NAME;
use flick_shared::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Away,
}

/// Information about a known peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Transport-assigned id.
    pub id: PeerId,
    /// Last name the peer announced (last write wins).
    pub name: String,
    pub status: PeerStatus,
    pub last_seen: DateTime<Utc>,
}

/// Result of [`PeerDirectory::ensure_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure {
    Created,
    Refreshed,
}

/// Tracks all peers seen during the session.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, PeerRecord>,
    /// First-contact order, for stable listings.
    order: Vec<PeerId>,
}

impl PeerDirectory {
    /// Create a new, empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh an existing record (online, seen now) or create a placeholder.
    pub fn ensure_peer(&mut self, peer_id: &PeerId) -> Ensure {
        let now = Utc::now();

        if let Some(record) = self.peers.get_mut(peer_id) {
            record.status = PeerStatus::Online;
            record.last_seen = now;
            return Ensure::Refreshed;
        }

        debug!(peer = %peer_id, "Tracking new peer");

        self.peers.insert(
            peer_id.clone(),
            PeerRecord {
                id: peer_id.clone(),
                name: UNKNOWN_PEER_NAME.to_string(),
                status: PeerStatus::Online,
                last_seen: now,
            },
        );
        self.order.push(peer_id.clone());
        Ensure::Created
    }

    /// Mark a peer away after its transport connection closed.
    ///
    /// Returns `false` for peers that were never seen.
    pub fn mark_away(&mut self, peer_id: &PeerId) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(record) => {
                record.status = PeerStatus::Away;
                record.last_seen = Utc::now();
                debug!(peer = %peer_id, "Peer marked away");
                true
            }
            None => false,
        }
    }

    /// Apply a display name announced by the peer.
    ///
    /// Empty or unchanged names are ignored. Returns `true` when the
    /// record changed and views of the peer need re-rendering.
    pub fn update_identity(&mut self, peer_id: &PeerId, name: &str) -> bool {
        self.ensure_peer(peer_id);

        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        match self.peers.get_mut(peer_id) {
            Some(record) if record.name != name => {
                debug!(peer = %peer_id, old = %record.name, new = %name, "Peer renamed");
                record.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Get the record for a specific peer.
    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    /// Check whether a peer has ever been seen.
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// All records in first-contact order.
    pub fn list(&self) -> Vec<PeerRecord> {
        self.order
            .iter()
            .filter_map(|id| self.peers.get(id))
            .cloned()
            .collect()
    }

    /// Return the number of known peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Return the number of peers currently online.
    pub fn online_count(&self) -> usize {
        self.peers
            .values()
            .filter(|record| record.status == PeerStatus::Online)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> PeerId {
        PeerId::from(id)
    }

    #[test]
    fn test_ensure_peer_is_idempotent() {
        let mut dir = PeerDirectory::new();
        let p = peer("p1");

        assert_eq!(dir.ensure_peer(&p), Ensure::Created);
        let first = dir.get(&p).cloned().unwrap();
        assert_eq!(dir.ensure_peer(&p), Ensure::Refreshed);
        let second = dir.get(&p).cloned().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, UNKNOWN_PEER_NAME);
        assert_eq!(second.status, PeerStatus::Online);
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(dir.peer_count(), 1);
    }

    #[test]
    fn test_mark_away_keeps_record() {
        let mut dir = PeerDirectory::new();
        let p = peer("p1");
        dir.ensure_peer(&p);
        dir.update_identity(&p, "Calm Pixel");

        assert!(dir.mark_away(&p));
        let record = dir.get(&p).unwrap();
        assert_eq!(record.status, PeerStatus::Away);
        assert_eq!(record.name, "Calm Pixel");
        assert_eq!(dir.online_count(), 0);

        dir.ensure_peer(&p);
        assert_eq!(dir.get(&p).unwrap().status, PeerStatus::Online);
    }

    #[test]
    fn test_mark_away_unknown_peer() {
        let mut dir = PeerDirectory::new();
        assert!(!dir.mark_away(&peer("ghost")));
        assert_eq!(dir.peer_count(), 0);
    }

    #[test]
    fn test_update_identity_rules() {
        let mut dir = PeerDirectory::new();
        let p = peer("p1");

        assert!(!dir.update_identity(&p, ""));
        assert!(!dir.update_identity(&p, "   "));
        assert_eq!(dir.get(&p).unwrap().name, UNKNOWN_PEER_NAME);

        assert!(dir.update_identity(&p, "Brave Aurora"));
        assert!(!dir.update_identity(&p, "Brave Aurora"));
        assert!(dir.update_identity(&p, "Silent Nova"));
        assert_eq!(dir.get(&p).unwrap().name, "Silent Nova");
    }

    #[test]
    fn test_list_in_first_contact_order() {
        let mut dir = PeerDirectory::new();
        dir.ensure_peer(&peer("b"));
        dir.ensure_peer(&peer("a"));
        dir.ensure_peer(&peer("b"));

        let ids: Vec<_> = dir.list().into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
