//! In-process loopback transport.
//!
//! A [`MemoryHub`] connects any number of clients in the same process. Each
//! joined client gets a [`MemoryTransport`] for sending and a receiver of
//! [`TransportEvent`]s. Peers are identified by the name they joined with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use flick_core::{Transport, TransportError};
use flick_shared::PeerId;

use crate::runtime::TransportEvent;

type Inboxes = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>>>;

#[derive(Clone, Default)]
pub struct MemoryHub {
    inboxes: Inboxes,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and announce it to every member already present
    /// (and them to it).
    pub fn join(&self, id: &str) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let id = PeerId::from(id);
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut inboxes) = self.inboxes.lock() {
            for (other, inbox) in inboxes.iter() {
                let _ = inbox.send(TransportEvent::PeerConnected(id.clone()));
                let _ = tx.send(TransportEvent::PeerConnected(other.clone()));
            }
            inboxes.insert(id.clone(), tx);
        }
        debug!(peer = %id, "Joined memory hub");

        let transport = MemoryTransport {
            id,
            inboxes: Arc::clone(&self.inboxes),
        };
        (transport, rx)
    }

    /// Remove `id`, announcing the disconnect to every remaining member.
    pub fn leave(&self, id: &str) {
        let id = PeerId::from(id);
        if let Ok(mut inboxes) = self.inboxes.lock() {
            inboxes.remove(&id);
            for inbox in inboxes.values() {
                let _ = inbox.send(TransportEvent::PeerDisconnected(id.clone()));
            }
        }
        debug!(peer = %id, "Left memory hub");
    }
}

/// Sending half of one hub member.
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    inboxes: Inboxes,
}

impl MemoryTransport {
    fn push(&self, inbox: &mpsc::UnboundedSender<TransportEvent>, data: &[u8]) -> bool {
        inbox
            .send(TransportEvent::Data {
                peer: self.id.clone(),
                bytes: data.to_vec().into(),
            })
            .is_ok()
    }
}

impl Transport for MemoryTransport {
    fn send_to_peer(&self, peer_id: &PeerId, data: &[u8]) -> Result<(), TransportError> {
        let inboxes = self
            .inboxes
            .lock()
            .map_err(|e| TransportError::Other(format!("Lock poisoned: {e}")))?;
        match inboxes.get(peer_id) {
            Some(inbox) if self.push(inbox, data) => Ok(()),
            _ => Err(TransportError::PeerUnreachable(peer_id.clone())),
        }
    }

    fn broadcast(&self, data: &[u8]) -> Result<(), TransportError> {
        let inboxes = self
            .inboxes
            .lock()
            .map_err(|e| TransportError::Other(format!("Lock poisoned: {e}")))?;
        if !inboxes.contains_key(&self.id) {
            return Err(TransportError::Closed);
        }
        for (peer, inbox) in inboxes.iter() {
            if peer != &self.id {
                self.push(inbox, data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_announces_both_ways() {
        let hub = MemoryHub::new();
        let (_a, mut a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");

        assert!(matches!(a_rx.recv().await, Some(TransportEvent::PeerConnected(p)) if p == PeerId::from("b")));
        assert!(matches!(b_rx.recv().await, Some(TransportEvent::PeerConnected(p)) if p == PeerId::from("a")));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_and_broadcast() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");
        let (_c, mut c_rx) = hub.join("c");
        // Drain connect announcements
        while let Ok(TransportEvent::PeerConnected(_)) = b_rx.try_recv() {}
        while let Ok(TransportEvent::PeerConnected(_)) = c_rx.try_recv() {}

        a.send_to_peer(&PeerId::from("b"), b"direct").unwrap();
        match b_rx.recv().await {
            Some(TransportEvent::Data { peer, bytes }) => {
                assert_eq!(peer, PeerId::from("a"));
                assert_eq!(&bytes[..], b"direct");
            }
            other => panic!("expected data, got {other:?}"),
        }

        a.broadcast(b"all").unwrap();
        assert!(matches!(b_rx.recv().await, Some(TransportEvent::Data { .. })));
        assert!(matches!(c_rx.recv().await, Some(TransportEvent::Data { .. })));

        assert!(matches!(
            a.send_to_peer(&PeerId::from("nobody"), b"x"),
            Err(TransportError::PeerUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_announces_disconnect() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");
        b_rx.recv().await;

        hub.leave("a");
        assert!(matches!(b_rx.recv().await, Some(TransportEvent::PeerDisconnected(p)) if p == PeerId::from("a")));
        assert!(matches!(a.broadcast(b"late"), Err(TransportError::Closed)));
    }
}
