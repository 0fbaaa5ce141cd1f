//! Transport contract and best-effort delivery.
//!
//! Discovery, NAT traversal and connection lifecycle live outside this
//! crate. The engine only needs two send primitives keyed by peer id;
//! [`deliver`] applies the fallback policy on top of them.

use thiserror::Error;
use tracing::{debug, warn};

use flick_shared::{PeerId, ProtocolError, WireMessage};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    #[error("Transport closed")]
    Closed,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Send primitives provided by the P2P layer. Both are best effort.
pub trait Transport: Send + Sync {
    fn send_to_peer(&self, peer_id: &PeerId, data: &[u8]) -> Result<(), TransportError>;

    fn broadcast(&self, data: &[u8]) -> Result<(), TransportError>;
}

/// Where an outbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Peer(PeerId),
    All,
}

/// A wire message ready to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub message: WireMessage,
}

impl Outbound {
    pub fn to_peer(peer_id: PeerId, message: WireMessage) -> Self {
        Self {
            target: Target::Peer(peer_id),
            message,
        }
    }

    pub fn broadcast(message: WireMessage) -> Self {
        Self {
            target: Target::All,
            message,
        }
    }
}

/// How an outbound message left (or failed to leave) the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Direct,
    /// The direct send failed and the message was broadcast instead.
    Broadcast,
    Dropped,
}

/// Serialize and send one message.
///
/// A peer-targeted send that fails falls back to broadcast; when that also
/// fails the message is abandoned and logged. Never returns an error for
/// transport failures.
pub fn deliver<T: Transport + ?Sized>(transport: &T, outbound: &Outbound) -> Result<Delivery, ProtocolError> {
    let data = outbound.message.to_bytes()?;
    let kind = outbound.message.kind();

    match &outbound.target {
        Target::Peer(peer_id) => match transport.send_to_peer(peer_id, &data) {
            Ok(()) => Ok(Delivery::Direct),
            Err(e) => {
                debug!(peer = %peer_id, kind, error = %e, "Direct send failed, falling back to broadcast");
                match transport.broadcast(&data) {
                    Ok(()) => Ok(Delivery::Broadcast),
                    Err(e) => {
                        warn!(peer = %peer_id, kind, error = %e, "Failed sending payload to peer");
                        Ok(Delivery::Dropped)
                    }
                }
            }
        },
        Target::All => match transport.broadcast(&data) {
            Ok(()) => Ok(Delivery::Broadcast),
            Err(e) => {
                warn!(kind, error = %e, "Failed broadcasting payload");
                Ok(Delivery::Dropped)
            }
        },
    }
}
