//! Inbound dispatch and outbound message builders.
//!
//! The router holds no state of its own. Every decodable inbound message
//! first refreshes the sending peer's presence, then is dispatched by its
//! `type` to the engine component that owns it.

use tracing::{debug, warn};

use flick_shared::protocol::{ChatMessage, FileMeta, Presence};
use flick_shared::types::timestamp_now;
use flick_shared::{EntryId, PeerId, ProtocolError, TransferId, WireMessage};

use crate::engine::{Engine, LocalIdentity};
use crate::error::TransferError;

/// What happened to one inbound payload.
#[derive(Debug, PartialEq)]
pub enum RouteOutcome {
    /// Dispatched; carries the wire `type`.
    Handled(&'static str),
    /// Undecodable bytes; no state changed.
    Malformed,
    /// Decodable but of a type this client does not know.
    UnknownType(String),
    /// A transfer message that could not be applied.
    Rejected(TransferError),
}

/// Decode `data` received from `peer_id` and apply it to the engine.
pub fn route(engine: &mut Engine, peer_id: &PeerId, data: &[u8]) -> RouteOutcome {
    let message = match WireMessage::from_bytes(data) {
        Ok(message) => message,
        Err(ProtocolError::UnknownType(kind)) => {
            engine.touch_peer(peer_id);
            debug!(peer = %peer_id, kind = %kind, "Unknown message type");
            return RouteOutcome::UnknownType(kind);
        }
        Err(ProtocolError::MissingType) => {
            engine.touch_peer(peer_id);
            debug!(peer = %peer_id, "Message without type");
            return RouteOutcome::UnknownType(String::new());
        }
        Err(e) => {
            warn!(peer = %peer_id, len = data.len(), error = %e, "Failed to parse message");
            return RouteOutcome::Malformed;
        }
    };

    engine.touch_peer(peer_id);
    if let Some(name) = message.sender_name() {
        engine.apply_peer_name(peer_id, name);
    }

    let kind = message.kind();
    let result = match message {
        WireMessage::Presence(_) => Ok(()),
        WireMessage::Message(msg) => {
            engine.on_chat_message(peer_id, msg);
            Ok(())
        }
        WireMessage::FileMeta(meta) => engine.on_file_meta(peer_id, meta),
        WireMessage::FileChunk(chunk) => engine.on_file_chunk(peer_id, chunk),
        WireMessage::FileComplete(done) => engine.on_file_complete(peer_id, &done.transfer_id),
    };

    match result {
        Ok(()) => RouteOutcome::Handled(kind),
        Err(e) => {
            warn!(peer = %peer_id, kind, error = %e, "Dropped transfer message");
            RouteOutcome::Rejected(e)
        }
    }
}

pub fn presence_message(identity: &LocalIdentity) -> WireMessage {
    WireMessage::Presence(Presence {
        sender_id: identity.id.clone(),
        sender_name: identity.name.clone(),
        timestamp: Some(timestamp_now()),
    })
}

pub fn chat_message(identity: &LocalIdentity, id: &EntryId, text: &str, timestamp: i64) -> WireMessage {
    WireMessage::Message(ChatMessage {
        sender_id: identity.id.clone(),
        sender_name: identity.name.clone(),
        text: text.to_string(),
        timestamp: Some(timestamp),
        message_id: Some(id.0.clone()),
    })
}

pub struct FileHeader<'a> {
    pub transfer_id: &'a TransferId,
    pub file_name: &'a str,
    pub file_size: u64,
    pub file_type: &'a str,
    pub total_chunks: u32,
    pub timestamp: i64,
    pub checksum: String,
}

pub fn file_meta(identity: &LocalIdentity, header: FileHeader<'_>) -> FileMeta {
    FileMeta {
        transfer_id: header.transfer_id.clone(),
        sender_id: identity.id.clone(),
        sender_name: identity.name.clone(),
        file_name: header.file_name.to_string(),
        file_size: header.file_size,
        file_type: header.file_type.to_string(),
        total_chunks: header.total_chunks,
        timestamp: Some(header.timestamp),
        checksum: Some(header.checksum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::peers::PeerStatus;

    fn engine() -> Engine {
        Engine::new(LocalIdentity::new("me", "Brave Comet"), EngineConfig::default())
    }

    #[test]
    fn test_malformed_changes_nothing() {
        let mut e = engine();
        let p = PeerId::from("p1");
        assert_eq!(route(&mut e, &p, b"\xff\x00garbage"), RouteOutcome::Malformed);
        assert!(e.peer(&p).is_none());
        assert!(e.drain_events().is_empty());
    }

    #[test]
    fn test_unknown_type_refreshes_sender_only() {
        let mut e = engine();
        let other = PeerId::from("other");
        route(&mut e, &other, br#"{"type":"presence","senderName":"Calm Nova"}"#);
        e.on_peer_disconnected(&other);
        let before = e.peer(&other).cloned().unwrap();

        let p = PeerId::from("p1");
        let outcome = route(&mut e, &p, br#"{"type":"reaction","emoji":"x"}"#);
        assert_eq!(outcome, RouteOutcome::UnknownType("reaction".into()));
        assert_eq!(e.peer(&p).unwrap().status, PeerStatus::Online);
        assert_eq!(e.peer(&other).cloned().unwrap(), before);
        assert!(e.timeline(&p).is_empty());
    }

    #[test]
    fn test_chunk_for_unknown_transfer_is_rejected() {
        let mut e = engine();
        let p = PeerId::from("p1");
        let raw = br#"{"type":"file-chunk","transferId":"ghost","index":0,"totalChunks":1,"data":[1]}"#;
        assert_eq!(
            route(&mut e, &p, raw),
            RouteOutcome::Rejected(TransferError::UnknownTransfer(TransferId::from("ghost")))
        );
        assert!(e.timeline(&p).is_empty());

        let done = br#"{"type":"file-complete","transferId":"ghost"}"#;
        assert!(matches!(route(&mut e, &p, done), RouteOutcome::Rejected(_)));
    }

    #[test]
    fn test_names_taken_from_any_named_message() {
        let mut e = engine();
        let p = PeerId::from("p1");
        route(&mut e, &p, br#"{"type":"presence","senderId":"x","senderName":"Silent Aurora"}"#);
        assert_eq!(e.peer(&p).unwrap().name, "Silent Aurora");

        route(&mut e, &p, br#"{"type":"message","senderName":"Nimble Pixel","text":"yo"}"#);
        assert_eq!(e.peer(&p).unwrap().name, "Nimble Pixel");

        // Empty names never overwrite
        route(&mut e, &p, br#"{"type":"presence","senderName":""}"#);
        assert_eq!(e.peer(&p).unwrap().name, "Nimble Pixel");
    }
}
