use std::collections::HashMap;

use serde::Serialize;

use flick_shared::PeerId;

use crate::conversations::ConversationEntry;
use crate::notifications::NotificationItem;
use crate::peers::PeerRecord;

/// Change notifications for the rendering layer.
///
/// Every variant carries a read-only snapshot of the state it describes,
/// so subscribers never reach back into the engine while it is mutating.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// A peer was created, renamed, or changed presence.
    PeerUpdated(PeerRecord),

    /// An entry was appended to, or merged into, a peer's timeline.
    EntryUpserted {
        peer_id: PeerId,
        entry: ConversationEntry,
    },

    UnreadChanged { peer_id: PeerId, unread: usize },

    NotificationsChanged(Vec<NotificationItem>),

    /// The user opened a conversation; carries its full timeline.
    ConversationOpened {
        peer_id: PeerId,
        entries: Vec<ConversationEntry>,
    },

    /// The local display name changed.
    SelfUpdated { id: String, name: String },
}

/// Full read-only view of the engine, for initial renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub self_id: String,
    pub self_name: String,
    pub peers: Vec<PeerRecord>,
    pub active_peer: Option<PeerId>,
    pub active_timeline: Vec<ConversationEntry>,
    pub unread: HashMap<PeerId, usize>,
    pub notifications: Vec<NotificationItem>,
    pub transfers_in_progress: usize,
}
