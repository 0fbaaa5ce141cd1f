//! Session engine.
//!
//! [`Engine`] owns every piece of session state (peers, conversations,
//! transfers, payloads, notifications and the open conversation) and is
//! driven entirely by the host: transport events and user commands go in,
//! [`Outbound`] messages and [`EngineEvent`]s come out. All mutation happens
//! through `&mut self`, so a single owner serializes every handler.

use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use uuid::Uuid;

use flick_shared::constants::{
    CHUNK_SIZE, DEFAULT_FILE_TYPE, FALLBACK_SENDER_NAME, MAX_FILE_SIZE, MAX_TOTAL_CHUNKS,
    NOTIFICATION_CAPACITY,
};
use flick_shared::protocol::{ChatMessage, FileChunk, FileMeta};
use flick_shared::types::{timestamp_now, timestamp_to_datetime};
use flick_shared::{EntryId, PeerId, TransferId};

use crate::conversations::{ConversationEntry, ConversationStore, FileTransferEntry, MessageEntry, Sender, Upsert};
use crate::error::{EngineError, TransferError};
use crate::events::{EngineEvent, EngineSnapshot};
use crate::notifications::{NotificationFeed, NotificationId, NotificationItem};
use crate::payload::{Payload, PayloadHandle, PayloadStore};
use crate::peers::{PeerDirectory, PeerRecord, PeerStatus};
use crate::router::{self, FileHeader, RouteOutcome};
use crate::transfer::{
    chunk_count, file_checksum, IncomingTransfer, Integrity, MetaOutcome, OutgoingFile, OutgoingTransfer,
    TransferStatus, TransferTable,
};
use crate::transport::Outbound;

const NAME_ADJECTIVES: [&str; 7] = ["Swift", "Bright", "Silent", "Brave", "Calm", "Nimble", "Clever"];
const NAME_NOUNS: [&str; 7] = ["Comet", "Photon", "Pixel", "Beacon", "Signal", "Aurora", "Nova"];

/// A random "<Adjective> <Noun>" display name.
pub fn random_display_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = NAME_ADJECTIVES.choose(&mut rng).copied().unwrap_or("Swift");
    let noun = NAME_NOUNS.choose(&mut rng).copied().unwrap_or("Comet");
    format!("{adjective} {noun}")
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Outbound chunk size in bytes.
    pub chunk_size: usize,
    pub notification_capacity: usize,
    /// Largest file accepted by `send_file`.
    pub max_file_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            notification_capacity: NOTIFICATION_CAPACITY,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// This client's identity for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: String,
    pub name: String,
}

impl LocalIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Fresh random id, with `name` or a random display name.
    pub fn generate(name: Option<&str>) -> Self {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => random_display_name(),
        };
        Self::new(Uuid::new_v4().to_string(), name)
    }
}

pub struct Engine {
    identity: LocalIdentity,
    config: EngineConfig,
    peers: PeerDirectory,
    conversations: ConversationStore,
    transfers: TransferTable,
    payloads: PayloadStore,
    notifications: NotificationFeed,
    active_peer: Option<PeerId>,
    events: Vec<EngineEvent>,
}

impl Engine {
    pub fn new(identity: LocalIdentity, config: EngineConfig) -> Self {
        info!(id = %identity.id, name = %identity.name, "Engine started");
        Self {
            notifications: NotificationFeed::new(config.notification_capacity),
            identity,
            config,
            peers: PeerDirectory::new(),
            conversations: ConversationStore::new(),
            transfers: TransferTable::new(),
            payloads: PayloadStore::new(),
            active_peer: None,
            events: Vec::new(),
        }
    }

    // ---- transport events ----

    /// A transport connection opened. Returns the presence to send to it.
    pub fn on_peer_connected(&mut self, peer_id: &PeerId) -> Outbound {
        self.touch_peer(peer_id);
        info!(
            peer = %peer_id,
            online = self.peers.online_count(),
            known = self.peers.peer_count(),
            "Peer connected"
        );
        Outbound::to_peer(peer_id.clone(), router::presence_message(&self.identity))
    }

    /// A transport connection closed. The peer stays listed as away and
    /// its unfinished inbound transfers are abandoned.
    pub fn on_peer_disconnected(&mut self, peer_id: &PeerId) {
        if self.peers.mark_away(peer_id) {
            self.emit_peer(peer_id);
        }
        info!(peer = %peer_id, online = self.peers.online_count(), "Peer disconnected");
        let abandoned = self.transfers.abandon_peer(peer_id);
        self.mark_abandoned(abandoned);
    }

    /// Bytes received from a peer.
    pub fn on_data(&mut self, peer_id: &PeerId, data: &[u8]) -> RouteOutcome {
        router::route(self, peer_id, data)
    }

    // ---- user commands ----

    /// Make `peer_id` the open conversation: its unread count drops to zero
    /// and its pending notifications are dismissed.
    pub fn open_conversation(&mut self, peer_id: &PeerId) -> Result<&[ConversationEntry], EngineError> {
        if !self.peers.contains(peer_id) {
            return Err(EngineError::UnknownPeer(peer_id.clone()));
        }

        debug!(peer = %peer_id, "Conversation opened");
        self.active_peer = Some(peer_id.clone());
        self.conversations.clear_unread(peer_id);
        self.events.push(EngineEvent::UnreadChanged {
            peer_id: peer_id.clone(),
            unread: 0,
        });
        if self.notifications.dismiss_peer(peer_id) > 0 {
            self.emit_notifications();
        }
        self.events.push(EngineEvent::ConversationOpened {
            peer_id: peer_id.clone(),
            entries: self.conversations.timeline(peer_id).to_vec(),
        });

        Ok(self.conversations.timeline(peer_id))
    }

    /// Send a text message to the open conversation.
    pub fn send_message(&mut self, text: &str) -> Result<Outbound, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let peer_id = self.active_peer.clone().ok_or(EngineError::NoActiveConversation)?;

        let id = EntryId::new();
        let timestamp = timestamp_now();
        let message = router::chat_message(&self.identity, &id, text, timestamp);

        self.record_entry(
            &peer_id,
            ConversationEntry::Message(MessageEntry {
                id,
                sender: Sender::Me,
                sender_name: self.identity.name.clone(),
                text: text.to_string(),
                timestamp: timestamp_to_datetime(Some(timestamp)),
            }),
        );

        Ok(Outbound::to_peer(peer_id, message))
    }

    /// Send a file to the open conversation.
    pub fn send_file(&mut self, file: OutgoingFile) -> Result<OutgoingTransfer, EngineError> {
        let peer_id = self.active_peer.clone().ok_or(EngineError::NoActiveConversation)?;
        self.send_file_to(&peer_id, file)
    }

    /// Record a local file entry for `peer_id` and return the message
    /// sequence the host must deliver in order.
    pub fn send_file_to(&mut self, peer_id: &PeerId, file: OutgoingFile) -> Result<OutgoingTransfer, EngineError> {
        let size = file.data.len();
        if size > self.config.max_file_size {
            return Err(EngineError::FileTooLarge {
                size,
                max: self.config.max_file_size,
            });
        }
        let total_chunks = chunk_count(size, self.config.chunk_size);
        if total_chunks > MAX_TOTAL_CHUNKS {
            return Err(EngineError::TooManyChunks {
                chunks: total_chunks,
                max: MAX_TOTAL_CHUNKS,
            });
        }
        if !self.peers.contains(peer_id) {
            return Err(EngineError::UnknownPeer(peer_id.clone()));
        }

        let timestamp = timestamp_now();
        let transfer_id = TransferId::generate(&self.identity.id, timestamp);
        let file_type = if file.mime.trim().is_empty() {
            DEFAULT_FILE_TYPE.to_string()
        } else {
            file.mime.clone()
        };

        let handle = self.payloads.insert(Payload {
            file_name: file.name.clone(),
            file_type: file_type.clone(),
            data: file.data.clone(),
        });

        let meta = router::file_meta(
            &self.identity,
            FileHeader {
                transfer_id: &transfer_id,
                file_name: &file.name,
                file_size: size as u64,
                file_type: &file_type,
                total_chunks,
                timestamp,
                checksum: file_checksum(&file.data),
            },
        );

        self.record_entry(
            peer_id,
            ConversationEntry::FileTransfer(FileTransferEntry {
                id: EntryId::from(&transfer_id),
                sender: Sender::Me,
                sender_name: self.identity.name.clone(),
                file_name: file.name,
                file_size: size as u64,
                file_type,
                timestamp: timestamp_to_datetime(Some(timestamp)),
                progress: 1.0,
                payload: Some(handle),
                status: TransferStatus::Complete,
                integrity: Integrity::Unchecked,
            }),
        );

        info!(
            peer = %peer_id,
            transfer = %transfer_id,
            size,
            chunks = meta.total_chunks,
            "Sending file"
        );
        Ok(OutgoingTransfer::new(peer_id.clone(), meta, file.data, self.config.chunk_size))
    }

    /// Change the local display name and announce it to every peer.
    /// A blank name is replaced with a random one.
    pub fn set_display_name(&mut self, name: &str) -> Outbound {
        let name = name.trim();
        self.identity.name = if name.is_empty() {
            random_display_name()
        } else {
            name.to_string()
        };
        info!(name = %self.identity.name, "Display name changed");
        self.events.push(EngineEvent::SelfUpdated {
            id: self.identity.id.clone(),
            name: self.identity.name.clone(),
        });
        self.presence_broadcast()
    }

    /// Periodic presence announcement for every peer.
    pub fn presence_broadcast(&self) -> Outbound {
        Outbound::broadcast(router::presence_message(&self.identity))
    }

    pub fn dismiss_notification(&mut self, id: NotificationId) -> bool {
        let removed = self.notifications.dismiss(id);
        if removed {
            self.emit_notifications();
        }
        removed
    }

    /// Abandon inbound transfers that received nothing for `max_idle`.
    pub fn sweep_idle_transfers(&mut self, max_idle: Duration) -> usize {
        let abandoned = self.transfers.sweep_idle(max_idle, Instant::now());
        let count = abandoned.len();
        self.mark_abandoned(abandoned);
        count
    }

    // ---- queries ----

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers.list()
    }

    pub fn timeline(&self, peer_id: &PeerId) -> &[ConversationEntry] {
        self.conversations.timeline(peer_id)
    }

    pub fn unread_count(&self, peer_id: &PeerId) -> usize {
        self.conversations.unread_count(peer_id)
    }

    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.notifications.items()
    }

    pub fn payload(&self, handle: &PayloadHandle) -> Option<&Payload> {
        self.payloads.get(handle)
    }

    pub fn active_peer(&self) -> Option<&PeerId> {
        self.active_peer.as_ref()
    }

    pub fn transfers_in_progress(&self) -> usize {
        self.transfers.len()
    }

    /// Take every event produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            self_id: self.identity.id.clone(),
            self_name: self.identity.name.clone(),
            peers: self.peers.list(),
            active_peer: self.active_peer.clone(),
            active_timeline: self
                .active_peer
                .as_ref()
                .map(|p| self.conversations.timeline(p).to_vec())
                .unwrap_or_default(),
            unread: self.conversations.unread_counts(),
            notifications: self.notifications.items(),
            transfers_in_progress: self.transfers.len(),
        }
    }

    // ---- inbound handlers, dispatched by the router ----

    /// Mark a peer online and seen now, creating it on first contact.
    pub(crate) fn touch_peer(&mut self, peer_id: &PeerId) {
        let was_online = self.peers.get(peer_id).map(|r| r.status == PeerStatus::Online);
        self.peers.ensure_peer(peer_id);
        if was_online != Some(true) {
            self.emit_peer(peer_id);
        }
    }

    pub(crate) fn apply_peer_name(&mut self, peer_id: &PeerId, name: &str) {
        if self.peers.update_identity(peer_id, name) {
            self.emit_peer(peer_id);
        }
    }

    pub(crate) fn on_chat_message(&mut self, peer_id: &PeerId, msg: ChatMessage) {
        let id = msg.message_id.as_deref().map(EntryId::from).unwrap_or_default();
        let sender_name = display_sender(&msg.sender_name);

        let entry = ConversationEntry::Message(MessageEntry {
            id,
            sender: Sender::Peer,
            sender_name: sender_name.clone(),
            text: msg.text.clone(),
            timestamp: timestamp_to_datetime(msg.timestamp),
        });

        if self.record_entry(peer_id, entry) == Upsert::Merged {
            debug!(peer = %peer_id, "Duplicate message merged");
            return;
        }
        if !self.is_active(peer_id) {
            self.notify(NotificationItem::message(peer_id.clone(), &sender_name, &msg.text));
        }
    }

    pub(crate) fn on_file_meta(&mut self, peer_id: &PeerId, meta: FileMeta) -> Result<(), TransferError> {
        let finished = self
            .conversations
            .get(peer_id, &EntryId::from(&meta.transfer_id))
            .and_then(ConversationEntry::as_file)
            .is_some_and(|f| f.status == TransferStatus::Complete);
        if finished {
            debug!(peer = %peer_id, transfer = %meta.transfer_id, "File-meta for a finished transfer ignored");
            return Ok(());
        }

        if self.transfers.begin(peer_id, &meta)? == MetaOutcome::AlreadyActive {
            debug!(peer = %peer_id, transfer = %meta.transfer_id, "Repeated file-meta ignored");
            return Ok(());
        }

        let file_type = if meta.file_type.trim().is_empty() {
            DEFAULT_FILE_TYPE.to_string()
        } else {
            meta.file_type
        };
        self.record_entry(
            peer_id,
            ConversationEntry::FileTransfer(FileTransferEntry {
                id: EntryId::from(&meta.transfer_id),
                sender: Sender::Peer,
                sender_name: display_sender(&meta.sender_name),
                file_name: meta.file_name,
                file_size: meta.file_size,
                file_type,
                timestamp: timestamp_to_datetime(meta.timestamp),
                progress: 0.0,
                payload: None,
                status: TransferStatus::Receiving,
                integrity: Integrity::Unchecked,
            }),
        );
        Ok(())
    }

    pub(crate) fn on_file_chunk(&mut self, peer_id: &PeerId, chunk: FileChunk) -> Result<(), TransferError> {
        let progress = self.transfers.apply_chunk(peer_id, chunk)?;
        let updated = self
            .conversations
            .update_transfer(&progress.peer_id, &progress.entry_id, |f| f.progress = progress.progress)
            .cloned();
        if let Some(entry) = updated {
            self.events.push(EngineEvent::EntryUpserted {
                peer_id: progress.peer_id,
                entry,
            });
        }
        Ok(())
    }

    pub(crate) fn on_file_complete(&mut self, peer_id: &PeerId, transfer_id: &TransferId) -> Result<(), TransferError> {
        let done = self.transfers.finish(peer_id, transfer_id)?;
        let transfer = done.transfer;
        let file_type = if transfer.file_type.trim().is_empty() {
            DEFAULT_FILE_TYPE.to_string()
        } else {
            transfer.file_type.clone()
        };

        let handle = self.payloads.insert(Payload {
            file_name: transfer.file_name.clone(),
            file_type,
            data: Bytes::from(done.data),
        });

        let integrity = done.integrity;
        let updated = self
            .conversations
            .update_transfer(&transfer.peer_id, &transfer.entry_id(), |f| {
                f.progress = 1.0;
                f.payload = Some(handle);
                f.status = TransferStatus::Complete;
                f.integrity = integrity;
            })
            .cloned();
        let is_image = updated
            .as_ref()
            .and_then(ConversationEntry::as_file)
            .is_some_and(FileTransferEntry::is_image);
        if let Some(entry) = updated {
            self.events.push(EngineEvent::EntryUpserted {
                peer_id: transfer.peer_id.clone(),
                entry,
            });
        }

        info!(
            peer = %transfer.peer_id,
            transfer = %transfer_id,
            file = %transfer.file_name,
            size = transfer.file_size,
            ?integrity,
            "File received"
        );

        if !self.is_active(&transfer.peer_id) {
            let sender_name = display_sender(&transfer.sender_name);
            let item = if is_image {
                NotificationItem::image(transfer.peer_id.clone(), &sender_name, handle)
            } else {
                NotificationItem::file(transfer.peer_id.clone(), &sender_name, &transfer.file_name)
            };
            self.notify(item);
        }
        Ok(())
    }

    // ---- internals ----

    fn is_active(&self, peer_id: &PeerId) -> bool {
        self.active_peer.as_ref() == Some(peer_id)
    }

    /// Upsert into the peer's timeline, counting unread unless it is open.
    fn record_entry(&mut self, peer_id: &PeerId, entry: ConversationEntry) -> Upsert {
        let counts_unread = !self.is_active(peer_id);
        let id = entry.id().clone();
        let outcome = self.conversations.upsert(peer_id, entry, counts_unread);

        if let Some(stored) = self.conversations.get(peer_id, &id) {
            self.events.push(EngineEvent::EntryUpserted {
                peer_id: peer_id.clone(),
                entry: stored.clone(),
            });
        }
        if outcome == Upsert::Appended && counts_unread {
            self.events.push(EngineEvent::UnreadChanged {
                peer_id: peer_id.clone(),
                unread: self.conversations.unread_count(peer_id),
            });
        }
        outcome
    }

    fn mark_abandoned(&mut self, abandoned: Vec<IncomingTransfer>) {
        for transfer in abandoned {
            info!(
                peer = %transfer.peer_id,
                transfer = %transfer.transfer_id,
                received = transfer.received(),
                total = transfer.total_chunks(),
                "Transfer abandoned"
            );
            let updated = self
                .conversations
                .update_transfer(&transfer.peer_id, &transfer.entry_id(), |f| {
                    f.status = TransferStatus::Abandoned
                })
                .cloned();
            if let Some(entry) = updated {
                self.events.push(EngineEvent::EntryUpserted {
                    peer_id: transfer.peer_id,
                    entry,
                });
            }
        }
    }

    fn notify(&mut self, item: NotificationItem) {
        self.notifications.push(item);
        self.emit_notifications();
    }

    fn emit_notifications(&mut self) {
        self.events
            .push(EngineEvent::NotificationsChanged(self.notifications.items()));
    }

    fn emit_peer(&mut self, peer_id: &PeerId) {
        if let Some(record) = self.peers.get(peer_id) {
            self.events.push(EngineEvent::PeerUpdated(record.clone()));
        }
    }
}

fn display_sender(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        FALLBACK_SENDER_NAME.to_string()
    } else {
        name.to_string()
    }
}
