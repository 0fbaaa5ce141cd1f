//! Per-peer conversation timelines.
//!
//! Each peer has an append-ordered list of entries indexed by entry id.
//! Upserting an id that already exists merges the new values into the
//! existing entry in place, so progress updates and duplicated deliveries
//! never grow the timeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use flick_shared::{EntryId, PeerId};

use crate::payload::PayloadHandle;
use crate::transfer::{Integrity, TransferStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Me,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub id: EntryId,
    pub sender: Sender,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferEntry {
    /// Same value as the transfer id.
    pub id: EntryId,
    pub sender: Sender,
    pub sender_name: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub timestamp: DateTime<Utc>,
    /// Fraction of chunks received, in `[0, 1]`.
    pub progress: f32,
    /// Set once the payload is available.
    pub payload: Option<PayloadHandle>,
    pub status: TransferStatus,
    pub integrity: Integrity,
}

impl FileTransferEntry {
    pub fn is_image(&self) -> bool {
        self.file_type.starts_with("image/")
    }
}

/// One item of a conversation timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversationEntry {
    Message(MessageEntry),
    FileTransfer(FileTransferEntry),
}

impl ConversationEntry {
    pub fn id(&self) -> &EntryId {
        match self {
            ConversationEntry::Message(m) => &m.id,
            ConversationEntry::FileTransfer(f) => &f.id,
        }
    }

    pub fn as_file(&self) -> Option<&FileTransferEntry> {
        match self {
            ConversationEntry::FileTransfer(f) => Some(f),
            ConversationEntry::Message(_) => None,
        }
    }

    /// Shallow merge: values from `newer` win, except that a known payload
    /// handle is never replaced by an absent one.
    fn merge_from(&mut self, newer: ConversationEntry) {
        match newer {
            ConversationEntry::FileTransfer(mut new) => {
                if let ConversationEntry::FileTransfer(old) = self {
                    if new.payload.is_none() {
                        new.payload = old.payload;
                    }
                    *old = new;
                    return;
                }
                warn!(id = %new.id, "Entry kind changed on upsert, replacing");
                *self = ConversationEntry::FileTransfer(new);
            }
            ConversationEntry::Message(new) => {
                if let ConversationEntry::Message(old) = self {
                    *old = new;
                    return;
                }
                warn!(id = %new.id, "Entry kind changed on upsert, replacing");
                *self = ConversationEntry::Message(new);
            }
        }
    }
}

/// Whether an upsert appended a new entry or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Appended,
    Merged,
}

#[derive(Debug, Default)]
struct Timeline {
    entries: Vec<ConversationEntry>,
    index: HashMap<EntryId, usize>,
    unread: usize,
}

/// All conversations of the session.
#[derive(Debug, Default)]
pub struct ConversationStore {
    timelines: HashMap<PeerId, Timeline>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge `entry` into the peer's timeline.
    ///
    /// `counts_unread` is true when the peer is not the open conversation;
    /// only appends increment the unread counter.
    pub fn upsert(&mut self, peer_id: &PeerId, entry: ConversationEntry, counts_unread: bool) -> Upsert {
        let timeline = self.timelines.entry(peer_id.clone()).or_default();

        if let Some(&pos) = timeline.index.get(entry.id()) {
            timeline.entries[pos].merge_from(entry);
            return Upsert::Merged;
        }

        timeline.index.insert(entry.id().clone(), timeline.entries.len());
        timeline.entries.push(entry);
        if counts_unread {
            timeline.unread += 1;
        }
        Upsert::Appended
    }

    /// Mutate a file entry in place. Returns the updated entry, or `None`
    /// when no file entry with that id exists for the peer.
    pub fn update_transfer<F>(&mut self, peer_id: &PeerId, id: &EntryId, f: F) -> Option<&ConversationEntry>
    where
        F: FnOnce(&mut FileTransferEntry),
    {
        let timeline = self.timelines.get_mut(peer_id)?;
        let pos = *timeline.index.get(id)?;
        let entry = &mut timeline.entries[pos];
        match &mut *entry {
            ConversationEntry::FileTransfer(file) => f(file),
            ConversationEntry::Message(_) => {
                debug!(peer = %peer_id, id = %id, "Transfer update for a text entry ignored");
                return None;
            }
        }
        Some(&*entry)
    }

    /// Ordered timeline of a peer (empty for unknown peers).
    pub fn timeline(&self, peer_id: &PeerId) -> &[ConversationEntry] {
        self.timelines
            .get(peer_id)
            .map(|t| t.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, peer_id: &PeerId, id: &EntryId) -> Option<&ConversationEntry> {
        let timeline = self.timelines.get(peer_id)?;
        timeline.index.get(id).map(|&pos| &timeline.entries[pos])
    }

    pub fn unread_count(&self, peer_id: &PeerId) -> usize {
        self.timelines.get(peer_id).map(|t| t.unread).unwrap_or(0)
    }

    pub fn clear_unread(&mut self, peer_id: &PeerId) {
        if let Some(timeline) = self.timelines.get_mut(peer_id) {
            timeline.unread = 0;
        }
    }

    /// Unread counts of every peer with at least one unread entry.
    pub fn unread_counts(&self) -> HashMap<PeerId, usize> {
        self.timelines
            .iter()
            .filter(|(_, t)| t.unread > 0)
            .map(|(peer, t)| (peer.clone(), t.unread))
            .collect()
    }
}
