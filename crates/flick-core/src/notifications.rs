//! Bounded feed of unseen-event summaries.
//!
//! New items are appended; once the feed holds more than its capacity the
//! oldest item is evicted (FIFO, not LRU). Items are dismissed one at a
//! time or all at once for a peer when its conversation is opened.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use flick_shared::constants::{FALLBACK_SENDER_NAME, NOTIFICATION_CAPACITY, PREVIEW_MAX_CHARS};
use flick_shared::PeerId;

use crate::payload::PayloadHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    /// Assigned by the feed on push.
    pub id: NotificationId,
    pub peer_id: PeerId,
    pub kind: NotificationKind,
    pub title: String,
    pub preview: String,
    /// Image payload for thumbnail previews.
    pub image: Option<PayloadHandle>,
}

impl NotificationItem {
    pub fn message(peer_id: PeerId, sender_name: &str, text: &str) -> Self {
        Self {
            id: NotificationId(0),
            peer_id,
            kind: NotificationKind::Message,
            title: title_for(sender_name),
            preview: truncate(text, PREVIEW_MAX_CHARS),
            image: None,
        }
    }

    pub fn image(peer_id: PeerId, sender_name: &str, handle: PayloadHandle) -> Self {
        let title = title_for(sender_name);
        Self {
            id: NotificationId(0),
            peer_id,
            kind: NotificationKind::Image,
            preview: format!("New image sent by: {title}"),
            title,
            image: Some(handle),
        }
    }

    pub fn file(peer_id: PeerId, sender_name: &str, file_name: &str) -> Self {
        Self {
            id: NotificationId(0),
            peer_id,
            kind: NotificationKind::File,
            title: title_for(sender_name),
            preview: format!("New file sent: {file_name}"),
            image: None,
        }
    }
}

fn title_for(sender_name: &str) -> String {
    if sender_name.trim().is_empty() {
        FALLBACK_SENDER_NAME.to_string()
    } else {
        sender_name.to_string()
    }
}

/// Shorten `value` to at most `max` characters, ending with an ellipsis.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[derive(Debug)]
pub struct NotificationFeed {
    items: VecDeque<NotificationItem>,
    capacity: usize,
    next_id: u64,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Append an item, evicting the oldest one past capacity.
    pub fn push(&mut self, mut item: NotificationItem) -> NotificationId {
        item.id = NotificationId(self.next_id);
        self.next_id += 1;
        let id = item.id;

        self.items.push_back(item);
        while self.items.len() > self.capacity {
            if let Some(evicted) = self.items.pop_front() {
                debug!(id = evicted.id.0, peer = %evicted.peer_id, "Notification evicted");
            }
        }
        id
    }

    /// Remove every pending item for `peer_id`. Returns how many were removed.
    pub fn dismiss_peer(&mut self, peer_id: &PeerId) -> usize {
        let before = self.items.len();
        self.items.retain(|item| &item.peer_id != peer_id);
        before - self.items.len()
    }

    /// Remove a single item.
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        before != self.items.len()
    }

    /// Pending items, oldest first.
    pub fn items(&self) -> Vec<NotificationItem> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(NOTIFICATION_CAPACITY)
    }
}
