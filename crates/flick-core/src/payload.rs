//! Opaque handles for file payloads.
//!
//! Conversation entries and notifications only carry a [`PayloadHandle`].
//! The host resolves it against the engine's [`PayloadStore`] when it needs
//! the bytes (to save, preview or open a file).

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PayloadHandle(pub Uuid);

impl std::fmt::Display for PayloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete file held in memory.
#[derive(Debug, Clone)]
pub struct Payload {
    pub file_name: String,
    pub file_type: String,
    pub data: Bytes,
}

/// Session-only store of sent and received files.
#[derive(Debug, Default)]
pub struct PayloadStore {
    payloads: HashMap<PayloadHandle, Payload>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, payload: Payload) -> PayloadHandle {
        let handle = PayloadHandle(Uuid::new_v4());
        self.payloads.insert(handle, payload);
        handle
    }

    pub fn get(&self, handle: &PayloadHandle) -> Option<&Payload> {
        self.payloads.get(handle)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}
