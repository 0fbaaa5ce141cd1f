use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::TransferId;

/// Every `type` tag a peer may send.
pub const MESSAGE_TYPES: [&str; 5] = [
    "presence",
    "message",
    "file-meta",
    "file-chunk",
    "file-complete",
];

/// All wire protocol messages exchanged between peers.
///
/// Serialized as a JSON object tagged by `type` with camelCase fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    /// Identity and liveness announcement
    Presence(Presence),

    /// Text message
    Message(ChatMessage),

    /// File transfer header, always sent before any chunk
    FileMeta(FileMeta),

    /// One slice of a file
    FileChunk(FileChunk),

    /// Sent after the last chunk of a transfer
    FileComplete(FileComplete),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    /// Unix epoch millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Message id for deduplication; older clients omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub transfer_id: TransferId,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// BLAKE3 hash of the whole file (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub transfer_id: TransferId,
    pub index: u32,
    pub total_chunks: u32,
    /// Raw chunk bytes, encoded as an array of byte values
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplete {
    pub transfer_id: TransferId,
}

impl WireMessage {
    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Presence(_) => "presence",
            WireMessage::Message(_) => "message",
            WireMessage::FileMeta(_) => "file-meta",
            WireMessage::FileChunk(_) => "file-chunk",
            WireMessage::FileComplete(_) => "file-complete",
        }
    }

    /// Name carried by the message, if its kind carries one.
    pub fn sender_name(&self) -> Option<&str> {
        match self {
            WireMessage::Presence(p) => Some(&p.sender_name),
            WireMessage::Message(m) => Some(&m.sender_name),
            WireMessage::FileMeta(m) => Some(&m.sender_name),
            WireMessage::FileChunk(_) | WireMessage::FileComplete(_) => None,
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Deserialize from JSON bytes.
    ///
    /// Distinguishes undecodable input from a well-formed object whose
    /// `type` this client does not understand.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Malformed)?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        if !MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(ProtocolError::Malformed)
    }
}
