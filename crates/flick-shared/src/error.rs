use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Payload has no message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Serialization error: {0}")]
    Encode(#[source] serde_json::Error),
}
