use thiserror::Error;

use flick_shared::{PeerId, ProtocolError, TransferId};

/// Errors returned to the host from user-facing engine commands.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("No conversation is open")]
    NoActiveConversation,

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("File needs {chunks} chunks, peers accept at most {max}")]
    TooManyChunks { chunks: u32, max: u32 },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Reasons an inbound transfer message is rejected.
///
/// None of these touch the state of other transfers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransferError {
    #[error("No transfer state for {0}")]
    UnknownTransfer(TransferId),

    #[error("Chunk index {index} outside 0..{total}")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("Chunk declares {declared} chunks, transfer expects {expected}")]
    TotalMismatch { declared: u32, expected: u32 },

    #[error("Transfer {transfer} belongs to {owner}, not {sender}")]
    NotOwner {
        transfer: TransferId,
        owner: PeerId,
        sender: PeerId,
    },

    #[error("Invalid chunk count {0}")]
    InvalidChunkCount(u32),

    #[error("Chunks hold {received} bytes, file declares {declared}")]
    ExceedsDeclaredSize { received: u64, declared: u64 },
}
