//! # flick-core
//!
//! Host-driven session and transfer engine for the Flick chat client.
//!
//! The crate performs no I/O. The host feeds transport events and user
//! commands into an [`Engine`], hands the returned [`Outbound`] messages to
//! its transport, and renders from the [`EngineEvent`] snapshots drained
//! after each call.

pub mod conversations;
pub mod engine;
pub mod events;
pub mod notifications;
pub mod payload;
pub mod peers;
pub mod router;
pub mod transfer;
pub mod transport;

mod error;

pub use conversations::{ConversationEntry, ConversationStore, FileTransferEntry, MessageEntry, Sender};
pub use engine::{Engine, EngineConfig, LocalIdentity};
pub use error::{EngineError, TransferError};
pub use events::{EngineEvent, EngineSnapshot};
pub use notifications::{NotificationFeed, NotificationId, NotificationItem, NotificationKind};
pub use payload::{Payload, PayloadHandle, PayloadStore};
pub use peers::{PeerDirectory, PeerRecord, PeerStatus};
pub use router::RouteOutcome;
pub use transfer::{Integrity, OutgoingFile, OutgoingTransfer, TransferStatus};
pub use transport::{deliver, Delivery, Outbound, Target, Transport, TransportError};
