//! Wire protocol, identifiers and constants shared by every Flick crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::WireMessage;
pub use types::{EntryId, PeerId, TransferId};
