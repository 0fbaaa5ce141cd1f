/// Application name
pub const APP_NAME: &str = "Flick";

/// Rendezvous topic every client announces on
pub const TOPIC: &str = "flick-webrtc-lan-v1";

/// File chunk size in bytes (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Presence broadcast interval in milliseconds
pub const PRESENCE_INTERVAL_MS: u64 = 8_000;

/// Maximum number of pending notifications kept in the feed
pub const NOTIFICATION_CAPACITY: usize = 4;

/// Maximum outbound file size in bytes (2 GiB)
pub const MAX_FILE_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Upper bound on the chunk count a peer may declare for one transfer
pub const MAX_TOTAL_CHUNKS: u32 = 65_536;

/// Placeholder name for peers that have not announced themselves yet
pub const UNKNOWN_PEER_NAME: &str = "Unknown peer";

/// Sender label used when a message carries no name
pub const FALLBACK_SENDER_NAME: &str = "Peer";

/// Maximum characters of a text message shown in a notification preview
pub const PREVIEW_MAX_CHARS: usize = 72;

/// MIME type assumed when a file declares none
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Seconds without a chunk before an inbound transfer is abandoned
pub const TRANSFER_IDLE_SECS: u64 = 120;

/// Settings file name inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";
