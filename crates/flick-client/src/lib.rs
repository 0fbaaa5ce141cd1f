//! # flick-client
//!
//! Async host for the Flick engine: a tokio task that owns the engine,
//! feeds it transport events and user commands, delivers its outbound
//! messages and forwards its change events to the UI.

pub mod config;
pub mod memory;
pub mod runtime;
pub mod settings;

pub use config::ClientConfig;
pub use memory::{MemoryHub, MemoryTransport};
pub use runtime::{spawn_client, ClientCommand, ClientHandle, TransportEvent};
pub use settings::{Settings, SettingsError, SettingsStore};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` overrides the defaults.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flick_client=debug,flick_core=info,flick_loopback=debug,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
