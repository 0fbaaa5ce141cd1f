//! # flick-loopback
//!
//! Runs two Flick clients over the in-memory hub: one sends a few messages
//! and a file, the other prints its resulting state as JSON.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use flick_client::runtime::wait_for_event;
use flick_client::{init_tracing, spawn_client, ClientCommand, ClientConfig, MemoryHub, SettingsStore};
use flick_core::{ConversationEntry, Engine, EngineEvent, LocalIdentity, OutgoingFile, TransferStatus};
use flick_shared::constants::{APP_NAME, TOPIC};
use flick_shared::PeerId;

#[derive(Parser, Debug)]
#[command(author, version, about = "Flick - two clients chatting over a loopback transport")]
struct Args {
    /// Display name of the sending client (defaults to the saved name)
    #[clap(long)]
    sender_name: Option<String>,

    /// Display name of the receiving client
    #[clap(long, default_value = "Loopback Listener")]
    receiver_name: String,

    /// Number of text messages to send
    #[clap(short, long, default_value_t = 3)]
    messages: usize,

    /// Size in bytes of the generated file to send (0 = none)
    #[clap(long, default_value_t = 200 * 1024)]
    file_size: usize,

    /// Outbound chunk size in bytes
    #[clap(long, env = "FLICK_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Directory holding settings.json
    #[clap(long, env = "FLICK_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(size) = args.chunk_size.filter(|s| *s > 0) {
        config.chunk_size = size;
    }
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir.clone();
    }
    info!(app = APP_NAME, topic = TOPIC, ?config, "Starting loopback demo");

    let settings = match &config.data_dir {
        Some(dir) => SettingsStore::open_in(dir),
        None => SettingsStore::open_default()?,
    };
    let sender_identity = match args.sender_name.as_deref() {
        Some(name) => LocalIdentity::generate(Some(name)),
        None => settings.local_identity(),
    };

    let hub = MemoryHub::new();
    let (alice_transport, alice_rx) = hub.join("alice");
    let (bob_transport, bob_rx) = hub.join("bob");

    let mut alice = spawn_client(
        config.clone(),
        Engine::new(sender_identity, config.engine_config()),
        alice_transport,
        alice_rx,
        Some(settings),
    );
    let mut bob = spawn_client(
        config.clone(),
        Engine::new(LocalIdentity::generate(Some(&args.receiver_name)), config.engine_config()),
        bob_transport,
        bob_rx,
        None,
    );

    let receiver_name = args.receiver_name.trim().to_string();
    wait_for_event(&mut alice.events, WAIT, |ev| {
        matches!(ev, EngineEvent::PeerUpdated(r) if r.name == receiver_name)
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("Receiver never announced itself"))?;

    let bob_id = PeerId::from("bob");
    alice.send(ClientCommand::OpenConversation(bob_id.clone())).await?;
    for i in 1..=args.messages {
        alice
            .send(ClientCommand::SendMessage(format!("Hello #{i} from the loopback demo")))
            .await?;
    }

    if args.file_size > 0 {
        let data: Vec<u8> = (0..args.file_size).map(|i| (i % 251) as u8).collect();
        alice
            .send(ClientCommand::SendFile(OutgoingFile::new("sample.bin", "", data)))
            .await?;

        wait_for_event(&mut bob.events, WAIT, |ev| {
            matches!(ev, EngineEvent::EntryUpserted { entry: ConversationEntry::FileTransfer(f), .. }
                if f.status == TransferStatus::Complete)
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("File transfer did not complete"))?;
    } else if args.messages > 0 {
        let expected = args.messages;
        let mut seen = 0;
        wait_for_event(&mut bob.events, WAIT, |ev| {
            if matches!(ev, EngineEvent::EntryUpserted { entry: ConversationEntry::Message(_), .. }) {
                seen += 1;
            }
            seen >= expected
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("Messages did not arrive"))?;
    }

    bob.send(ClientCommand::OpenConversation(PeerId::from("alice"))).await?;
    let snapshot = bob.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    alice.shutdown().await?;
    bob.shutdown().await?;
    info!("Loopback demo finished");
    Ok(())
}
