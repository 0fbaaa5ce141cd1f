//! Client event loop.
//!
//! One tokio task owns the [`Engine`]. Transport events, UI commands and
//! presence ticks are serialized through a single `select!` loop, so the
//! engine never needs a lock. After every step the buffered engine events
//! are forwarded to the UI channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use flick_core::{
    deliver, Delivery, Engine, EngineEvent, EngineSnapshot, NotificationId, OutgoingFile, Outbound,
    Transport,
};
use flick_shared::PeerId;

use crate::config::ClientConfig;
use crate::settings::SettingsStore;

/// Events produced by the P2P layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Data { peer: PeerId, bytes: Bytes },
}

/// Commands sent *into* the client task.
#[derive(Debug)]
pub enum ClientCommand {
    OpenConversation(PeerId),
    /// Text for the open conversation.
    SendMessage(String),
    /// File for the open conversation.
    SendFile(OutgoingFile),
    SendFileTo {
        peer: PeerId,
        file: OutgoingFile,
    },
    SetDisplayName(String),
    DismissNotification(NotificationId),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    /// Stop the loop. Pending transport events are discarded.
    Shutdown,
}

/// Handle to a running client task.
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
    /// Engine change events, in production order.
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    task: JoinHandle<Engine>,
}

impl ClientHandle {
    pub async fn send(&self, command: ClientCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Client task has stopped"))
    }

    pub fn commands(&self) -> mpsc::Sender<ClientCommand> {
        self.commands.clone()
    }

    pub async fn snapshot(&self) -> anyhow::Result<EngineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::Snapshot(tx)).await?;
        Ok(rx.await?)
    }

    /// Stop the task and return the engine for inspection.
    pub async fn shutdown(self) -> anyhow::Result<Engine> {
        // The task may already have stopped; the join below reports that.
        let _ = self.commands.send(ClientCommand::Shutdown).await;
        Ok(self.task.await?)
    }
}

/// Spawn the client loop on the current tokio runtime.
///
/// # Arguments
///
/// * `config` - Timer and transfer settings
/// * `engine` - Engine owned by the task from now on
/// * `transport` - Send primitives of the P2P layer
/// * `transport_rx` - Events of the P2P layer
/// * `settings` - Where display-name changes are persisted, if anywhere
pub fn spawn_client<T>(
    config: ClientConfig,
    mut engine: Engine,
    transport: T,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    settings: Option<SettingsStore>,
) -> ClientHandle
where
    T: Transport + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(256);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<EngineEvent>();
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let task = tokio::spawn(async move {
        let period = config.presence_period();
        let mut presence = tokio::time::interval(period);
        presence.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut transport_open = true;

        info!(
            id = %engine.identity().id,
            name = %engine.identity().name,
            interval_ms = period.as_millis() as u64,
            "Client loop started"
        );

        loop {
            tokio::select! {
                // --- UI commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Shutdown) => {
                            info!("Client shutdown requested");
                            break;
                        }
                        Some(cmd) => handle_command(&mut engine, transport.as_ref(), settings.as_ref(), cmd),
                        None => {
                            info!("Command channel closed, stopping client");
                            break;
                        }
                    }
                }

                // --- Transport events ---
                event = transport_rx.recv(), if transport_open => {
                    match event {
                        Some(event) => handle_transport(&mut engine, transport.as_ref(), event),
                        None => {
                            warn!("Transport event channel closed");
                            transport_open = false;
                        }
                    }
                }

                // --- Presence timer (first tick fires immediately) ---
                _ = presence.tick() => {
                    send(transport.as_ref(), &engine.presence_broadcast());
                    let swept = engine.sweep_idle_transfers(config.transfer_idle_timeout);
                    if swept > 0 {
                        debug!(swept, "Idle transfers abandoned");
                    }
                }
            }

            for event in engine.drain_events() {
                // A dropped UI receiver is not fatal; the engine keeps running.
                let _ = event_tx.send(event);
            }
        }

        info!("Client loop stopped");
        engine
    });

    ClientHandle {
        commands: cmd_tx,
        events: event_rx,
        task,
    }
}

fn handle_transport(engine: &mut Engine, transport: &dyn Transport, event: TransportEvent) {
    match event {
        TransportEvent::PeerConnected(peer) => {
            let hello = engine.on_peer_connected(&peer);
            send(transport, &hello);
        }
        TransportEvent::PeerDisconnected(peer) => engine.on_peer_disconnected(&peer),
        TransportEvent::Data { peer, bytes } => {
            let outcome = engine.on_data(&peer, &bytes);
            debug!(peer = %peer, len = bytes.len(), outcome = ?outcome, "Payload routed");
        }
    }
}

fn handle_command(
    engine: &mut Engine,
    transport: &dyn Transport,
    settings: Option<&SettingsStore>,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::OpenConversation(peer) => {
            if let Err(e) = engine.open_conversation(&peer) {
                warn!(peer = %peer, error = %e, "Cannot open conversation");
            }
        }
        ClientCommand::SendMessage(text) => match engine.send_message(&text) {
            Ok(outbound) => {
                send(transport, &outbound);
            }
            Err(e) => warn!(error = %e, "Message not sent"),
        },
        ClientCommand::SendFile(file) => match engine.send_file(file) {
            Ok(transfer) => send_transfer(transport, transfer),
            Err(e) => warn!(error = %e, "File not sent"),
        },
        ClientCommand::SendFileTo { peer, file } => match engine.send_file_to(&peer, file) {
            Ok(transfer) => send_transfer(transport, transfer),
            Err(e) => warn!(peer = %peer, error = %e, "File not sent"),
        },
        ClientCommand::SetDisplayName(name) => {
            let announce = engine.set_display_name(&name);
            if let Some(store) = settings {
                if let Err(e) = store.save_display_name(&engine.identity().name) {
                    warn!(error = %e, "Failed to persist display name");
                }
            }
            send(transport, &announce);
        }
        ClientCommand::DismissNotification(id) => {
            engine.dismiss_notification(id);
        }
        ClientCommand::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        ClientCommand::Shutdown => {}
    }
}

fn send_transfer(transport: &dyn Transport, transfer: flick_core::OutgoingTransfer) {
    let peer = transfer.peer_id().clone();
    let mut dropped = 0usize;
    for message in transfer.messages() {
        if !send(transport, &Outbound::to_peer(peer.clone(), message)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!(peer = %peer, transfer = %transfer.transfer_id(), dropped, "Transfer sent with losses");
    }
}

/// Deliver one message. Returns `false` when it was dropped.
fn send(transport: &dyn Transport, outbound: &Outbound) -> bool {
    match deliver(transport, outbound) {
        Ok(Delivery::Dropped) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound message");
            false
        }
    }
}

/// Wait for an event matching `pred`, up to `timeout`.
pub async fn wait_for_event<F>(
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    timeout: Duration,
    mut pred: F,
) -> Option<EngineEvent>
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use flick_core::{ConversationEntry, EngineConfig, LocalIdentity, TransferStatus};
    use flick_shared::WireMessage;

    use super::*;
    use crate::memory::MemoryHub;

    const WAIT: Duration = Duration::from_secs(2);

    fn config(presence_ms: u64) -> ClientConfig {
        ClientConfig {
            presence_interval: Duration::from_millis(presence_ms),
            chunk_size: 8,
            ..ClientConfig::default()
        }
    }

    fn start(hub: &MemoryHub, id: &str, name: &str, presence_ms: u64) -> ClientHandle {
        let (transport, rx) = hub.join(id);
        let cfg = config(presence_ms);
        let engine = Engine::new(LocalIdentity::new(id, name), cfg.engine_config());
        spawn_client(cfg, engine, transport, rx, None)
    }

    async fn wait_for_peer(handle: &mut ClientHandle, peer: &str, name: &str) {
        let found = wait_for_event(&mut handle.events, WAIT, |ev| {
            matches!(ev, EngineEvent::PeerUpdated(r) if r.id == PeerId::from(peer) && r.name == name)
        })
        .await;
        assert!(found.is_some(), "peer {peer} never announced itself as {name}");
    }

    #[tokio::test]
    async fn test_presence_introduces_peers() {
        let hub = MemoryHub::new();
        let mut a = start(&hub, "a", "Swift Comet", 50);
        let mut b = start(&hub, "b", "Calm Nova", 50);

        wait_for_peer(&mut a, "b", "Calm Nova").await;
        wait_for_peer(&mut b, "a", "Swift Comet").await;

        let snap = a.snapshot().await.unwrap();
        assert_eq!(snap.peers.len(), 1);
        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_message_between_clients() {
        let hub = MemoryHub::new();
        let mut a = start(&hub, "a", "Swift Comet", 1_000);
        let mut b = start(&hub, "b", "Calm Nova", 1_000);
        wait_for_peer(&mut a, "b", "Calm Nova").await;

        a.send(ClientCommand::OpenConversation(PeerId::from("b"))).await.unwrap();
        a.send(ClientCommand::SendMessage("hello there".into())).await.unwrap();

        let got = wait_for_event(&mut b.events, WAIT, |ev| {
            matches!(ev, EngineEvent::EntryUpserted { entry: ConversationEntry::Message(m), .. } if m.text == "hello there")
        })
        .await;
        assert!(got.is_some());

        let engine = b.shutdown().await.unwrap();
        assert_eq!(engine.unread_count(&PeerId::from("a")), 1);
        assert_eq!(engine.notifications().len(), 1);
        a.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_between_clients() {
        let hub = MemoryHub::new();
        let mut a = start(&hub, "a", "Swift Comet", 1_000);
        let mut b = start(&hub, "b", "Calm Nova", 1_000);
        wait_for_peer(&mut a, "b", "Calm Nova").await;

        let data: Vec<u8> = (0..100u8).collect();
        a.send(ClientCommand::SendFileTo {
            peer: PeerId::from("b"),
            file: OutgoingFile::new("notes.txt", "text/plain", data.clone()),
        })
        .await
        .unwrap();

        let done = wait_for_event(&mut b.events, WAIT, |ev| {
            matches!(ev, EngineEvent::EntryUpserted { entry: ConversationEntry::FileTransfer(f), .. }
                if f.status == TransferStatus::Complete)
        })
        .await;
        let handle = match done {
            Some(EngineEvent::EntryUpserted { entry: ConversationEntry::FileTransfer(f), .. }) => f.payload,
            other => panic!("transfer never completed: {other:?}"),
        };

        let engine = b.shutdown().await.unwrap();
        let payload = engine.payload(&handle.unwrap()).unwrap();
        assert_eq!(payload.data, data);
        assert_eq!(payload.file_name, "notes.txt");
        a.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_marks_peer_away() {
        let hub = MemoryHub::new();
        let mut a = start(&hub, "a", "Swift Comet", 50);
        let b = start(&hub, "b", "Calm Nova", 50);
        wait_for_peer(&mut a, "b", "Calm Nova").await;

        b.shutdown().await.unwrap();
        hub.leave("b");

        let away = wait_for_event(&mut a.events, WAIT, |ev| {
            matches!(ev, EngineEvent::PeerUpdated(r) if r.status == flick_core::PeerStatus::Away)
        })
        .await;
        assert!(away.is_some());
        a.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_presence_after_shutdown() {
        let hub = MemoryHub::new();
        let client = start(&hub, "a", "Swift Comet", 20);
        let (_observer, mut observed) = hub.join("observer");

        // At least the immediate tick and one periodic tick
        let mut presences = 0;
        while presences < 2 {
            match tokio::time::timeout(WAIT, observed.recv()).await {
                Ok(Some(TransportEvent::Data { bytes, .. })) => {
                    if matches!(WireMessage::from_bytes(&bytes), Ok(WireMessage::Presence(_))) {
                        presences += 1;
                    }
                }
                Ok(Some(_)) => {}
                other => panic!("presence stopped early: {other:?}"),
            }
        }

        client.shutdown().await.unwrap();
        while observed.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(observed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_zero_presence_interval_still_runs() {
        let hub = MemoryHub::new();
        let mut a = start(&hub, "a", "Swift Comet", 0);
        let mut b = start(&hub, "b", "Calm Nova", 0);

        wait_for_peer(&mut b, "a", "Swift Comet").await;
        let snap = a.snapshot().await.unwrap();
        assert_eq!(snap.self_name, "Swift Comet");
        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_display_name_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open_in(dir.path());
        let hub = MemoryHub::new();
        let (transport, rx) = hub.join("a");
        let engine = Engine::new(store.local_identity(), EngineConfig::default());
        let mut client = spawn_client(config(1_000), engine, transport, rx, Some(store.clone()));

        client.send(ClientCommand::SetDisplayName("Nimble Aurora".into())).await.unwrap();
        let updated = wait_for_event(&mut client.events, WAIT, |ev| {
            matches!(ev, EngineEvent::SelfUpdated { .. })
        })
        .await;
        assert!(updated.is_some());
        client.shutdown().await.unwrap();

        assert_eq!(store.load().unwrap().display_name.as_deref(), Some("Nimble Aurora"));
        assert_eq!(store.local_identity().name, "Nimble Aurora");
    }
}
