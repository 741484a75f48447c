use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use sequencer_client::sync_engine::ConnectionState;
use sequencer_client::{ConnectionStatus, SyncEngine};
use sequencer_core::protocol::ClientMessage;
use tracing::info;

/// Thin demo client: joins a session over WebSocket, sends a clock sync
/// and a state-hash probe, then prints whatever the server broadcasts.
#[derive(Debug, Parser)]
#[command(name = "sequencer-client")]
struct Args {
    /// Session server base URL, e.g. ws://127.0.0.1:8080
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Session id to join.
    #[arg(long)]
    session: String,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let ws_url = format!("{}/sessions/{}/ws", args.server, args.session);
    info!(url = %ws_url, "sequencer client starting");

    let mut transport = sequencer_client::transport::spawn(ws_url);
    let mut engine = SyncEngine::new();

    loop {
        tokio::select! {
            status = transport.status_rx.recv() => {
                match status {
                    Some(ConnectionStatus::Connected) => {
                        engine.connection_state = ConnectionState::Connected;
                        for envelope in engine.on_reconnected(now_millis()) {
                            let _ = transport.outgoing_tx.send(envelope);
                        }
                        let _ = transport.outgoing_tx.send(sequencer_core::protocol::ClientEnvelope {
                            message: ClientMessage::ClockSyncRequest { client_time: now_millis() },
                            seq: None,
                            ack: None,
                        });
                    }
                    Some(ConnectionStatus::Reconnecting) | Some(ConnectionStatus::Connecting) => {
                        engine.on_disconnected();
                    }
                    None => break,
                }
            }
            incoming = transport.incoming_rx.recv() => {
                match incoming {
                    Some(msg) => {
                        info!(?msg, "received server message");
                        let follow_ups = engine.on_server_message(msg, now_millis());
                        for envelope in follow_ups {
                            let _ = transport.outgoing_tx.send(envelope);
                        }
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
