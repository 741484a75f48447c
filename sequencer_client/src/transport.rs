//! WebSocket and REST transport. The WebSocket half reconnects under
//! [`crate::reconnect::Backoff`]; the REST half retries idempotent and
//! retryable requests under the same policy (§5).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sequencer_core::protocol::{ClientEnvelope, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::reconnect::Backoff;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Spawns the send/receive tasks for one session's WebSocket connection.
/// Reconnects with [`Backoff`] whenever the socket drops; the caller
/// observes connection transitions via `status_tx`.
pub struct WsTransport {
    pub outgoing_tx: mpsc::UnboundedSender<ClientEnvelope>,
    pub incoming_rx: mpsc::UnboundedReceiver<ServerMessage>,
    pub status_rx: mpsc::UnboundedReceiver<ConnectionStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
}

pub fn spawn(ws_url: String) -> WsTransport {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<ClientEnvelope>();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (status_tx, status_rx) = mpsc::unbounded_channel::<ConnectionStatus>();

    tokio::spawn(connection_loop(ws_url, outgoing_rx, incoming_tx, status_tx));

    WsTransport { outgoing_tx, incoming_rx, status_rx }
}

async fn connection_loop(
    ws_url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<ClientEnvelope>,
    incoming_tx: mpsc::UnboundedSender<ServerMessage>,
    status_tx: mpsc::UnboundedSender<ConnectionStatus>,
) {
    let mut backoff = Backoff::new();
    let mut first_attempt = true;

    loop {
        let _ = status_tx.send(if first_attempt {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting
        });

        match connect_async(&ws_url).await {
            Ok((stream, _)) => {
                info!(url = %ws_url, "websocket connected");
                backoff.reset();
                first_attempt = false;
                let _ = status_tx.send(ConnectionStatus::Connected);

                let (mut write, mut read) = stream.split();
                loop {
                    tokio::select! {
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<ServerMessage>(&text) {
                                        Ok(msg) => {
                                            if incoming_tx.send(msg).is_err() {
                                                return;
                                            }
                                        }
                                        Err(e) => warn!(error = %e, "failed to parse server message"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    info!("websocket closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!(error = %e, "websocket read error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                        outgoing = outgoing_rx.recv() => {
                            match outgoing {
                                Some(envelope) => {
                                    let json = match serde_json::to_string(&envelope) {
                                        Ok(j) => j,
                                        Err(e) => {
                                            error!(error = %e, "failed to serialize client envelope");
                                            continue;
                                        }
                                    };
                                    if tokio::time::timeout(WRITE_TIMEOUT, write.send(Message::Text(json)))
                                        .await
                                        .is_err()
                                    {
                                        error!("websocket write timed out");
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to connect websocket");
            }
        }

        let delay = backoff.next_delay();
        tokio::time::sleep(delay).await;
    }
}

/// Thin REST client honoring the retry/backoff and `Retry-After` policy
/// from §5: retries on 408/429/5xx and network errors, honors
/// `Retry-After` (seconds or HTTP-date), surfaces long 503 waits instead
/// of retrying them.
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> RestClient {
        RestClient {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        self.request_with_retry(reqwest::Method::GET, path, None, DEFAULT_TIMEOUT).await
    }

    pub async fn put_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let payload = serde_json::to_vec(body)?;
        self.request_with_retry(reqwest::Method::PUT, path, Some(payload), WRITE_TIMEOUT).await
    }

    pub async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let payload = serde_json::to_vec(body)?;
        self.request_with_retry(reqwest::Method::POST, path, Some(payload), WRITE_TIMEOUT).await
    }

    async fn request_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> anyhow::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut backoff = Backoff::new();

        loop {
            let mut req = self.http.request(method.clone(), &url).timeout(timeout);
            if let Some(b) = &body {
                req = req.header("content-type", "application/json").body(b.clone());
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }
                    if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
                        let retry_after = retry_after_secs(resp.headers());
                        if status.as_u16() == 503 {
                            if let Some(secs) = retry_after {
                                if secs > 60 {
                                    anyhow::bail!("server unavailable, retry after {secs}s");
                                }
                            }
                        }
                        let delay = retry_after
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| backoff.next_delay());
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    anyhow::bail!("request failed with status {status}");
                }
                Err(e) => {
                    warn!(error = %e, "rest request failed, retrying");
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }
}

fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    raw.parse::<u64>().ok()
}
