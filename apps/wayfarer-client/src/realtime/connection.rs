//! Connection driver: one task owns the socket for the lifetime of a
//! `ChannelManager` connection, including its reconnect cycles.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use wayfarer_common::id::{prefix, prefixed_ulid};

use crate::config::ChannelConfig;

use super::diagnostics::{ChannelDiagnostic, Diagnostics};
use super::frame::{self, Frame, Incoming};
use super::heartbeat::{Heartbeat, Liveness};
use super::manager::ChannelState;
use super::message::ChatMessage;
use super::registry::{Delivery, SubscriptionRegistry};

/// Time allowed for the socket to open, and then for CONNECTED to arrive.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the broker to acknowledge DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Placeholder period for the heart-beat ticker when sending is disabled.
const IDLE_TICK: Duration = Duration::from_secs(3600);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketTx = SplitSink<Socket, Message>;
type SocketRx = SplitStream<Socket>;

/// State shared between the manager handle and its driver task.
pub(crate) struct Shared {
    pub config: ChannelConfig,
    pub state: watch::Sender<ChannelState>,
    pub registry: SubscriptionRegistry,
    pub diagnostics: Diagnostics,
}

impl Shared {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: watch::Sender::new(ChannelState::Idle),
            registry: SubscriptionRegistry::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn set_state(&self, next: ChannelState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(?prev, ?next, "chat channel state changed");
        }
    }
}

enum Exit {
    Cancelled,
    Disrupted,
}

/// Drive connection cycles until cancelled, or until a disruption with
/// reconnects disabled.
pub(crate) async fn run(
    shared: Arc<Shared>,
    mut outbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        shared.set_state(ChannelState::Connecting);
        // Anything still queued was meant for a session that no longer exists.
        while outbound.try_recv().is_ok() {}

        tracing::debug!(url = %shared.config.ws_url, attempt, "opening chat connection");
        match cycle(&shared, &mut outbound, &cancel).await {
            Exit::Cancelled => return,
            Exit::Disrupted => {
                let dropped = shared.registry.reset();
                shared.set_state(ChannelState::Failed);

                let delay = shared.config.reconnect_delay;
                if delay.is_zero() {
                    tracing::warn!(dropped, "chat connection lost; reconnect disabled");
                    shared.set_state(ChannelState::Idle);
                    return;
                }
                tracing::warn!(
                    dropped,
                    delay_ms = delay.as_millis() as u64,
                    "chat connection lost; reconnecting"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }
}

/// One connection: open, negotiate, serve until it ends.
async fn cycle(
    shared: &Shared,
    outbound: &mut mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> Exit {
    let config = &shared.config;

    let socket = tokio::select! {
        _ = cancel.cancelled() => return Exit::Cancelled,
        res = time::timeout(CONNECT_TIMEOUT, connect_async(config.ws_url.as_str())) => match res {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(err)) => {
                shared.diagnostics.report(ChannelDiagnostic::ConnectFailed(err.to_string()));
                return Exit::Disrupted;
            }
            Err(_) => {
                shared.diagnostics.report(ChannelDiagnostic::ConnectFailed(
                    "timed out opening socket".into(),
                ));
                return Exit::Disrupted;
            }
        }
    };
    let (mut tx, mut rx) = socket.split();

    let offer = (
        config.heartbeat_outgoing.as_millis() as u64,
        config.heartbeat_incoming.as_millis() as u64,
    );
    if let Err(err) = send_frame(&mut tx, &Frame::connect(&host_of(&config.ws_url), offer)).await {
        shared.diagnostics.report(ChannelDiagnostic::ConnectFailed(err.to_string()));
        return Exit::Disrupted;
    }

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = tx.send(Message::Close(None)).await;
            return Exit::Cancelled;
        }
        res = time::timeout(CONNECT_TIMEOUT, await_connected(&mut rx, &shared.diagnostics)) => match res {
            Ok(Ok(frame)) => frame,
            Ok(Err(reason)) => {
                shared.diagnostics.report(ChannelDiagnostic::ConnectFailed(reason));
                return Exit::Disrupted;
            }
            Err(_) => {
                shared.diagnostics.report(ChannelDiagnostic::ConnectFailed(
                    "no CONNECTED frame within timeout".into(),
                ));
                return Exit::Disrupted;
            }
        }
    };

    let heartbeat = Heartbeat::negotiate(
        config.heartbeat_outgoing,
        config.heartbeat_incoming,
        connected.get("heart-beat"),
    );

    for (id, topic) in shared.registry.go_live() {
        if send_frame(&mut tx, &Frame::subscribe(&id, &topic)).await.is_err() {
            return Exit::Disrupted;
        }
        tracing::debug!(subscription = %id, %topic, "subscribed");
    }
    shared.set_state(ChannelState::Connected);
    tracing::info!(
        version = connected.get("version").unwrap_or("?"),
        outgoing_ms = heartbeat.outgoing.map(|d| d.as_millis() as u64),
        incoming_ms = heartbeat.incoming.map(|d| d.as_millis() as u64),
        "chat channel connected"
    );

    serve(shared, heartbeat, tx, rx, outbound, cancel).await
}

/// Main loop of a live broker session.
async fn serve(
    shared: &Shared,
    heartbeat: Heartbeat,
    mut tx: SocketTx,
    mut rx: SocketRx,
    outbound: &mut mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> Exit {
    let mut liveness = Liveness::new(heartbeat.incoming_deadline());
    let mut ticker = time::interval(heartbeat.outgoing.unwrap_or(IDLE_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // First tick fires immediately; skip it.

    loop {
        let expiry = liveness.expires_at();

        tokio::select! {
            _ = cancel.cancelled() => {
                close_gracefully(&mut tx, &mut rx).await;
                return Exit::Cancelled;
            }

            next = outbound.recv() => {
                let Some(frame) = next else {
                    // The manager is gone.
                    close_gracefully(&mut tx, &mut rx).await;
                    return Exit::Cancelled;
                };
                if let Err(err) = send_frame(&mut tx, &frame).await {
                    tracing::debug!(%err, command = %frame.command, "chat socket write failed");
                    return Exit::Disrupted;
                }
            }

            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        liveness.touch();
                        for reply in dispatch(shared, text.as_str()) {
                            if send_frame(&mut tx, &reply).await.is_err() {
                                return Exit::Disrupted;
                            }
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        tracing::debug!(?close, "broker closed the chat socket");
                        return Exit::Disrupted;
                    }
                    Some(Ok(_)) => liveness.touch(),
                    Some(Err(err)) => {
                        tracing::debug!(%err, "chat socket read error");
                        return Exit::Disrupted;
                    }
                    None => return Exit::Disrupted,
                }
            }

            _ = ticker.tick(), if heartbeat.outgoing.is_some() => {
                if tx.send(Message::Text("\n".into())).await.is_err() {
                    return Exit::Disrupted;
                }
            }

            _ = time::sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                if !liveness.is_expired() {
                    continue;
                }
                tracing::debug!(silence_ms = liveness.silence().as_millis() as u64, "broker went quiet");
                shared.diagnostics.report(ChannelDiagnostic::HeartbeatTimeout);
                let _ = tx.send(Message::Close(None)).await;
                return Exit::Disrupted;
            }
        }
    }
}

/// Handle one inbound text message and return the frames to send back.
fn dispatch(shared: &Shared, text: &str) -> Vec<Frame> {
    let mut replies = Vec::new();
    let items = match frame::decode(text) {
        Ok(items) => items,
        Err(err) => {
            shared
                .diagnostics
                .report(ChannelDiagnostic::MalformedFrame(err.to_string()));
            return replies;
        }
    };

    for item in items {
        let Incoming::Frame(frame) = item else {
            continue;
        };
        match frame.command.as_str() {
            frame::MESSAGE => {
                if let Some(reply) = deliver(shared, &frame) {
                    replies.push(reply);
                }
            }
            frame::ERROR => shared.diagnostics.report(ChannelDiagnostic::BrokerError {
                message: frame.get("message").unwrap_or_default().to_string(),
                details: frame.body,
            }),
            frame::RECEIPT => {
                tracing::debug!(receipt = frame.get("receipt-id"), "receipt");
            }
            other => tracing::debug!(command = %other, "ignoring broker frame"),
        }
    }
    replies
}

fn deliver(shared: &Shared, frame: &Frame) -> Option<Frame> {
    let destination = frame.get("destination");
    let message: ChatMessage = match serde_json::from_str(&frame.body) {
        Ok(m) => m,
        Err(err) => {
            shared.diagnostics.report(ChannelDiagnostic::UndecodableMessage {
                destination: destination.unwrap_or_default().to_string(),
                error: err.to_string(),
            });
            return None;
        }
    };

    match shared
        .registry
        .deliver(frame.get("subscription"), destination, message)
    {
        Delivery::Delivered => None,
        Delivery::NoSubscriber => {
            tracing::debug!(?destination, "message for unknown subscription");
            None
        }
        Delivery::QueueFull => {
            tracing::warn!(?destination, "subscriber queue full; message dropped");
            None
        }
        Delivery::Closed { id } => {
            if shared.registry.remove_if_closed(&id) {
                tracing::debug!(subscription = %id, "subscriber gone; unsubscribing");
                Some(Frame::unsubscribe(&id))
            } else {
                None
            }
        }
    }
}

/// Read until CONNECTED. A broker ERROR here means the session was refused.
async fn await_connected(rx: &mut SocketRx, diagnostics: &Diagnostics) -> Result<Frame, String> {
    while let Some(msg) = rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Err("socket closed during handshake".into()),
            Ok(_) => continue,
            Err(err) => return Err(err.to_string()),
        };
        let items = frame::decode(text.as_str()).map_err(|e| e.to_string())?;
        for item in items {
            match item {
                Incoming::Frame(f) if f.is(frame::CONNECTED) => return Ok(f),
                Incoming::Frame(f) if f.is(frame::ERROR) => {
                    let message = f.get("message").unwrap_or_default().to_string();
                    diagnostics.report(ChannelDiagnostic::BrokerError {
                        message: message.clone(),
                        details: f.body,
                    });
                    return Err(format!("broker refused session: {message}"));
                }
                _ => {}
            }
        }
    }
    Err("socket ended during handshake".into())
}

/// Send DISCONNECT, wait briefly for its receipt, then close the socket.
async fn close_gracefully(tx: &mut SocketTx, rx: &mut SocketRx) {
    let receipt = prefixed_ulid(prefix::RECEIPT);
    if send_frame(tx, &Frame::disconnect(&receipt)).await.is_ok() {
        let acknowledged = time::timeout(DISCONNECT_GRACE, async {
            while let Some(Ok(msg)) = rx.next().await {
                let Message::Text(text) = msg else { continue };
                let Ok(items) = frame::decode(text.as_str()) else { continue };
                let got_receipt = items.iter().any(|item| {
                    matches!(item, Incoming::Frame(f)
                        if f.is(frame::RECEIPT) && f.get("receipt-id") == Some(receipt.as_str()))
                });
                if got_receipt {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        tracing::debug!(acknowledged, "chat session disconnected");
    }
    let _ = tx.send(Message::Close(None)).await;
}

async fn send_frame(
    tx: &mut SocketTx,
    frame: &Frame,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    tx.send(Message::Text(frame.encode().into())).await
}

/// Value of the CONNECT `host` header: `host[:port]` of the endpoint.
fn host_of(ws_url: &str) -> String {
    reqwest::Url::parse(ws_url)
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_string();
            Some(match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .unwrap_or_else(|| "localhost".to_string())
}
