//! Public handle over the single broker connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::error::{ClientError, Result};

use super::connection::{self, Shared};
use super::diagnostics::ChannelDiagnostic;
use super::frame::Frame;
use super::message::{validate_room_id, ChatMessage, PUBLISH_DESTINATION};

/// Frames queued for the driver before `publish` starts failing.
const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

struct Driver {
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
    /// Held across the whole of `connect` and `disconnect`. The teardown in
    /// `disconnect` only ever applies to the driver it took.
    lifecycle: AsyncMutex<()>,
}

/// Owner of at most one broker connection, shared by every room subscription.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared::new(config)),
                driver: Mutex::new(None),
                lifecycle: AsyncMutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.inner.shared.state.subscribe()
    }

    pub fn diagnostics(&self) -> broadcast::Receiver<ChannelDiagnostic> {
        self.inner.shared.diagnostics.subscribe()
    }

    /// Rooms with a live subscription.
    pub fn rooms(&self) -> Vec<String> {
        self.inner.shared.registry.rooms()
    }

    /// Join a room, opening the connection first if there is none.
    ///
    /// Joining a room that already has a subscription replaces it: the
    /// previous `RoomSubscription` stops receiving. While the connection is
    /// still being negotiated the subscription is sent as soon as the broker
    /// accepts the session. A `connect` racing a `disconnect` waits for the
    /// old connection to be gone and then opens a fresh one.
    pub async fn connect(&self, room_id: &str) -> Result<RoomSubscription> {
        validate_room_id(room_id)?;
        let _lifecycle = self.inner.lifecycle.lock().await;

        let mut driver = self.inner.driver.lock();
        let registration = self.inner.shared.registry.register(room_id);

        // A driver that already went Idle is on its way out.
        let running = driver.as_ref().is_some_and(|d| !d.handle.is_finished())
            && self.state() != ChannelState::Idle;
        if !running {
            *driver = Some(self.spawn_driver());
        } else if registration.subscribe_now {
            if let Some(d) = driver.as_ref() {
                let frame = Frame::subscribe(&registration.id, &registration.topic);
                if d.outbound.try_send(frame).is_err() {
                    tracing::warn!(room_id, "outbound queue full; subscription not sent");
                }
            }
        }
        drop(driver);

        tracing::info!(room_id, subscription = %registration.id, "joined chat room");
        Ok(RoomSubscription {
            room_id: room_id.to_string(),
            subscription_id: registration.id,
            receiver: registration.receiver,
        })
    }

    /// Publish a chat message. Best effort: fails with
    /// [`ClientError::NotConnected`] unless the channel is Connected.
    pub fn publish(&self, message: &ChatMessage) -> Result<()> {
        validate_room_id(&message.room_id)?;

        let state = self.state();
        if state != ChannelState::Connected {
            tracing::warn!(room_id = %message.room_id, ?state, "publish while not connected; dropped");
            return Err(ClientError::NotConnected);
        }

        let body = serde_json::to_string(message)
            .map_err(|e| ClientError::protocol(format!("encode chat message: {e}")))?;
        let frame = Frame::send(PUBLISH_DESTINATION, body);

        let driver = self.inner.driver.lock();
        let sent = driver
            .as_ref()
            .is_some_and(|d| d.outbound.try_send(frame).is_ok());
        if !sent {
            tracing::warn!(room_id = %message.room_id, "outbound queue unavailable; publish dropped");
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    /// Close the connection and drop every subscription. Safe to call at any
    /// time, including when nothing is connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let driver = self.inner.driver.lock().take();
        let Some(driver) = driver else {
            return;
        };

        self.inner.shared.set_state(ChannelState::Disconnecting);
        driver.cancel.cancel();
        if let Err(err) = driver.handle.await {
            tracing::warn!(%err, "chat driver task ended abnormally");
        }

        let dropped = self.inner.shared.registry.reset();
        self.inner.shared.set_state(ChannelState::Idle);
        tracing::info!(dropped, "chat channel disconnected");
    }

    /// Keep `room_id` joined for as long as the channel is in use, handing
    /// every message to `on_message` on a background task.
    ///
    /// A reconnect drops every subscription; this re-issues [`connect`] each
    /// time the channel is Connected again. The task ends when the channel
    /// goes Idle, or when another caller joins the same room.
    ///
    /// [`connect`]: ChannelManager::connect
    pub fn stay_joined<F>(&self, room_id: &str, mut on_message: F) -> JoinHandle<()>
    where
        F: FnMut(ChatMessage) + Send + 'static,
    {
        let manager = self.clone();
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            let mut states = manager.state_changes();
            loop {
                let mut subscription = match manager.connect(&room_id).await {
                    Ok(sub) => sub,
                    Err(err) => {
                        tracing::warn!(%err, room_id = %room_id, "could not join room");
                        return;
                    }
                };
                while let Some(message) = subscription.recv().await {
                    on_message(message);
                }

                if manager.rooms().contains(&room_id) {
                    tracing::debug!(room_id = %room_id, "room joined elsewhere; no longer following");
                    return;
                }
                let state = states
                    .wait_for(|s| matches!(s, ChannelState::Connected | ChannelState::Idle))
                    .await
                    .map(|s| *s);
                match state {
                    Ok(ChannelState::Connected) => {
                        tracing::info!(room_id = %room_id, "rejoining room after reconnect");
                    }
                    _ => return,
                }
            }
        })
    }

    fn spawn_driver(&self) -> Driver {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(connection::run(
            Arc::clone(&self.inner.shared),
            rx,
            cancel.clone(),
        ));
        Driver {
            outbound,
            cancel,
            handle,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

/// Messages for one room. Ends (`recv` returns `None`) when the room is
/// re-joined elsewhere, the channel disconnects, or the connection drops.
#[derive(Debug)]
pub struct RoomSubscription {
    room_id: String,
    subscription_id: String,
    receiver: mpsc::Receiver<ChatMessage>,
}

impl RoomSubscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn id(&self) -> &str {
        &self.subscription_id
    }

    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatMessage> {
        self.receiver.try_recv().ok()
    }

    /// Hand every message to `on_message` on a background task until the
    /// subscription ends.
    pub fn forward_to<F>(mut self, mut on_message: F) -> JoinHandle<()>
    where
        F: FnMut(ChatMessage) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(message) = self.receiver.recv().await {
                on_message(message);
            }
            tracing::debug!(room_id = %self.room_id, "room subscription ended");
        })
    }
}
