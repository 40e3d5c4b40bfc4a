//! Room subscriptions layered over the single broker connection.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use wayfarer_common::id::{prefix, prefixed_ulid};

use super::message::{room_topic, ChatMessage};

/// Messages buffered per subscription before new ones are dropped.
pub const SUBSCRIPTION_QUEUE: usize = 256;

struct Entry {
    id: String,
    room_id: String,
    sender: mpsc::Sender<ChatMessage>,
}

#[derive(Default)]
struct Inner {
    by_topic: HashMap<String, Entry>,
    topic_by_id: HashMap<String, String>,
    /// True between a CONNECTED frame and the next disruption or disconnect.
    live: bool,
}

/// Result of registering a room.
pub struct Registration {
    pub id: String,
    pub topic: String,
    pub receiver: mpsc::Receiver<ChatMessage>,
    /// The broker session is live and this topic was not subscribed yet, so
    /// the caller must send SUBSCRIBE itself.
    pub subscribe_now: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NoSubscriber,
    QueueFull,
    /// The receiving side is gone.
    Closed { id: String },
}

/// Topic → delivery queue map.
///
/// Every mutation and every delivery runs under one lock, so a message is
/// routed with either the old or the new map, never a torn one. Dropping an
/// entry drops its sender, which ends the matching receiver: a removed
/// subscription can never be delivered to.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a room, or replace the queue of one already registered. A
    /// replacement keeps the broker-side subscription id.
    pub fn register(&self, room_id: &str) -> Registration {
        let topic = room_topic(room_id);
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_QUEUE);

        let mut inner = self.inner.write();
        let live = inner.live;
        match inner.by_topic.get_mut(&topic) {
            Some(entry) => {
                // Old receiver ends once its sender is dropped here.
                entry.sender = sender;
                Registration {
                    id: entry.id.clone(),
                    topic,
                    receiver,
                    subscribe_now: false,
                }
            }
            None => {
                let id = prefixed_ulid(prefix::SUBSCRIPTION);
                inner.topic_by_id.insert(id.clone(), topic.clone());
                inner.by_topic.insert(
                    topic.clone(),
                    Entry {
                        id: id.clone(),
                        room_id: room_id.to_string(),
                        sender,
                    },
                );
                Registration {
                    id,
                    topic,
                    receiver,
                    subscribe_now: live,
                }
            }
        }
    }

    /// Mark the broker session live and return every (id, topic) that needs a
    /// SUBSCRIBE on it.
    pub fn go_live(&self) -> Vec<(String, String)> {
        let mut inner = self.inner.write();
        inner.live = true;
        inner
            .by_topic
            .iter()
            .map(|(topic, entry)| (entry.id.clone(), topic.clone()))
            .collect()
    }

    /// Drop every subscription. Returns how many were removed.
    pub fn reset(&self) -> usize {
        let mut inner = self.inner.write();
        inner.live = false;
        inner.topic_by_id.clear();
        let removed = inner.by_topic.len();
        inner.by_topic.clear();
        removed
    }

    /// Route a message by subscription id, falling back to its destination.
    pub fn deliver(
        &self,
        subscription_id: Option<&str>,
        destination: Option<&str>,
        message: ChatMessage,
    ) -> Delivery {
        let inner = self.inner.read();
        let topic = subscription_id
            .and_then(|id| inner.topic_by_id.get(id))
            .map(String::as_str)
            .or(destination);
        let Some(entry) = topic.and_then(|t| inner.by_topic.get(t)) else {
            return Delivery::NoSubscriber;
        };

        match entry.sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::QueueFull,
            Err(TrySendError::Closed(_)) => Delivery::Closed {
                id: entry.id.clone(),
            },
        }
    }

    /// Remove a subscription whose receiver was dropped. Returns `false` if the
    /// room was re-registered in the meantime.
    pub fn remove_if_closed(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(topic) = inner.topic_by_id.get(id).cloned() else {
            return false;
        };
        let closed = inner
            .by_topic
            .get(&topic)
            .is_some_and(|e| e.sender.is_closed());
        if closed {
            inner.by_topic.remove(&topic);
            inner.topic_by_id.remove(id);
        }
        closed
    }

    pub fn rooms(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut rooms: Vec<String> = inner.by_topic.values().map(|e| e.room_id.clone()).collect();
        rooms.sort();
        rooms
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
