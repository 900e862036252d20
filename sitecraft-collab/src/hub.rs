//! In-process pub/sub fabric with presence tracking.
//!
//! One room per topic. Every subscriber gets its own tokio broadcast
//! receiver, so a send is O(1) regardless of room size; a forwarder task
//! per subscriber filters out its own broadcasts and feeds its event queue.
//!
//! ```text
//! HubChannel::broadcast ──► Room.sender ──┬──► forwarder(A) ──► mpsc ──► session A
//!                                         ├──► forwarder(B) ──► mpsc ──► session B
//!                                         └──► forwarder(C) ──► mpsc ──► session C
//! ```
//!
//! Presence follows the hosted provider's model: `track` stores one meta
//! per connection, and every membership change is followed by a full
//! `PresenceSync` snapshot keyed by presence key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CollabConfig;
use crate::transport::{
    ChannelEvent, ChannelHandle, ChannelStatus, RealtimeTransport, Subscription, TransportError,
};

/// Statistics for monitoring hub health.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_rooms: usize,
}

/// Lock-free counters shared by all rooms.
#[derive(Default)]
struct AtomicHubStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// A message in flight inside a room.
#[derive(Debug)]
struct HubMessage {
    origin: Uuid,
    /// Presence traffic goes back to its origin; broadcasts do not.
    echo_to_origin: bool,
    event: ChannelEvent,
}

struct Member {
    presence_key: String,
    meta: Option<Value>,
}

/// All subscribers of one topic.
struct Room {
    sender: broadcast::Sender<Arc<HubMessage>>,
    members: RwLock<HashMap<Uuid, Member>>,
    stats: Arc<AtomicHubStats>,
}

impl Room {
    fn new(capacity: usize, stats: Arc<AtomicHubStats>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: RwLock::new(HashMap::new()),
            stats,
        }
    }

    fn publish(&self, origin: Uuid, echo_to_origin: bool, event: ChannelEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(Arc::new(HubMessage { origin, echo_to_origin, event }));
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn presence_state(members: &HashMap<Uuid, Member>) -> HashMap<String, Vec<Value>> {
        let mut state: HashMap<String, Vec<Value>> = HashMap::new();
        for member in members.values() {
            if let Some(meta) = &member.meta {
                state
                    .entry(member.presence_key.clone())
                    .or_default()
                    .push(meta.clone());
            }
        }
        state
    }

    /// Register a connection; returns its receiver and the current snapshot.
    async fn join(
        &self,
        conn_id: Uuid,
        presence_key: &str,
    ) -> (broadcast::Receiver<Arc<HubMessage>>, HashMap<String, Vec<Value>>) {
        let mut members = self.members.write().await;
        members.insert(
            conn_id,
            Member {
                presence_key: presence_key.to_string(),
                meta: None,
            },
        );
        (self.sender.subscribe(), Self::presence_state(&members))
    }

    async fn track(&self, conn_id: Uuid, meta: Value) -> Result<(), TransportError> {
        let mut members = self.members.write().await;
        let member = members.get_mut(&conn_id).ok_or(TransportError::Closed)?;
        let first_track = member.meta.is_none();
        member.meta = Some(meta.clone());
        let key = member.presence_key.clone();

        if first_track {
            self.publish(conn_id, true, ChannelEvent::PresenceJoin { key, metas: vec![meta] });
        }
        self.publish(conn_id, true, ChannelEvent::PresenceSync(Self::presence_state(&members)));
        Ok(())
    }

    /// Remove a connection. Returns `true` when the room is now empty.
    async fn leave(&self, conn_id: Uuid) -> bool {
        let mut members = self.members.write().await;
        if let Some(member) = members.remove(&conn_id) {
            if let Some(meta) = member.meta {
                self.publish(
                    conn_id,
                    false,
                    ChannelEvent::PresenceLeave {
                        key: member.presence_key,
                        metas: vec![meta],
                    },
                );
                self.publish(conn_id, false, ChannelEvent::PresenceSync(Self::presence_state(&members)));
            }
        }
        members.is_empty()
    }

    async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

/// In-process realtime transport.
#[derive(Clone)]
pub struct LocalHub {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
    /// Messages buffered per subscriber before it starts lagging
    capacity: usize,
    /// Capacity of each subscriber's event queue
    event_buffer: usize,
    stats: Arc<AtomicHubStats>,
}

impl LocalHub {
    pub fn new(capacity: usize, event_buffer: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            event_buffer: event_buffer.max(1),
            stats: Arc::new(AtomicHubStats::default()),
        }
    }

    pub fn from_config(config: &CollabConfig) -> Self {
        Self::new(config.hub_capacity, config.event_buffer)
    }

    /// Drop the room for `topic` if nobody is left in it.
    async fn remove_if_empty(&self, topic: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(topic) {
            if room.is_empty().await {
                rooms.remove(topic);
                log::debug!("Room {topic} closed");
                return true;
            }
        }
        false
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of connections subscribed to `topic`.
    pub async fn member_count(&self, topic: &str) -> usize {
        let room = self.rooms.read().await.get(topic).cloned();
        match room {
            Some(room) => room.members.read().await.len(),
            None => 0,
        }
    }

    /// Tracked presence for `topic`, keyed by presence key.
    pub async fn presence_state(&self, topic: &str) -> HashMap<String, Vec<Value>> {
        let room = self.rooms.read().await.get(topic).cloned();
        match room {
            Some(room) => Room::presence_state(&*room.members.read().await),
            None => HashMap::new(),
        }
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_rooms: self.room_count().await,
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::from_config(&CollabConfig::default())
    }
}

#[async_trait]
impl RealtimeTransport for LocalHub {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, TransportError> {
        let conn_id = Uuid::new_v4();

        // Join under the rooms lock so an empty-room sweep cannot orphan us.
        let (room, rx, sync) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Room::new(self.capacity, self.stats.clone())))
                .clone();
            let (rx, sync) = room.join(conn_id, presence_key).await;
            (room, rx, sync)
        };

        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let preamble = vec![
            ChannelEvent::Status(ChannelStatus::Subscribed),
            ChannelEvent::PresenceSync(sync),
        ];
        let forwarder = tokio::spawn(forward(conn_id, rx, events_tx.clone(), preamble, self.stats.clone()));

        log::debug!("Connection {conn_id} joined {topic} as {presence_key}");

        let channel = HubChannel {
            conn_id,
            topic: topic.to_string(),
            room,
            hub: self.clone(),
            closed: AtomicBool::new(false),
            forwarder,
            events: events_tx,
        };
        Ok(Subscription {
            channel: Arc::new(channel),
            events: events_rx,
        })
    }
}

/// Pump room traffic into one subscriber's event queue.
async fn forward(
    conn_id: Uuid,
    mut rx: broadcast::Receiver<Arc<HubMessage>>,
    tx: mpsc::Sender<ChannelEvent>,
    preamble: Vec<ChannelEvent>,
    stats: Arc<AtomicHubStats>,
) {
    for event in preamble {
        if tx.send(event).await.is_err() {
            return;
        }
    }
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if msg.origin == conn_id && !msg.echo_to_origin {
                    continue;
                }
                if tx.send(msg.event.clone()).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Connection {conn_id} lagged, {skipped} messages dropped");
                stats.messages_dropped.fetch_add(skipped, Ordering::Relaxed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// One connection's handle into a room.
struct HubChannel {
    conn_id: Uuid,
    topic: String,
    room: Arc<Room>,
    hub: LocalHub,
    closed: AtomicBool,
    forwarder: JoinHandle<()>,
    events: mpsc::Sender<ChannelEvent>,
}

#[async_trait]
impl ChannelHandle for HubChannel {
    async fn broadcast(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.room.publish(
            self.conn_id,
            false,
            ChannelEvent::Broadcast {
                event: event.to_string(),
                payload,
            },
        );
        Ok(())
    }

    async fn track(&self, meta: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.room.track(self.conn_id, meta).await
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.forwarder.abort();
        let _ = self.events.try_send(ChannelEvent::Status(ChannelStatus::Closed));

        if self.room.leave(self.conn_id).await {
            self.hub.remove_if_empty(&self.topic).await;
        }
        log::debug!("Connection {} left {}", self.conn_id, self.topic);
        Ok(())
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.forwarder.abort();
        // Dropped without unsubscribe: finish the leave on the runtime if there is one.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let room = self.room.clone();
            let hub = self.hub.clone();
            let topic = std::mem::take(&mut self.topic);
            let conn_id = self.conn_id;
            runtime.spawn(async move {
                if room.leave(conn_id).await {
                    hub.remove_if_empty(&topic).await;
                }
            });
        }
    }
}
