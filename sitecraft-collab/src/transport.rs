//! Publish/subscribe channel abstraction.
//!
//! The realtime provider (hosted pub/sub, the in-process [`LocalHub`], a
//! test double) sits behind these traits. It owns reconnection; the session
//! only reacts to the status transitions it reports.
//!
//! [`LocalHub`]: crate::hub::LocalHub

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Connection status transitions reported by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}

/// Inbound traffic on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection status changed
    Status(ChannelStatus),
    /// Fire-and-forget message from another subscriber
    Broadcast { event: String, payload: Value },
    /// Full membership view: presence key → tracked metas
    PresenceSync(HashMap<String, Vec<Value>>),
    /// A presence key appeared
    PresenceJoin { key: String, metas: Vec<Value> },
    /// A presence key disappeared
    PresenceLeave { key: String, metas: Vec<Value> },
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Channel closed")]
    Closed,
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Outgoing side of a subscribed channel.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Send `payload` under `event` to every other subscriber.
    async fn broadcast(&self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Publish or replace this peer's presence metadata.
    async fn track(&self, meta: Value) -> Result<(), TransportError>;

    /// Leave the channel. Calling it twice is not an error.
    async fn unsubscribe(&self) -> Result<(), TransportError>;
}

/// A live subscription: the send handle plus the inbound event stream.
pub struct Subscription {
    pub channel: Arc<dyn ChannelHandle>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Factory for channels keyed by topic.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Join `topic`, identifying this peer's presence by `presence_key`.
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, TransportError>;
}
