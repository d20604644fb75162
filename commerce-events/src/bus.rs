//! Transport and session collaborators
//!
//! This module provides the seams the publisher and subscriber roles talk
//! through, plus an in-memory broker implementing them for single-process
//! runs and testing.
//!
//! Session notifications (connection up or failed, subscription confirmed or
//! rejected, inbound messages) arrive as [`SessionEvent`]s on the channel
//! returned alongside each session, so the owning role handles all of them
//! from one loop.

use crate::config::ConnectionConfig;
use crate::topic::{SubscriptionPattern, Topic};
use crate::types::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Content type attached to every JSON message.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// URL scheme accepted by [`MemoryBroker`] sessions.
pub const MEMORY_SCHEME: &str = "memory://";

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires a connected session
    #[error("Not connected to the message broker")]
    NotConnected,

    /// Connect called on a connected session
    #[error("Already connected to the message broker")]
    AlreadyConnected,

    /// Failed to publish message
    #[error("Failed to publish message: {0}")]
    PublishError(String),

    /// Failed to subscribe or unsubscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Out-of-band metadata attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProperties {
    /// Body content type
    pub content_type: String,
    /// Mirrors the envelope's correlation ID when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Send time
    pub timestamp: DateTime<Utc>,
}

/// A message as it travels through the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Destination topic
    pub topic: Topic,
    /// Encoded body
    pub body: String,
    /// Out-of-band metadata
    pub properties: MessageProperties,
}

impl Message {
    /// Encode an envelope as a JSON message.
    pub fn from_envelope(topic: Topic, envelope: &Envelope) -> TransportResult<Self> {
        let body = serde_json::to_string(envelope)
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;

        Ok(Self {
            topic,
            body,
            properties: MessageProperties {
                content_type: CONTENT_TYPE_JSON.to_string(),
                correlation_id: envelope.correlation_id().map(str::to_string),
                timestamp: Utc::now(),
            },
        })
    }

    /// Wrap an arbitrary body.
    pub fn raw(topic: Topic, body: impl Into<String>) -> Self {
        Self {
            topic,
            body: body.into(),
            properties: MessageProperties {
                content_type: CONTENT_TYPE_JSON.to_string(),
                correlation_id: None,
                timestamp: Utc::now(),
            },
        }
    }
}

/// Notifications delivered to a session's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection established
    Up,
    /// Connection attempt failed
    ConnectFailed(String),
    /// Session closed
    Disconnected,
    /// Subscription accepted by the broker
    SubscriptionOk(SubscriptionPattern),
    /// Subscription rejected by the broker
    SubscriptionError {
        pattern: SubscriptionPattern,
        reason: String,
    },
    /// Inbound message on a subscribed topic
    Message(Message),
}

/// Receiving side of a session's notifications.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Message transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an envelope on a topic. Fire-and-forget.
    async fn send(&self, topic: &Topic, envelope: &Envelope) -> TransportResult<()>;

    /// Request a subscription.
    ///
    /// The outcome arrives later as `SubscriptionOk` or `SubscriptionError`.
    async fn subscribe(&self, pattern: &SubscriptionPattern) -> TransportResult<()>;

    /// Remove a subscription.
    async fn unsubscribe(&self, pattern: &SubscriptionPattern) -> TransportResult<()>;
}

/// Session connection lifecycle.
#[async_trait]
pub trait SessionLifecycle: Send + Sync {
    /// Connect. Success is also announced with `SessionEvent::Up`.
    async fn connect(&self) -> TransportResult<()>;

    /// Disconnect, dropping all subscriptions.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Whether the session is currently connected.
    async fn is_connected(&self) -> bool;
}

/// Broker statistics.
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    /// Total messages published
    pub messages_published: u64,
    /// Total messages delivered to sessions
    pub messages_delivered: u64,
    /// Sessions currently connected
    pub connected_sessions: usize,
    /// Subscriptions held by connected sessions
    pub active_subscriptions: usize,
}

struct SessionState {
    connected: bool,
    patterns: Vec<SubscriptionPattern>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionState {
    fn notify(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn wants(&self, topic: &Topic) -> bool {
        self.connected && self.patterns.iter().any(|pattern| pattern.matches(topic))
    }
}

/// In-memory message broker.
///
/// Delivers each published message once to every connected session holding
/// at least one matching subscription. Cloning yields another handle to the
/// same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    /// Session states by session ID
    sessions: Arc<RwLock<HashMap<Uuid, SessionState>>>,
    /// Statistics
    stats: Arc<RwLock<BrokerStats>>,
    /// Per-session subscription limit
    max_subscriptions: usize,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("max_subscriptions", &self.max_subscriptions)
            .finish()
    }
}

impl MemoryBroker {
    /// Create a new in-memory broker.
    pub fn new() -> Self {
        Self::with_max_subscriptions(100)
    }

    /// Create with a custom per-session subscription limit.
    pub fn with_max_subscriptions(max_subscriptions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(BrokerStats::default())),
            max_subscriptions,
        }
    }

    /// Open a new, disconnected session.
    pub async fn session(&self, config: ConnectionConfig) -> (MemorySession, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::now_v7();

        self.sessions.write().await.insert(
            id,
            SessionState {
                connected: false,
                patterns: Vec::new(),
                events: tx,
            },
        );

        let session = MemorySession {
            id,
            config,
            broker: self.clone(),
        };
        (session, rx)
    }

    /// Get broker stats.
    pub async fn stats(&self) -> BrokerStats {
        let mut stats = self.stats.read().await.clone();
        let sessions = self.sessions.read().await;
        stats.connected_sessions = sessions.values().filter(|s| s.connected).count();
        stats.active_subscriptions = sessions
            .values()
            .filter(|s| s.connected)
            .map(|s| s.patterns.len())
            .sum();
        stats
    }

    async fn deliver(&self, message: Message) -> usize {
        let sessions = self.sessions.read().await;
        let delivered = sessions
            .values()
            .filter(|state| state.wants(&message.topic))
            .filter(|state| state.notify(SessionEvent::Message(message.clone())))
            .count();

        let mut stats = self.stats.write().await;
        stats.messages_published += 1;
        stats.messages_delivered += delivered as u64;
        delivered
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A client session on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemorySession {
    id: Uuid,
    config: ConnectionConfig,
    broker: MemoryBroker,
}

impl MemorySession {
    /// Session ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn with_connected<T>(
        &self,
        f: impl FnOnce(&mut SessionState, usize) -> TransportResult<T> + Send,
    ) -> TransportResult<T> {
        let mut sessions = self.broker.sessions.write().await;
        let state = sessions
            .get_mut(&self.id)
            .ok_or(TransportError::ChannelClosed)?;
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        f(state, self.broker.max_subscriptions)
    }
}

#[async_trait]
impl Transport for MemorySession {
    async fn send(&self, topic: &Topic, envelope: &Envelope) -> TransportResult<()> {
        if !self.is_connected().await {
            return Err(TransportError::NotConnected);
        }

        let message = Message::from_envelope(topic.clone(), envelope)?;
        let delivered = self.broker.deliver(message).await;

        tracing::debug!(
            topic = %topic,
            event_type = envelope.event_type(),
            delivered,
            "Message published"
        );

        Ok(())
    }

    async fn subscribe(&self, pattern: &SubscriptionPattern) -> TransportResult<()> {
        self.with_connected(|state, limit| {
            if state.patterns.contains(pattern) {
                state.notify(SessionEvent::SubscriptionOk(pattern.clone()));
            } else if state.patterns.len() >= limit {
                state.notify(SessionEvent::SubscriptionError {
                    pattern: pattern.clone(),
                    reason: format!("subscription limit of {limit} reached"),
                });
            } else {
                state.patterns.push(pattern.clone());
                state.notify(SessionEvent::SubscriptionOk(pattern.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn unsubscribe(&self, pattern: &SubscriptionPattern) -> TransportResult<()> {
        self.with_connected(|state, _| {
            let before = state.patterns.len();
            state.patterns.retain(|p| p != pattern);
            if state.patterns.len() == before {
                return Err(TransportError::SubscribeError(format!(
                    "no subscription for \"{pattern}\""
                )));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SessionLifecycle for MemorySession {
    async fn connect(&self) -> TransportResult<()> {
        let mut sessions = self.broker.sessions.write().await;
        let state = sessions
            .get_mut(&self.id)
            .ok_or(TransportError::ChannelClosed)?;

        if state.connected {
            return Err(TransportError::AlreadyConnected);
        }

        if !self.config.url.starts_with(MEMORY_SCHEME) {
            let reason = format!("unsupported broker URL \"{}\"", self.config.url);
            state.notify(SessionEvent::ConnectFailed(reason.clone()));
            return Err(TransportError::ConnectionError(reason));
        }

        state.connected = true;
        state.notify(SessionEvent::Up);

        tracing::debug!(
            session_id = %self.id,
            url = %self.config.url,
            vpn = %self.config.message_vpn,
            username = %self.config.username,
            "Session connected"
        );

        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.with_connected(|state, _| {
            state.connected = false;
            state.patterns.clear();
            state.notify(SessionEvent::Disconnected);
            Ok(())
        })
        .await
    }

    async fn is_connected(&self) -> bool {
        self.broker
            .sessions
            .read()
            .await
            .get(&self.id)
            .is_some_and(|state| state.connected)
    }
}

// ============================================================================
// Tests
// ============================================================================
