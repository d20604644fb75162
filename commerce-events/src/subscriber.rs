//! Subscriber role
//!
//! Owns one session, the subscription registry and the dispatcher. Session
//! notifications, the status report timer and the shutdown signal are all
//! handled on one loop.

use crate::bus::{
    Message, SessionEvent, SessionEvents, SessionLifecycle, Transport, TransportError,
};
use crate::config::{OutputFormat, SubscriberConfig};
use crate::dispatch::{render_subscriptions, DispatchStats, Dispatcher, Presentation};
use crate::registry::{RegistryError, SubscriptionRegistry};
use crate::role::{next_tick, periodic, shutdown_requested, RoleError, RoleResult};
use crate::taxonomy::ALL_ECOMMERCE;
use crate::topic::SubscriptionPattern;
use tokio::sync::{mpsc, watch};

/// Subscriptions requested as soon as the session is up.
pub const DEFAULT_SUBSCRIPTIONS: [(&str, &str); 6] = [
    ("ecommerce/orders/*", "All Order Events"),
    ("ecommerce/inventory/low-stock", "Low Stock Alerts"),
    ("ecommerce/inventory/out-of-stock", "Out of Stock Alerts"),
    ("ecommerce/payments/*", "All Payment Events"),
    ("ecommerce/customers/registered", "New Customer Registrations"),
    (ALL_ECOMMERCE, "All E-commerce Events (for logging)"),
];

/// Receives, renders and reports on e-commerce events.
pub struct Subscriber<S> {
    session: S,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    config: SubscriberConfig,
    sink: Option<mpsc::UnboundedSender<Presentation>>,
}

impl<S: Transport + SessionLifecycle> Subscriber<S> {
    /// Create a subscriber over `session`.
    ///
    /// Out-of-range settings fail here with [`RoleError::Config`].
    pub fn new(session: S, config: SubscriberConfig) -> RoleResult<Self> {
        config.validate()?;
        Ok(Self {
            session,
            registry: SubscriptionRegistry::new(),
            dispatcher: Dispatcher::new(),
            config,
            sink: None,
        })
    }

    /// Also forward every presentation to `sink`.
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<Presentation>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &DispatchStats {
        self.dispatcher.stats()
    }

    /// Connect and run until shutdown, disconnect or a fatal error.
    ///
    /// On shutdown every active subscription is removed before the session
    /// is disconnected.
    pub async fn run(
        mut self,
        mut events: SessionEvents,
        mut shutdown: watch::Receiver<bool>,
    ) -> RoleResult<DispatchStats> {
        if let Err(e) = self.session.connect().await {
            tracing::error!(error = %e, "Subscriber failed to connect");
            return Err(RoleError::Connection(e));
        }

        let outcome = self.event_loop(&mut events, &mut shutdown).await;
        self.close().await;

        let stats = self.dispatcher.stats().clone();
        tracing::info!(
            received = stats.received,
            parse_failures = stats.parse_failures,
            uncategorized = stats.uncategorized,
            "Subscriber stopped"
        );

        outcome.map(|()| stats)
    }

    async fn event_loop(
        &mut self,
        events: &mut SessionEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RoleResult<()> {
        let mut status_timer = None;

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    tracing::info!("Subscriber shutting down");
                    return Ok(());
                }

                event = events.recv() => {
                    let event = event.ok_or(RoleError::Transport(TransportError::ChannelClosed))?;
                    let disconnected = matches!(event, SessionEvent::Disconnected);
                    if matches!(event, SessionEvent::Up) {
                        status_timer = Some(periodic(self.config.status_interval()));
                    }

                    self.handle_event(event).await?;
                    if disconnected {
                        return Ok(());
                    }
                }

                _ = next_tick(&mut status_timer) => self.report_status(),
            }
        }
    }

    /// Handle one session notification.
    ///
    /// Returns the presentation when the event was an inbound message.
    pub async fn handle_event(&mut self, event: SessionEvent) -> RoleResult<Option<Presentation>> {
        match event {
            SessionEvent::Up => {
                tracing::info!("Subscriber connected");
                self.setup_default_subscriptions().await;
            }
            SessionEvent::ConnectFailed(reason) => {
                tracing::error!(reason = %reason, "Subscriber connection failed");
                return Err(RoleError::Connection(TransportError::ConnectionError(reason)));
            }
            SessionEvent::Disconnected => {
                tracing::warn!(
                    subscriptions = self.registry.len(),
                    "Subscriber session disconnected, clearing subscriptions"
                );
                self.registry.clear();
            }
            SessionEvent::SubscriptionOk(pattern) => match self.registry.confirm(&pattern) {
                Ok(entry) => tracing::info!(
                    pattern = %entry.pattern,
                    description = %entry.description,
                    "Subscribed"
                ),
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Confirmation ignored"),
            },
            SessionEvent::SubscriptionError { pattern, reason } => {
                tracing::error!(pattern = %pattern, reason = %reason, "Subscription rejected");
                if let Err(e) = self.registry.fail(&pattern) {
                    tracing::warn!(pattern = %pattern, error = %e, "Rejection ignored");
                }
            }
            SessionEvent::Message(message) => return Ok(Some(self.on_message(&message))),
        }
        Ok(None)
    }

    fn on_message(&mut self, message: &Message) -> Presentation {
        let presentation = self.dispatcher.on_inbound(message, &self.registry);
        self.emit(&presentation);
        let sink_closed = self
            .sink
            .as_ref()
            .is_some_and(|sink| sink.send(presentation.clone()).is_err());
        if sink_closed {
            tracing::debug!("Presentation sink closed");
            self.sink = None;
        }
        presentation
    }

    fn emit(&self, presentation: &Presentation) {
        match self.config.output {
            OutputFormat::Text => println!("{}", presentation),
            OutputFormat::Json => match serde_json::to_string(presentation) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to encode presentation"),
            },
        }
    }

    /// Print the subscription status report.
    pub fn report_status(&self) {
        let snapshot = self.registry.snapshot();
        match self.config.output {
            OutputFormat::Text => println!("{}", render_subscriptions(&snapshot)),
            OutputFormat::Json => {
                match serde_json::to_string(&serde_json::json!({ "subscriptions": snapshot })) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode status report"),
                }
            }
        }
    }

    /// Request every default subscription.
    pub async fn setup_default_subscriptions(&mut self) {
        for (pattern, description) in DEFAULT_SUBSCRIPTIONS {
            match SubscriptionPattern::parse(pattern) {
                Ok(pattern) => {
                    self.subscribe(pattern, description).await;
                }
                Err(e) => tracing::error!(pattern, error = %e, "Invalid default subscription"),
            }
        }
    }

    /// Register and request a subscription.
    ///
    /// Returns whether the request reached the session. Duplicates are
    /// reported and left alone; the outcome of an accepted request arrives
    /// later as a session event.
    pub async fn subscribe(&mut self, pattern: SubscriptionPattern, description: &str) -> bool {
        if let Err(e) = self.registry.register(pattern.clone(), description) {
            tracing::warn!(pattern = %pattern, error = %e, "Subscription not added");
            return false;
        }

        match self.session.subscribe(&pattern).await {
            Ok(()) => {
                tracing::debug!(pattern = %pattern, "Subscription requested");
                true
            }
            Err(e) => {
                tracing::error!(pattern = %pattern, error = %e, "Error subscribing");
                if let Err(e) = self.registry.fail(&pattern) {
                    tracing::warn!(pattern = %pattern, error = %e, "Rejection ignored");
                }
                false
            }
        }
    }

    /// Remove an active subscription.
    pub async fn unsubscribe(
        &mut self,
        pattern: &SubscriptionPattern,
    ) -> Result<(), RegistryError> {
        if let Err(e) = self.registry.unregister(pattern) {
            tracing::warn!(pattern = %pattern, error = %e, "Unsubscribe ignored");
            return Err(e);
        }

        self.release(pattern).await;
        Ok(())
    }

    /// Remove every active subscription, returning how many were removed.
    pub async fn unsubscribe_all(&mut self) -> usize {
        let removed = self.registry.unregister_all();
        for entry in &removed {
            self.release(&entry.pattern).await;
        }
        removed.len()
    }

    async fn release(&self, pattern: &SubscriptionPattern) {
        match self.session.unsubscribe(pattern).await {
            Ok(()) => tracing::info!(pattern = %pattern, "Unsubscribed"),
            Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Error unsubscribing"),
        }
    }

    async fn close(&mut self) {
        if !self.session.is_connected().await {
            return;
        }

        let removed = self.unsubscribe_all().await;
        tracing::debug!(removed, "Removed subscriptions before disconnect");

        if let Err(e) = self.session.disconnect().await {
            tracing::warn!(error = %e, "Subscriber disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBroker, MemorySession};
    use crate::config::ConnectionConfig;
    use crate::taxonomy::Category;
    use crate::topic::Topic;
    use crate::types::Envelope;
    use std::time::Duration;

    fn pattern(s: &str) -> SubscriptionPattern {
        SubscriptionPattern::parse(s).unwrap()
    }

    /// Connect the subscriber's session and drain notifications until idle.
    async fn started(broker: &MemoryBroker) -> (Subscriber<MemorySession>, SessionEvents) {
        let (session, mut events) = broker.session(ConnectionConfig::default()).await;
        session.connect().await.unwrap();
        let mut subscriber = Subscriber::new(session, SubscriberConfig::default()).unwrap();
        drain(&mut subscriber, &mut events).await;
        (subscriber, events)
    }

    async fn drain(subscriber: &mut Subscriber<MemorySession>, events: &mut SessionEvents) {
        while let Ok(event) = events.try_recv() {
            subscriber.handle_event(event).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_default_subscriptions_confirmed() {
        let broker = MemoryBroker::new();
        let (subscriber, _events) = started(&broker).await;

        let snapshot = subscriber.registry().snapshot();
        assert_eq!(snapshot.len(), DEFAULT_SUBSCRIPTIONS.len());
        assert!(snapshot.iter().all(|status| status.active));
        assert_eq!(snapshot[0].pattern, "ecommerce/orders/*");
        assert_eq!(snapshot[5].description, "All E-commerce Events (for logging)");
        assert_eq!(broker.stats().await.active_subscriptions, 6);
    }

    #[tokio::test]
    async fn test_rejected_subscription_marked_inactive() {
        let broker = MemoryBroker::with_max_subscriptions(4);
        let (subscriber, _events) = started(&broker).await;

        let snapshot = subscriber.registry().snapshot();
        let active: Vec<bool> = snapshot.iter().map(|status| status.active).collect();
        assert_eq!(active, vec![true, true, true, true, false, false]);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_reported() {
        let broker = MemoryBroker::new();
        let (mut subscriber, _events) = started(&broker).await;

        assert!(!subscriber.subscribe(pattern("ecommerce/>"), "again").await);
        assert_eq!(subscriber.registry().len(), DEFAULT_SUBSCRIPTIONS.len());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let broker = MemoryBroker::new();
        let (mut subscriber, _events) = started(&broker).await;

        subscriber.unsubscribe(&pattern("ecommerce/payments/*")).await.unwrap();
        assert_eq!(subscriber.registry().len(), 5);
        assert_eq!(broker.stats().await.active_subscriptions, 5);

        let result = subscriber.unsubscribe(&pattern("ecommerce/shipping/*")).await;
        assert!(matches!(result, Err(RegistryError::NotSubscribed(_))));
        assert_eq!(subscriber.registry().len(), 5);
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let broker = MemoryBroker::new();
        let (mut subscriber, _events) = started(&broker).await;

        assert_eq!(subscriber.unsubscribe_all().await, 6);
        assert!(subscriber.registry().is_empty());
        assert_eq!(broker.stats().await.active_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_message_rendered_with_matches() {
        let broker = MemoryBroker::new();
        let (mut subscriber, mut events) = started(&broker).await;
        let (publisher, _) = broker.session(ConnectionConfig::default()).await;
        publisher.connect().await.unwrap();

        let envelope = Envelope::new("PaymentFailed", serde_json::json!({
            "orderId": "ord-1",
            "customerId": "c101",
            "amount": 12.5,
            "paymentMethod": "credit_card",
            "failureReason": "insufficient_funds"
        }))
        .with_correlation_id("ord-1");
        publisher
            .send(&Topic::parse("ecommerce/payments/failed").unwrap(), &envelope)
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        let presentation = subscriber.handle_event(event).await.unwrap().unwrap();
        assert_eq!(presentation.category, Some(Category::Payments));
        assert_eq!(presentation.field("Amount"), Some("$12.50"));
        assert_eq!(
            presentation.matched_subscriptions,
            vec!["ecommerce/payments/*", "ecommerce/>"]
        );
        assert_eq!(subscriber.stats().received, 1);
    }

    #[tokio::test]
    async fn test_disconnect_clears_registry() {
        let broker = MemoryBroker::new();
        let (mut subscriber, mut events) = started(&broker).await;

        subscriber.session().disconnect().await.unwrap();
        drain(&mut subscriber, &mut events).await;
        assert!(subscriber.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_unsubscribes_then_disconnects_on_shutdown() {
        let broker = MemoryBroker::new();
        let (session, events) = broker.session(ConnectionConfig::default()).await;
        let (sink_tx, _sink_rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber::new(session, SubscriberConfig::default())
            .unwrap()
            .with_sink(sink_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(subscriber.run(events, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(broker.stats().await.active_subscriptions, 6);

        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.received, 0);

        let broker_stats = broker.stats().await;
        assert_eq!(broker_stats.connected_sessions, 0);
        assert_eq!(broker_stats.active_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_new_rejects_zero_status_interval() {
        let broker = MemoryBroker::new();
        let (session, _events) = broker.session(ConnectionConfig::default()).await;
        let config = SubscriberConfig {
            status_interval_secs: 0,
            ..SubscriberConfig::default()
        };

        let result = Subscriber::new(session, config);
        assert!(matches!(result, Err(RoleError::Config(_))));
    }

    #[tokio::test]
    async fn test_subscribe_on_closed_session_marks_entry_inactive() {
        let broker = MemoryBroker::new();
        let (session, _events) = broker.session(ConnectionConfig::default()).await;
        let mut subscriber = Subscriber::new(session, SubscriberConfig::default()).unwrap();

        let requested = subscriber.subscribe(pattern("ecommerce/orders/*"), "Order Events").await;
        assert!(!requested);

        let snapshot = subscriber.registry().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].pattern, "ecommerce/orders/*");
        assert!(!snapshot[0].active);
    }
}
