//! Publisher role
//!
//! Owns one session, the workflow simulator and the follow-up scheduler.
//! Everything runs on a single loop: session notifications, the simulation
//! tick, due payment follow-ups and the shutdown signal.

use crate::bus::{SessionEvent, SessionEvents, SessionLifecycle, Transport, TransportError};
use crate::catalog::Catalog;
use crate::config::SimulationConfig;
use crate::role::{next_tick, periodic, shutdown_requested, RoleError, RoleResult};
use crate::scheduler::FollowUpScheduler;
use crate::simulator::{PendingPayment, Publication, WorkflowSimulator};
use tokio::sync::watch;
use tokio::time::Interval;

/// Publisher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Simulation ticks run
    pub ticks: u64,
    /// Envelopes sent successfully
    pub published: u64,
    /// Envelopes the transport rejected
    pub publish_failures: u64,
    /// Payment follow-ups settled
    pub follow_ups: u64,
}

/// Drives the workflow simulator and publishes what it produces.
pub struct Publisher<S> {
    session: S,
    simulator: WorkflowSimulator,
    scheduler: FollowUpScheduler,
    config: SimulationConfig,
    stats: PublisherStats,
}

impl<S: Transport + SessionLifecycle> Publisher<S> {
    /// Create a publisher over `session`, seeding the simulator from `config`.
    ///
    /// Out-of-range settings fail here with [`RoleError::Config`].
    pub fn new(session: S, catalog: Catalog, config: SimulationConfig) -> RoleResult<Self> {
        config.validate()?;
        let simulator = WorkflowSimulator::from_config(catalog, config.clone())?;
        Self::with_simulator(session, simulator, config)
    }

    /// Create a publisher with a prepared simulator.
    pub fn with_simulator(
        session: S,
        simulator: WorkflowSimulator,
        config: SimulationConfig,
    ) -> RoleResult<Self> {
        config.validate()?;
        Ok(Self {
            session,
            simulator,
            scheduler: FollowUpScheduler::new(),
            config,
            stats: PublisherStats::default(),
        })
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Payment follow-ups not yet due.
    pub fn pending_follow_ups(&self) -> usize {
        self.scheduler.len()
    }

    /// Connect and run until shutdown, disconnect or a fatal error.
    ///
    /// On exit every outstanding follow-up is cancelled and the session is
    /// disconnected.
    pub async fn run(
        mut self,
        mut events: SessionEvents,
        mut shutdown: watch::Receiver<bool>,
    ) -> RoleResult<PublisherStats> {
        if let Err(e) = self.session.connect().await {
            tracing::error!(error = %e, "Publisher failed to connect");
            return Err(RoleError::Connection(e));
        }

        let outcome = self.event_loop(&mut events, &mut shutdown).await;
        self.close().await;

        tracing::info!(
            ticks = self.stats.ticks,
            published = self.stats.published,
            publish_failures = self.stats.publish_failures,
            follow_ups = self.stats.follow_ups,
            "Publisher stopped"
        );

        outcome.map(|()| self.stats)
    }

    async fn event_loop(
        &mut self,
        events: &mut SessionEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RoleResult<()> {
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    tracing::info!("Publisher shutting down");
                    return Ok(());
                }

                event = events.recv() => match event {
                    Some(SessionEvent::Up) => {
                        tracing::info!(
                            interval_ms = self.config.tick_interval_ms,
                            "Publisher connected, starting simulation"
                        );
                        ticker = Some(periodic(self.config.tick_interval()));
                    }
                    Some(SessionEvent::ConnectFailed(reason)) => {
                        tracing::error!(reason = %reason, "Publisher connection failed");
                        return Err(RoleError::Connection(TransportError::ConnectionError(reason)));
                    }
                    Some(SessionEvent::Disconnected) => {
                        tracing::warn!("Publisher session disconnected, stopping simulation");
                        return Ok(());
                    }
                    Some(other) => {
                        tracing::debug!(event = ?other, "Publisher ignoring session event");
                    }
                    None => return Err(RoleError::Transport(TransportError::ChannelClosed)),
                },

                _ = next_tick(&mut ticker) => self.on_tick().await?,

                Some(pending) = self.scheduler.next_due() => self.on_follow_up(pending).await?,
            }
        }
    }

    /// Run one simulation step and publish its output.
    pub async fn on_tick(&mut self) -> RoleResult<()> {
        self.stats.ticks += 1;
        let outcome = self.simulator.tick()?;
        tracing::debug!(step = ?outcome.step, "Simulation step");

        self.publish_all(&outcome.publications).await;

        if let Some(pending) = outcome.pending {
            tracing::debug!(
                correlation_id = %pending.order_id,
                delay_ms = self.config.payment_delay_ms,
                "Scheduling payment follow-up"
            );
            self.scheduler.schedule(pending, self.config.payment_delay());
        }
        Ok(())
    }

    async fn on_follow_up(&mut self, pending: PendingPayment) -> RoleResult<()> {
        self.stats.follow_ups += 1;
        let publications = self.simulator.resolve_payment(&pending)?;
        self.publish_all(&publications).await;
        Ok(())
    }

    async fn publish_all(&mut self, publications: &[Publication]) {
        for publication in publications {
            self.publish(publication).await;
        }
    }

    /// Send one publication. Failures are logged and counted, never raised.
    async fn publish(&mut self, publication: &Publication) {
        let topic = match publication.kind.topic() {
            Ok(topic) => topic,
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::warn!(kind = %publication.kind, error = %e, "Invalid publication topic");
                return;
            }
        };

        let envelope = &publication.envelope;
        match self.session.send(&topic, envelope).await {
            Ok(()) => {
                self.stats.published += 1;
                tracing::info!(
                    topic = %topic,
                    event_type = envelope.event_type(),
                    correlation_id = envelope.correlation_id().unwrap_or_default(),
                    "Published event"
                );
                tracing::debug!(
                    topic = %topic,
                    body = %serde_json::to_string(envelope).unwrap_or_default(),
                    "Published event body"
                );
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::warn!(
                    topic = %topic,
                    event_type = envelope.event_type(),
                    error = %e,
                    "Error publishing event"
                );
            }
        }
    }

    async fn close(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled pending payment follow-ups");
        }

        if self.session.is_connected().await {
            if let Err(e) = self.session.disconnect().await {
                tracing::warn!(error = %e, "Publisher disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBroker;
    use crate::config::ConnectionConfig;
    use crate::taxonomy::TopicKind;
    use crate::topic::SubscriptionPattern;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    fn config() -> SimulationConfig {
        SimulationConfig {
            tick_interval_ms: 1000,
            payment_delay_ms: 500,
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    async fn observer(broker: &MemoryBroker) -> (crate::bus::MemorySession, SessionEvents) {
        let (session, mut events) = broker.session(ConnectionConfig::default()).await;
        session.connect().await.unwrap();
        events.recv().await;
        session
            .subscribe(&SubscriptionPattern::parse("ecommerce/>").unwrap())
            .await
            .unwrap();
        events.recv().await;
        (session, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_on_each_tick() {
        let broker = MemoryBroker::new();
        let (_observer, mut inbound) = observer(&broker).await;

        let (session, events) = broker.session(ConnectionConfig::default()).await;
        let publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(publisher.run(events, shutdown_rx));

        let first = tokio::time::timeout(Duration::from_millis(1500), inbound.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(SessionEvent::Message(_))));

        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert!(stats.ticks >= 1);
        assert!(stats.published >= 1);
        assert_eq!(stats.publish_failures, 0);
        assert_eq!(broker.stats().await.connected_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let broker = MemoryBroker::new();
        let (_observer, mut inbound) = observer(&broker).await;

        let (session, events) = broker.session(ConnectionConfig::default()).await;
        let publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(publisher.run(events, shutdown_rx));

        let early = tokio::time::timeout(Duration::from_millis(999), inbound.recv()).await;
        assert!(early.is_err());

        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_published_after_delay() {
        let broker = MemoryBroker::new();
        let (_observer, mut inbound) = observer(&broker).await;

        let (session, mut events) = broker.session(ConnectionConfig::default()).await;
        session.connect().await.unwrap();
        events.recv().await;

        let mut publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();
        let mut order_id = None;
        while order_id.is_none() {
            publisher.on_tick().await.unwrap();
            while let Ok(SessionEvent::Message(message)) = inbound.try_recv() {
                if TopicKind::from_topic(&message.topic) == Some(TopicKind::OrderCreated) {
                    order_id = message.properties.correlation_id.clone();
                }
            }
        }
        assert_eq!(publisher.pending_follow_ups(), 1);

        let pending = publisher.scheduler.next_due().await.unwrap();
        assert_eq!(Some(pending.order_id.clone()), order_id);
        publisher.on_follow_up(pending).await.unwrap();

        let mut chain = Vec::new();
        while let Ok(SessionEvent::Message(message)) = inbound.try_recv() {
            assert_eq!(message.properties.correlation_id, order_id);
            chain.push(TopicKind::from_topic(&message.topic).unwrap());
        }
        assert!(
            chain == [TopicKind::PaymentAuthorized, TopicKind::OrderUpdated]
                || chain == [TopicKind::PaymentFailed, TopicKind::OrderCancelled]
        );
        assert_eq!(publisher.stats().follow_ups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_follow_ups_and_disconnects() {
        let broker = MemoryBroker::new();
        let (session, mut events) = broker.session(ConnectionConfig::default()).await;
        session.connect().await.unwrap();
        events.recv().await;

        let mut publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();
        while publisher.pending_follow_ups() == 0 {
            publisher.on_tick().await.unwrap();
        }

        publisher.close().await;
        assert_eq!(publisher.pending_follow_ups(), 0);
        assert!(!publisher.session().is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_failure_ends_role() {
        let broker = MemoryBroker::new();
        let config = ConnectionConfig {
            url: "tcp://broker:55555".to_string(),
            ..ConnectionConfig::default()
        };
        let (session, events) = broker.session(config).await;
        let publisher =
            Publisher::new(session, Catalog::seeded(), SimulationConfig::default()).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = publisher.run(events, shutdown_rx).await;
        assert!(matches!(result, Err(RoleError::Connection(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_is_counted_not_raised() {
        let broker = MemoryBroker::new();
        let (session, _events) = broker.session(ConnectionConfig::default()).await;
        let mut publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();

        publisher.on_tick().await.unwrap();
        assert_eq!(publisher.stats().published, 0);
        assert!(publisher.stats().publish_failures >= 1);
    }

    #[tokio::test]
    async fn test_new_rejects_zero_tick_interval() {
        let broker = MemoryBroker::new();
        let (session, _events) = broker.session(ConnectionConfig::default()).await;
        let config = SimulationConfig {
            tick_interval_ms: 0,
            ..config()
        };

        let result = Publisher::new(session, Catalog::seeded(), config);
        assert!(matches!(result, Err(RoleError::Config(_))));
    }

    #[tokio::test]
    async fn test_with_simulator_rejects_inverted_stock_delta() {
        let broker = MemoryBroker::new();
        let (session, _events) = broker.session(ConnectionConfig::default()).await;
        let simulator = WorkflowSimulator::from_config(Catalog::seeded(), config()).unwrap();
        let config = SimulationConfig {
            stock_delta_min: 5,
            stock_delta_max: -5,
            ..config()
        };

        let result = Publisher::with_simulator(session, simulator, config);
        assert!(matches!(result, Err(RoleError::Config(_))));
    }

    /// Log writer that keeps everything in memory.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_published_body_logged_at_debug() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let broker = MemoryBroker::new();
        let (session, mut events) = broker.session(ConnectionConfig::default()).await;
        session.connect().await.unwrap();
        events.recv().await;
        let mut publisher = Publisher::new(session, Catalog::seeded(), config()).unwrap();

        let publication = publisher.simulator.simulate_registration().unwrap();
        publisher.publish(&publication).await;
        assert_eq!(publisher.stats().published, 1);

        let body = serde_json::to_string(&publication.envelope).unwrap();
        let output = logs.contents();
        assert!(output.contains("Published event body"));
        assert!(output.contains(&body));
    }
}
