//! Commerce events demo
//!
//! Runs the workflow publisher and the subscriber as two sessions on one
//! in-memory broker until Ctrl-C, then shuts both down in order.

use commerce_events::{Catalog, DemoConfig, MemoryBroker, Publisher, Subscriber};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    // Load configuration
    let config = DemoConfig::from_env();
    config.validate()?;

    info!(
        url = %config.connection.url,
        vpn = %config.connection.message_vpn,
        tick_interval_ms = config.simulation.tick_interval_ms,
        seed = ?config.simulation.seed,
        "Starting commerce events demo"
    );

    let broker = MemoryBroker::with_max_subscriptions(config.connection.max_subscriptions);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Subscriber first so it is listening before the first tick
    let (session, events) = broker.session(config.connection.clone()).await;
    let subscriber = Subscriber::new(session, config.subscriber.clone())?;
    let subscriber = tokio::spawn(subscriber.run(events, shutdown_rx.clone()));

    let (session, events) = broker.session(config.connection.clone()).await;
    let publisher = Publisher::new(session, Catalog::seeded(), config.simulation.clone())?;
    let publisher = tokio::spawn(publisher.run(events, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    let _ = shutdown_tx.send(true);

    let (publisher, subscriber) = tokio::join!(publisher, subscriber);

    match publisher? {
        Ok(stats) => info!(
            ticks = stats.ticks,
            published = stats.published,
            publish_failures = stats.publish_failures,
            "Publisher finished"
        ),
        Err(e) => error!("Publisher failed: {}", e),
    }
    match subscriber? {
        Ok(stats) => info!(
            received = stats.received,
            parse_failures = stats.parse_failures,
            "Subscriber finished"
        ),
        Err(e) => error!("Subscriber failed: {}", e),
    }

    let stats = broker.stats().await;
    info!(
        messages_published = stats.messages_published,
        messages_delivered = stats.messages_delivered,
        "Broker closed"
    );

    Ok(())
}
