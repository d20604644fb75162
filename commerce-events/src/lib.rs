//! # Commerce Events
//!
//! This crate provides a topic-routed publish/subscribe demonstration for an
//! e-commerce domain: a workflow simulator publishing order, inventory,
//! payment and customer events, and a subscriber that routes, renders and
//! reports on them.
//!
//! ## Overview
//!
//! The commerce-events crate handles:
//! - **Topics**: Validated `/`-separated topics and wildcard subscription patterns
//! - **Taxonomy**: The closed set of categories and leaf topics
//! - **Event Types**: Envelopes and strongly-typed payloads
//! - **Subscription Registry**: Patterns, descriptions and confirmation state
//! - **Simulation**: Causally consistent event streams with correlated follow-ups
//! - **Dispatch**: Category and leaf-topic specific rendering
//! - **Transport**: Session and transport seams with an in-memory broker
//! - **Roles**: Publisher and subscriber event loops
//!
//! ## Topic Patterns
//!
//! Topics are structured as `ecommerce/{category}/{event}`:
//! - `ecommerce/orders/created` - Specific event
//! - `ecommerce/orders/*` - Every event exactly one level under orders
//! - `ecommerce/>` - Every event under `ecommerce`, at any depth
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `>` matches zero or more trailing segments and must come last
//!
//! ## Usage
//!
//! ```rust,no_run
//! use commerce_events::{
//!     Catalog, ConnectionConfig, MemoryBroker, Publisher, RoleResult, SimulationConfig,
//!     Subscriber, SubscriberConfig,
//! };
//! use tokio::sync::watch;
//!
//! async fn run_demo() -> RoleResult<()> {
//!     let broker = MemoryBroker::new();
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let (session, events) = broker.session(ConnectionConfig::default()).await;
//!     let subscriber = Subscriber::new(session, SubscriberConfig::default())?;
//!     let subscriber = tokio::spawn(subscriber.run(events, shutdown_rx.clone()));
//!
//!     let (session, events) = broker.session(ConnectionConfig::default()).await;
//!     let publisher = Publisher::new(session, Catalog::seeded(), SimulationConfig::default())?;
//!     let publisher = tokio::spawn(publisher.run(events, shutdown_rx));
//!
//!     shutdown_tx.send(true).unwrap();
//!     let _ = tokio::join!(publisher, subscriber);
//!     Ok(())
//! }
//! ```
//!
//! ## Correlated Workflows
//!
//! Every order starts a chain sharing the order ID as correlation ID:
//!
//! 1. **Authorized** - `OrderCreated`, then `PaymentAuthorized` and `OrderUpdated`
//!    (created → paid)
//! 2. **Declined** - `OrderCreated`, then `PaymentFailed` and `OrderCancelled`

pub mod bus;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod publisher;
pub mod registry;
pub mod role;
pub mod scheduler;
pub mod simulator;
pub mod subscriber;
pub mod taxonomy;
pub mod topic;
pub mod types;

// Re-export main types
pub use bus::{
    BrokerStats, MemoryBroker, MemorySession, Message, MessageProperties, SessionEvent,
    SessionEvents, SessionLifecycle, Transport, TransportError, TransportResult,
};
pub use catalog::{Catalog, Customer, Product};
pub use config::{
    ConfigError, ConnectionConfig, DemoConfig, OutputFormat, SimulationConfig, SubscriberConfig,
};
pub use dispatch::{render_subscriptions, DispatchStats, Dispatcher, Field, Presentation};
pub use publisher::{Publisher, PublisherStats};
pub use registry::{
    RegistryError, RegistryResult, SubscriptionEntry, SubscriptionRegistry, SubscriptionStatus,
};
pub use role::{RoleError, RoleResult};
pub use scheduler::FollowUpScheduler;
pub use simulator::{
    PendingPayment, PlacedOrder, Publication, SimulationError, SimulationResult, SimulationStep,
    TickOutcome, WorkflowSimulator,
};
pub use subscriber::{Subscriber, DEFAULT_SUBSCRIPTIONS};
pub use taxonomy::{Category, TopicKind};
pub use topic::{matches, PatternSegment, SubscriptionPattern, Topic, TopicError, TopicResult};
pub use types::{
    CommerceEvent, CustomerRegistered, Envelope, InventoryUpdated, LowStock, OrderCancelled,
    OrderCreated, OrderItem, OrderStatus, OrderUpdated, OutOfStock, PaymentAuthorized,
    PaymentFailed,
};
