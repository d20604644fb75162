//! Workflow simulator
//!
//! Produces a plausible stream of e-commerce events without external input:
//! customer registrations, inventory changes, and orders whose payment
//! outcome is settled later under the order's correlation ID.
//!
//! The simulator never talks to a transport. Each operation returns the
//! [`Publication`]s to send, and orders additionally return a
//! [`PendingPayment`] for the caller to schedule.

use crate::catalog::Catalog;
use crate::config::{ConfigError, SimulationConfig};
use crate::taxonomy::TopicKind;
use crate::types::{
    CommerceEvent, CustomerRegistered, Envelope, InventoryUpdated, LowStock, OrderCancelled,
    OrderCreated, OrderItem, OrderStatus, OrderUpdated, OutOfStock, PaymentAuthorized,
    PaymentFailed,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use uuid::Uuid;

/// Payment method recorded on every simulated payment.
pub const PAYMENT_METHOD: &str = "credit_card";

/// Simulation error types.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Reference data collection is empty
    #[error("Catalog has no {0}")]
    EmptyCatalog(&'static str),

    /// Product ID not in the catalog
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    /// Customer ID not in the catalog
    #[error("Unknown customer: {0}")]
    UnknownCustomer(String),

    /// Order has no lines
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Simulation settings are out of range
    #[error("Invalid simulation config: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for simulation operations.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// An envelope ready to send, with the leaf topic it belongs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub kind: TopicKind,
    pub envelope: Envelope,
}

impl Publication {
    fn new(event: CommerceEvent, correlation_id: Option<&str>) -> SimulationResult<Self> {
        let mut envelope = event.to_envelope()?;
        if let Some(id) = correlation_id {
            envelope = envelope.with_correlation_id(id);
        }
        Ok(Self {
            kind: event.topic_kind(),
            envelope,
        })
    }
}

/// Payment outcome waiting to be settled for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    /// Order ID, also the correlation ID of every event in the chain
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
}

/// Result of placing an order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    /// The `OrderCreated` publication
    pub publication: Publication,
    /// Follow-up to schedule
    pub pending: PendingPayment,
}

/// The three primary workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStep {
    Registration,
    InventoryChange,
    Order,
}

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub step: SimulationStep,
    pub publications: Vec<Publication>,
    pub pending: Option<PendingPayment>,
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Generates causally consistent e-commerce events.
pub struct WorkflowSimulator<R = StdRng> {
    catalog: Catalog,
    config: SimulationConfig,
    rng: R,
    last_order_millis: i64,
}

impl WorkflowSimulator<StdRng> {
    /// Create a simulator seeded from `config.seed`, or from entropy when unset.
    pub fn from_config(catalog: Catalog, config: SimulationConfig) -> SimulationResult<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(catalog, config, rng)
    }
}

impl<R: Rng> WorkflowSimulator<R> {
    /// Create a simulator with an explicit random source.
    ///
    /// Fails when `config` does not pass [`SimulationConfig::validate`].
    pub fn new(catalog: Catalog, config: SimulationConfig, rng: R) -> SimulationResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            config,
            rng,
            last_order_millis: 0,
        })
    }

    /// Current reference data.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run one uniformly chosen workflow.
    pub fn tick(&mut self) -> SimulationResult<TickOutcome> {
        let step = match self.rng.gen_range(0..3) {
            0 => SimulationStep::Registration,
            1 => SimulationStep::InventoryChange,
            _ => SimulationStep::Order,
        };
        self.run_step(step)
    }

    /// Run a specific workflow.
    pub fn run_step(&mut self, step: SimulationStep) -> SimulationResult<TickOutcome> {
        let (publications, pending) = match step {
            SimulationStep::Registration => (vec![self.simulate_registration()?], None),
            SimulationStep::InventoryChange => (self.simulate_inventory_change()?, None),
            SimulationStep::Order => {
                let placed = self.simulate_order()?;
                (vec![placed.publication], Some(placed.pending))
            }
        };
        Ok(TickOutcome {
            step,
            publications,
            pending,
        })
    }

    // ------------------------------------------------------------------------
    // Customers
    // ------------------------------------------------------------------------

    /// Register a new customer with an ID not present in the catalog.
    pub fn simulate_registration(&mut self) -> SimulationResult<Publication> {
        let customer_id = self.fresh_customer_id();
        let event = CommerceEvent::CustomerRegistered(CustomerRegistered {
            name: format!("New Customer {customer_id}"),
            email: format!("customer{customer_id}@example.com"),
            customer_id,
            registration_date: Utc::now(),
        });
        Publication::new(event, None)
    }

    /// Draw `c200..=c999`, stepping upward past IDs the catalog already holds.
    fn fresh_customer_id(&mut self) -> String {
        let mut number: u32 = self.rng.gen_range(200..=999);
        loop {
            let candidate = format!("c{number}");
            if self.catalog.customer(&candidate).is_none() {
                return candidate;
            }
            number += 1;
        }
    }

    // ------------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------------

    /// Apply a random delta to a random product.
    pub fn simulate_inventory_change(&mut self) -> SimulationResult<Vec<Publication>> {
        let products = self.catalog.products();
        let product_id = products[self.rng.gen_range(0..products.len())].id.clone();
        let delta = self
            .rng
            .gen_range(self.config.stock_delta_min..=self.config.stock_delta_max);
        self.apply_inventory_change(&product_id, delta)
    }

    /// Apply `delta` to a product's stock, clamping at zero.
    ///
    /// Emits `InventoryUpdated`, then `LowStock` when the new level is in
    /// `(0, threshold]` or `OutOfStock` when it is zero. The new level becomes
    /// the product's stock.
    pub fn apply_inventory_change(
        &mut self,
        product_id: &str,
        delta: i32,
    ) -> SimulationResult<Vec<Publication>> {
        let threshold = self.config.low_stock_threshold;
        let product = self
            .catalog
            .product_mut(product_id)
            .ok_or_else(|| SimulationError::UnknownProduct(product_id.to_string()))?;

        let previous = product.stock;
        let raw = i64::from(previous) + i64::from(delta);
        let current = u32::try_from(raw.max(0)).unwrap_or(u32::MAX);
        product.stock = current;

        let product_id = product.id.clone();
        let product_name = product.name.clone();

        tracing::debug!(
            product_id = %product_id,
            previous,
            current,
            delta,
            "Inventory level changed"
        );

        let mut publications = vec![Publication::new(
            CommerceEvent::InventoryUpdated(InventoryUpdated {
                product_id: product_id.clone(),
                product_name: product_name.clone(),
                previous_stock: previous,
                current_stock: current,
                change: delta,
            }),
            None,
        )?];

        if current == 0 {
            publications.push(Publication::new(
                CommerceEvent::OutOfStock(OutOfStock {
                    product_id,
                    product_name,
                    last_sold: Utc::now(),
                }),
                None,
            )?);
        } else if current <= threshold {
            publications.push(Publication::new(
                CommerceEvent::LowStock(LowStock {
                    product_id,
                    product_name,
                    current_stock: current,
                    threshold,
                }),
                None,
            )?);
        }

        Ok(publications)
    }

    // ------------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------------

    /// Place an order of one to three random lines for a random customer.
    pub fn simulate_order(&mut self) -> SimulationResult<PlacedOrder> {
        let customers = self.catalog.customers();
        let customer_id = customers[self.rng.gen_range(0..customers.len())].id.clone();

        let line_count = self.rng.gen_range(1..=3);
        let products = self.catalog.products();
        let lines: Vec<(String, u32)> = (0..line_count)
            .map(|_| {
                let product = &products[self.rng.gen_range(0..products.len())];
                (product.id.clone(), self.rng.gen_range(1..=3))
            })
            .collect();

        let lines: Vec<(&str, u32)> = lines.iter().map(|(id, qty)| (id.as_str(), *qty)).collect();
        self.place_order(&customer_id, &lines)
    }

    /// Place an order for `customer_id` with `(product_id, quantity)` lines.
    ///
    /// The order ID doubles as the correlation ID of the `OrderCreated`
    /// envelope and of every follow-up event.
    pub fn place_order(
        &mut self,
        customer_id: &str,
        lines: &[(&str, u32)],
    ) -> SimulationResult<PlacedOrder> {
        if lines.is_empty() {
            return Err(SimulationError::EmptyOrder);
        }

        let customer = self
            .catalog
            .customer(customer_id)
            .ok_or_else(|| SimulationError::UnknownCustomer(customer_id.to_string()))?
            .clone();

        let items = lines
            .iter()
            .map(|(product_id, quantity)| {
                let product = self
                    .catalog
                    .product(product_id)
                    .ok_or_else(|| SimulationError::UnknownProduct(product_id.to_string()))?;
                Ok(OrderItem {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    quantity: *quantity,
                    unit_price: product.price,
                    subtotal: round_cents(product.price * f64::from(*quantity)),
                })
            })
            .collect::<SimulationResult<Vec<_>>>()?;

        let total_amount = round_cents(items.iter().map(|item| item.subtotal).sum());
        let order_id = self.next_order_id();

        let publication = Publication::new(
            CommerceEvent::OrderCreated(OrderCreated {
                order_id: order_id.clone(),
                customer_id: customer.id.clone(),
                customer_name: customer.name,
                order_date: Utc::now(),
                items,
                total_amount,
                status: OrderStatus::Created,
            }),
            Some(&order_id),
        )?;

        Ok(PlacedOrder {
            publication,
            pending: PendingPayment {
                order_id,
                customer_id: customer.id,
                amount: total_amount,
            },
        })
    }

    /// Generate an order ID that is unique for the life of the process.
    ///
    /// The millisecond stamp is forced strictly increasing, so the random
    /// suffix is cosmetic.
    fn next_order_id(&mut self) -> String {
        let stamp = Utc::now()
            .timestamp_millis()
            .max(self.last_order_millis + 1);
        self.last_order_millis = stamp;
        format!("ord-{}-{}", stamp, self.rng.gen_range(1000..=9999))
    }

    // ------------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------------

    /// Settle a pending payment, authorizing it with the configured probability.
    pub fn resolve_payment(
        &mut self,
        pending: &PendingPayment,
    ) -> SimulationResult<Vec<Publication>> {
        let authorized = self.rng.gen::<f64>() < self.config.payment_success_rate;
        self.settle_payment(pending, authorized)
    }

    /// Emit the payment outcome and the resulting order status change.
    ///
    /// Authorized: `PaymentAuthorized` then `OrderUpdated` (created → paid).
    /// Declined: `PaymentFailed` then `OrderCancelled`.
    pub fn settle_payment(
        &self,
        pending: &PendingPayment,
        authorized: bool,
    ) -> SimulationResult<Vec<Publication>> {
        let correlation = Some(pending.order_id.as_str());

        let events = if authorized {
            [
                CommerceEvent::PaymentAuthorized(PaymentAuthorized {
                    order_id: pending.order_id.clone(),
                    customer_id: pending.customer_id.clone(),
                    amount: pending.amount,
                    payment_method: PAYMENT_METHOD.to_string(),
                    transaction_id: format!("tx-{}", Uuid::now_v7().simple()),
                }),
                CommerceEvent::OrderUpdated(OrderUpdated {
                    order_id: pending.order_id.clone(),
                    previous_status: OrderStatus::Created,
                    current_status: OrderStatus::Paid,
                    update_reason: "payment_received".to_string(),
                }),
            ]
        } else {
            [
                CommerceEvent::PaymentFailed(PaymentFailed {
                    order_id: pending.order_id.clone(),
                    customer_id: pending.customer_id.clone(),
                    amount: pending.amount,
                    payment_method: PAYMENT_METHOD.to_string(),
                    failure_reason: "insufficient_funds".to_string(),
                }),
                CommerceEvent::OrderCancelled(OrderCancelled {
                    order_id: pending.order_id.clone(),
                    previous_status: OrderStatus::Created,
                    cancellation_reason: "payment_failed".to_string(),
                }),
            ]
        };

        events
            .into_iter()
            .map(|event| Publication::new(event, correlation))
            .collect()
    }
}
