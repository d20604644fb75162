//! The e-commerce topic namespace
//!
//! Four domain categories live under `ecommerce/`, each with a fixed set of
//! leaf topics. Both are closed enumerations so that dispatch switches on
//! variants instead of comparing strings.

use crate::topic::{SubscriptionPattern, Topic, TopicResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of the namespace.
pub const ROOT: &str = "ecommerce";

/// Multi-level subscription covering every e-commerce topic.
pub const ALL_ECOMMERCE: &str = "ecommerce/>";

/// Domain categories, keyed by their base path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `ecommerce/orders`
    Orders,
    /// `ecommerce/inventory`
    Inventory,
    /// `ecommerce/customers`
    Customers,
    /// `ecommerce/payments`
    Payments,
}

impl Category {
    /// Every category.
    pub const ALL: [Category; 4] = [
        Category::Orders,
        Category::Inventory,
        Category::Customers,
        Category::Payments,
    ];

    /// Base path of the category.
    pub fn base(&self) -> &'static str {
        match self {
            Category::Orders => "ecommerce/orders",
            Category::Inventory => "ecommerce/inventory",
            Category::Customers => "ecommerce/customers",
            Category::Payments => "ecommerce/payments",
        }
    }

    /// Display label used in rendered output.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Orders => "ORDER",
            Category::Inventory => "INVENTORY",
            Category::Customers => "CUSTOMER",
            Category::Payments => "PAYMENT",
        }
    }

    /// The `<base>/*` pattern for this category.
    pub fn wildcard(&self) -> TopicResult<SubscriptionPattern> {
        SubscriptionPattern::parse(&format!("{}/*", self.base()))
    }

    /// Resolve the category of a topic by longest segment-wise prefix.
    ///
    /// Returns `None` for topics outside the four base paths.
    pub fn resolve(topic: &Topic) -> Option<Self> {
        Self::ALL
            .iter()
            .filter_map(|category| {
                let base = Topic::parse(category.base()).ok()?;
                topic.starts_with(&base).then_some((base.len(), *category))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, category)| category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base())
    }
}

/// Known leaf topics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    OrderCreated,
    OrderUpdated,
    OrderCancelled,
    OrderShipped,
    OrderDelivered,
    InventoryUpdated,
    LowStock,
    OutOfStock,
    Restocked,
    CustomerRegistered,
    CustomerLoggedIn,
    CustomerProfileUpdated,
    PaymentAuthorized,
    PaymentCaptured,
    PaymentFailed,
    PaymentRefunded,
}

impl TopicKind {
    /// Every leaf topic.
    pub const ALL: [TopicKind; 16] = [
        TopicKind::OrderCreated,
        TopicKind::OrderUpdated,
        TopicKind::OrderCancelled,
        TopicKind::OrderShipped,
        TopicKind::OrderDelivered,
        TopicKind::InventoryUpdated,
        TopicKind::LowStock,
        TopicKind::OutOfStock,
        TopicKind::Restocked,
        TopicKind::CustomerRegistered,
        TopicKind::CustomerLoggedIn,
        TopicKind::CustomerProfileUpdated,
        TopicKind::PaymentAuthorized,
        TopicKind::PaymentCaptured,
        TopicKind::PaymentFailed,
        TopicKind::PaymentRefunded,
    ];

    /// Full topic path.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::OrderCreated => "ecommerce/orders/created",
            TopicKind::OrderUpdated => "ecommerce/orders/updated",
            TopicKind::OrderCancelled => "ecommerce/orders/cancelled",
            TopicKind::OrderShipped => "ecommerce/orders/shipped",
            TopicKind::OrderDelivered => "ecommerce/orders/delivered",
            TopicKind::InventoryUpdated => "ecommerce/inventory/updated",
            TopicKind::LowStock => "ecommerce/inventory/low-stock",
            TopicKind::OutOfStock => "ecommerce/inventory/out-of-stock",
            TopicKind::Restocked => "ecommerce/inventory/restocked",
            TopicKind::CustomerRegistered => "ecommerce/customers/registered",
            TopicKind::CustomerLoggedIn => "ecommerce/customers/logged-in",
            TopicKind::CustomerProfileUpdated => "ecommerce/customers/profile-updated",
            TopicKind::PaymentAuthorized => "ecommerce/payments/authorized",
            TopicKind::PaymentCaptured => "ecommerce/payments/captured",
            TopicKind::PaymentFailed => "ecommerce/payments/failed",
            TopicKind::PaymentRefunded => "ecommerce/payments/refunded",
        }
    }

    /// Category owning this leaf.
    pub fn category(&self) -> Category {
        match self {
            TopicKind::OrderCreated
            | TopicKind::OrderUpdated
            | TopicKind::OrderCancelled
            | TopicKind::OrderShipped
            | TopicKind::OrderDelivered => Category::Orders,
            TopicKind::InventoryUpdated
            | TopicKind::LowStock
            | TopicKind::OutOfStock
            | TopicKind::Restocked => Category::Inventory,
            TopicKind::CustomerRegistered
            | TopicKind::CustomerLoggedIn
            | TopicKind::CustomerProfileUpdated => Category::Customers,
            TopicKind::PaymentAuthorized
            | TopicKind::PaymentCaptured
            | TopicKind::PaymentFailed
            | TopicKind::PaymentRefunded => Category::Payments,
        }
    }

    /// Parsed topic for this leaf.
    pub fn topic(&self) -> TopicResult<Topic> {
        Topic::parse(self.as_str())
    }

    /// Look up the leaf matching a topic exactly.
    pub fn parse(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == topic)
    }

    /// Look up the leaf for a parsed topic.
    pub fn from_topic(topic: &Topic) -> Option<Self> {
        Self::parse(&topic.to_string())
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
