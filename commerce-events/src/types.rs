//! Event envelope and domain event types
//!
//! This module defines the envelope every published event travels in and the
//! closed set of e-commerce events the simulator produces.

use crate::taxonomy::TopicKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event envelope.
///
/// Wire form: `{eventType, timestamp, correlationId?, data}`. Envelopes are
/// immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    event_type: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    data: serde_json::Value,
}

impl Envelope {
    /// Create a new envelope stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `event_type` - Variant tag, e.g. `OrderCreated`
    /// * `data` - Variant payload
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            data,
        }
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Override the creation timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Variant tag.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Correlation ID linking causally related envelopes.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Raw payload.
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// Decode the envelope into a typed domain event.
    pub fn decode(&self) -> Result<CommerceEvent, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "eventType": self.event_type,
            "data": self.data,
        }))
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Cancelled,
}

impl OrderStatus {
    /// Wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Customer Events
// ============================================================================

/// A new customer signed up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRegistered {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub registration_date: DateTime<Utc>,
}

// ============================================================================
// Inventory Events
// ============================================================================

/// Stock level of a product changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryUpdated {
    pub product_id: String,
    pub product_name: String,
    pub previous_stock: u32,
    pub current_stock: u32,
    /// Requested delta, before clamping at zero
    pub change: i32,
}

/// Stock fell to or below the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStock {
    pub product_id: String,
    pub product_name: String,
    pub current_stock: u32,
    pub threshold: u32,
}

/// Stock reached zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfStock {
    pub product_id: String,
    pub product_name: String,
    pub last_sold: DateTime<Utc>,
}

// ============================================================================
// Order Events
// ============================================================================

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// An order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub order_date: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
}

/// An order moved to a new status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdated {
    pub order_id: String,
    pub previous_status: OrderStatus,
    pub current_status: OrderStatus,
    pub update_reason: String,
}

/// An order was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: String,
    pub previous_status: OrderStatus,
    pub cancellation_reason: String,
}

// ============================================================================
// Payment Events
// ============================================================================

/// Payment for an order was authorized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorized {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub transaction_id: String,
}

/// Payment for an order was declined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub failure_reason: String,
}

// ============================================================================
// Domain Event
// ============================================================================

/// Every event the e-commerce simulation emits.
///
/// Serialized adjacently tagged, so `{"eventType": "LowStock", "data": {...}}`
/// is the same shape the envelope carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data")]
pub enum CommerceEvent {
    CustomerRegistered(CustomerRegistered),
    InventoryUpdated(InventoryUpdated),
    LowStock(LowStock),
    OutOfStock(OutOfStock),
    OrderCreated(OrderCreated),
    OrderUpdated(OrderUpdated),
    OrderCancelled(OrderCancelled),
    PaymentAuthorized(PaymentAuthorized),
    PaymentFailed(PaymentFailed),
}

impl CommerceEvent {
    /// Variant tag as it appears in `eventType`.
    pub fn event_type(&self) -> &'static str {
        match self {
            CommerceEvent::CustomerRegistered(_) => "CustomerRegistered",
            CommerceEvent::InventoryUpdated(_) => "InventoryUpdated",
            CommerceEvent::LowStock(_) => "LowStock",
            CommerceEvent::OutOfStock(_) => "OutOfStock",
            CommerceEvent::OrderCreated(_) => "OrderCreated",
            CommerceEvent::OrderUpdated(_) => "OrderUpdated",
            CommerceEvent::OrderCancelled(_) => "OrderCancelled",
            CommerceEvent::PaymentAuthorized(_) => "PaymentAuthorized",
            CommerceEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }

    /// Leaf topic the event is published on.
    pub fn topic_kind(&self) -> TopicKind {
        match self {
            CommerceEvent::CustomerRegistered(_) => TopicKind::CustomerRegistered,
            CommerceEvent::InventoryUpdated(_) => TopicKind::InventoryUpdated,
            CommerceEvent::LowStock(_) => TopicKind::LowStock,
            CommerceEvent::OutOfStock(_) => TopicKind::OutOfStock,
            CommerceEvent::OrderCreated(_) => TopicKind::OrderCreated,
            CommerceEvent::OrderUpdated(_) => TopicKind::OrderUpdated,
            CommerceEvent::OrderCancelled(_) => TopicKind::OrderCancelled,
            CommerceEvent::PaymentAuthorized(_) => TopicKind::PaymentAuthorized,
            CommerceEvent::PaymentFailed(_) => TopicKind::PaymentFailed,
        }
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            CommerceEvent::CustomerRegistered(data) => serde_json::to_value(data),
            CommerceEvent::InventoryUpdated(data) => serde_json::to_value(data),
            CommerceEvent::LowStock(data) => serde_json::to_value(data),
            CommerceEvent::OutOfStock(data) => serde_json::to_value(data),
            CommerceEvent::OrderCreated(data) => serde_json::to_value(data),
            CommerceEvent::OrderUpdated(data) => serde_json::to_value(data),
            CommerceEvent::OrderCancelled(data) => serde_json::to_value(data),
            CommerceEvent::PaymentAuthorized(data) => serde_json::to_value(data),
            CommerceEvent::PaymentFailed(data) => serde_json::to_value(data),
        }
    }

    /// Convert to an envelope.
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope::new(self.event_type(), self.payload()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_stock() -> CommerceEvent {
        CommerceEvent::LowStock(LowStock {
            product_id: "p1001".to_string(),
            product_name: "Smartphone".to_string(),
            current_stock: 5,
            threshold: 10,
        })
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = low_stock()
            .to_envelope()
            .unwrap()
            .with_correlation_id("ord-1");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["eventType"], "LowStock");
        assert_eq!(json["correlationId"], "ord-1");
        assert_eq!(json["data"]["productId"], "p1001");
        assert_eq!(json["data"]["currentStock"], 5);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_correlation_id_omitted_when_absent() {
        let envelope = low_stock().to_envelope().unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("correlationId").is_none());
        assert_eq!(envelope.correlation_id(), None);
    }

    #[test]
    fn test_decode_recovers_variant() {
        let event = low_stock();
        let envelope = event.to_envelope().unwrap();
        assert_eq!(envelope.decode().unwrap(), event);
        assert_eq!(event.topic_kind(), TopicKind::LowStock);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let envelope = Envelope::new("Mystery", serde_json::json!({}));
        assert!(envelope.decode().is_err());
    }

    #[test]
    fn test_order_status_wire_strings() {
        let updated = OrderUpdated {
            order_id: "ord-1".to_string(),
            previous_status: OrderStatus::Created,
            current_status: OrderStatus::Paid,
            update_reason: "payment_received".to_string(),
        };
        let json = serde_json::to_value(&updated).unwrap();
        assert_eq!(json["previousStatus"], "created");
        assert_eq!(json["currentStatus"], "paid");
        assert_eq!(json["updateReason"], "payment_received");
    }

    #[test]
    fn test_parse_payload() {
        let envelope = low_stock().to_envelope().unwrap();
        let payload: LowStock = envelope.parse_payload().unwrap();
        assert_eq!(payload.threshold, 10);
        assert!(envelope.parse_payload::<OrderCreated>().is_err());
    }
}
