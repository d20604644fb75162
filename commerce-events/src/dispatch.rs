//! Inbound dispatch and presentation
//!
//! Every inbound message is rendered, whatever subscription brought it in.
//! The topic picks the category header and, for known leaf topics, a tailored
//! set of fields. The subscription registry is consulted separately to record
//! which subscriptions the message satisfied.

use crate::bus::Message;
use crate::registry::{SubscriptionRegistry, SubscriptionStatus};
use crate::taxonomy::{Category, TopicKind};
use crate::types::{
    CustomerRegistered, Envelope, InventoryUpdated, LowStock, OrderCancelled, OrderCreated,
    OrderUpdated, OutOfStock, PaymentAuthorized, PaymentFailed,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

const SEPARATOR_LINE: &str = "-----------------------------------";

fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

fn icon(category: Category) -> &'static str {
    match category {
        Category::Orders => "🛒",
        Category::Inventory => "📦",
        Category::Payments => "💰",
        Category::Customers => "👤",
    }
}

fn header(category: Option<Category>) -> String {
    match category {
        Some(category) => format!("{} {} EVENT:", icon(category), category.label()),
        None => "📨 UNCATEGORIZED EVENT:".to_string(),
    }
}

/// A labelled value in a rendered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub label: &'static str,
    pub value: String,
}

impl Field {
    fn new(label: &'static str, value: impl fmt::Display) -> Self {
        Self {
            label,
            value: value.to_string(),
        }
    }
}

/// Rendered form of one inbound message.
///
/// `Display` gives the human-readable block; `Serialize` gives the
/// structured form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub topic: String,
    pub category: Option<Category>,
    pub kind: Option<TopicKind>,
    pub received_at: DateTime<Utc>,
    pub event_type: Option<String>,
    pub correlation_id: Option<String>,
    /// Alert banner for tailored renderings (e.g. low stock)
    pub headline: Option<&'static str>,
    pub fields: Vec<Field>,
    /// Undecoded body, present when the payload could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    /// Registered patterns this message satisfied, in registration order
    pub matched_subscriptions: Vec<String>,
}

impl Presentation {
    /// Whether the body failed to parse.
    pub fn is_parse_failure(&self) -> bool {
        self.parse_error.is_some()
    }

    /// Look up a field value by label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.label == label)
            .map(|field| field.value.as_str())
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", header(self.category))?;
        writeln!(f, "   Topic: {}", self.topic)?;
        writeln!(
            f,
            "   Time: {}",
            self.received_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        if let Some(event_type) = &self.event_type {
            writeln!(f, "   Type: {}", event_type)?;
        }
        if let Some(correlation_id) = &self.correlation_id {
            writeln!(f, "   Correlation ID: {}", correlation_id)?;
        }
        if let Some(headline) = self.headline {
            writeln!(f, "   {}", headline)?;
        }
        for field in &self.fields {
            writeln!(f, "   {}: {}", field.label, field.value)?;
        }
        if let Some(error) = &self.parse_error {
            writeln!(f, "   Parse Error: {}", error)?;
        }
        if let Some(raw) = &self.raw {
            writeln!(f, "   Raw: {}", raw)?;
        }
        if !self.matched_subscriptions.is_empty() {
            writeln!(f, "   Matched: {}", self.matched_subscriptions.join(", "))?;
        }
        write!(f, "{}", SEPARATOR_LINE)
    }
}

/// Dispatch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages rendered
    pub received: u64,
    /// Messages whose body could not be parsed
    pub parse_failures: u64,
    /// Messages outside the known categories
    pub uncategorized: u64,
}

/// Renders inbound messages.
#[derive(Debug, Default)]
pub struct Dispatcher {
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Render an inbound message.
    ///
    /// Never fails: an unparseable body is rendered raw with the parse error
    /// attached.
    pub fn on_inbound(
        &mut self,
        message: &Message,
        registry: &SubscriptionRegistry,
    ) -> Presentation {
        self.stats.received += 1;

        let category = Category::resolve(&message.topic);
        let kind = TopicKind::from_topic(&message.topic);
        let matched_subscriptions = registry
            .matching_entries(&message.topic)
            .iter()
            .map(|entry| entry.pattern.to_string())
            .collect();

        let mut presentation = Presentation {
            topic: message.topic.to_string(),
            category,
            kind,
            received_at: Utc::now(),
            event_type: None,
            correlation_id: message.properties.correlation_id.clone(),
            headline: None,
            fields: Vec::new(),
            raw: None,
            parse_error: None,
            matched_subscriptions,
        };

        if category.is_none() {
            self.stats.uncategorized += 1;
            tracing::info!(topic = %message.topic, "Received message on uncategorized topic");
        }

        let envelope = match serde_json::from_str::<Envelope>(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.degrade(&mut presentation, message, e);
                return presentation;
            }
        };

        presentation.event_type = Some(envelope.event_type().to_string());
        if let Some(correlation_id) = envelope.correlation_id() {
            presentation.correlation_id = Some(correlation_id.to_string());
        }

        let tailored = match (category, kind) {
            (Some(_), Some(kind)) => tailored_fields(kind, &envelope),
            (Some(_), None) => Ok(None),
            (None, _) => Ok(Some((None, vec![Field::new("Data", envelope.data())]))),
        };

        match tailored {
            Ok(Some((headline, fields))) => {
                presentation.headline = headline;
                presentation.fields = fields;
            }
            Ok(None) => {}
            Err(e) => self.degrade(&mut presentation, message, e),
        }

        presentation
    }

    fn degrade(
        &mut self,
        presentation: &mut Presentation,
        message: &Message,
        error: serde_json::Error,
    ) {
        self.stats.parse_failures += 1;
        tracing::warn!(
            topic = %message.topic,
            error = %error,
            "Error parsing message, rendering raw payload"
        );
        presentation.headline = None;
        presentation.fields.clear();
        presentation.raw = Some(message.body.clone());
        presentation.parse_error = Some(error.to_string());
    }
}

type Tailored = Option<(Option<&'static str>, Vec<Field>)>;

/// Fields for a known leaf topic, or `None` for leaves without a tailored view.
fn tailored_fields(kind: TopicKind, envelope: &Envelope) -> Result<Tailored, serde_json::Error> {
    let rendered = match kind {
        TopicKind::OrderCreated => {
            let data: OrderCreated = envelope.parse_payload()?;
            (
                None,
                vec![
                    Field::new("Order ID", data.order_id),
                    Field::new("Customer", data.customer_name),
                    Field::new("Total", money(data.total_amount)),
                    Field::new("Items", data.items.len()),
                ],
            )
        }
        TopicKind::OrderUpdated => {
            let data: OrderUpdated = envelope.parse_payload()?;
            (
                None,
                vec![
                    Field::new("Order ID", data.order_id),
                    Field::new(
                        "Status Change",
                        format!("{} → {}", data.previous_status, data.current_status),
                    ),
                    Field::new("Reason", data.update_reason),
                ],
            )
        }
        TopicKind::OrderCancelled => {
            let data: OrderCancelled = envelope.parse_payload()?;
            (
                None,
                vec![
                    Field::new("Order ID", data.order_id),
                    Field::new("Previous Status", data.previous_status),
                    Field::new("Reason", data.cancellation_reason),
                ],
            )
        }
        TopicKind::InventoryUpdated => {
            let data: InventoryUpdated = envelope.parse_payload()?;
            (
                None,
                vec![
                    Field::new("Product", data.product_name),
                    Field::new(
                        "Stock Change",
                        format!("{} → {}", data.previous_stock, data.current_stock),
                    ),
                ],
            )
        }
        TopicKind::LowStock => {
            let data: LowStock = envelope.parse_payload()?;
            (
                Some("⚠️ LOW STOCK ALERT"),
                vec![
                    Field::new("Product", data.product_name),
                    Field::new("Current Stock", data.current_stock),
                    Field::new("Threshold", data.threshold),
                ],
            )
        }
        TopicKind::OutOfStock => {
            let data: OutOfStock = envelope.parse_payload()?;
            (
                Some("❌ OUT OF STOCK ALERT"),
                vec![
                    Field::new("Product", data.product_name),
                    Field::new(
                        "Last Sold",
                        data.last_sold.to_rfc3339_opts(SecondsFormat::Millis, true),
                    ),
                ],
            )
        }
        TopicKind::PaymentAuthorized => {
            let data: PaymentAuthorized = envelope.parse_payload()?;
            (
                Some("✅ PAYMENT AUTHORIZED"),
                vec![
                    Field::new("Order ID", data.order_id),
                    Field::new("Amount", money(data.amount)),
                    Field::new("Transaction ID", data.transaction_id),
                ],
            )
        }
        TopicKind::PaymentFailed => {
            let data: PaymentFailed = envelope.parse_payload()?;
            (
                Some("❌ PAYMENT FAILED"),
                vec![
                    Field::new("Order ID", data.order_id),
                    Field::new("Amount", money(data.amount)),
                    Field::new("Reason", data.failure_reason),
                ],
            )
        }
        TopicKind::CustomerRegistered => {
            let data: CustomerRegistered = envelope.parse_payload()?;
            (
                Some("✨ NEW CUSTOMER"),
                vec![
                    Field::new("ID", data.customer_id),
                    Field::new("Name", data.name),
                    Field::new("Email", data.email),
                ],
            )
        }
        TopicKind::OrderShipped
        | TopicKind::OrderDelivered
        | TopicKind::Restocked
        | TopicKind::CustomerLoggedIn
        | TopicKind::CustomerProfileUpdated
        | TopicKind::PaymentCaptured
        | TopicKind::PaymentRefunded => return Ok(None),
    };
    Ok(Some(rendered))
}

/// Render the subscription status report.
pub fn render_subscriptions(snapshot: &[SubscriptionStatus]) -> String {
    let mut lines = vec![
        String::new(),
        "Current Subscriptions:".to_string(),
        SEPARATOR_LINE.to_string(),
    ];

    if snapshot.is_empty() {
        lines.push("No subscriptions.".to_string());
    } else {
        lines.extend(snapshot.iter().map(|status| {
            let marker = if status.active { "✅" } else { "❌" };
            format!("{} {} - {}", marker, status.pattern, status.description)
        }));
    }

    lines.push(SEPARATOR_LINE.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::SimulationConfig;
    use crate::simulator::{Publication, WorkflowSimulator};
    use crate::topic::{SubscriptionPattern, Topic};

    fn simulator() -> WorkflowSimulator {
        let config = SimulationConfig {
            seed: Some(42),
            ..SimulationConfig::default()
        };
        WorkflowSimulator::from_config(Catalog::seeded(), config).unwrap()
    }

    fn message(publication: &Publication) -> Message {
        Message::from_envelope(publication.kind.topic().unwrap(), &publication.envelope).unwrap()
    }

    fn registry() -> SubscriptionRegistry {
        let mut registry = SubscriptionRegistry::new();
        for (pattern, description) in [
            ("ecommerce/orders/*", "All Order Events"),
            ("ecommerce/inventory/low-stock", "Low Stock Alerts"),
            ("ecommerce/>", "All E-commerce Events"),
        ] {
            registry
                .register(SubscriptionPattern::parse(pattern).unwrap(), description)
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_order_created_total_formatting() {
        let mut sim = simulator();
        let placed = sim.place_order("c101", &[("p1001", 1)]).unwrap();

        let mut dispatcher = Dispatcher::new();
        let presentation = dispatcher.on_inbound(&message(&placed.publication), &registry());

        assert_eq!(presentation.category, Some(Category::Orders));
        assert_eq!(presentation.kind, Some(TopicKind::OrderCreated));
        assert_eq!(presentation.event_type.as_deref(), Some("OrderCreated"));
        assert_eq!(presentation.field("Total"), Some("$699.99"));
        assert_eq!(presentation.field("Customer"), Some("Alice Johnson"));
        assert_eq!(presentation.field("Items"), Some("1"));
        assert_eq!(
            presentation.correlation_id.as_deref(),
            Some(placed.pending.order_id.as_str())
        );
        assert_eq!(
            presentation.matched_subscriptions,
            vec!["ecommerce/orders/*", "ecommerce/>"]
        );

        let text = presentation.to_string();
        assert!(text.contains("🛒 ORDER EVENT:"));
        assert!(text.contains("   Total: $699.99"));
        assert!(text.ends_with(SEPARATOR_LINE));
    }

    #[test]
    fn test_inventory_renderings() {
        let mut sim = simulator();
        let published = sim.apply_inventory_change("p1001", -45).unwrap();
        let mut dispatcher = Dispatcher::new();

        let updated = dispatcher.on_inbound(&message(&published[0]), &registry());
        assert_eq!(updated.field("Stock Change"), Some("50 → 5"));
        assert_eq!(updated.field("Product"), Some("Smartphone"));
        assert_eq!(updated.headline, None);
        assert_eq!(updated.matched_subscriptions, vec!["ecommerce/>"]);

        let low = dispatcher.on_inbound(&message(&published[1]), &registry());
        assert_eq!(low.headline, Some("⚠️ LOW STOCK ALERT"));
        assert_eq!(low.field("Current Stock"), Some("5"));
        assert_eq!(low.field("Threshold"), Some("10"));
        assert_eq!(
            low.matched_subscriptions,
            vec!["ecommerce/inventory/low-stock", "ecommerce/>"]
        );
    }

    #[test]
    fn test_payment_and_status_renderings() {
        let mut sim = simulator();
        let placed = sim.place_order("c102", &[("p1004", 2)]).unwrap();
        let mut dispatcher = Dispatcher::new();

        let authorized = sim.settle_payment(&placed.pending, true).unwrap();
        let payment = dispatcher.on_inbound(&message(&authorized[0]), &registry());
        assert_eq!(payment.category, Some(Category::Payments));
        assert_eq!(payment.headline, Some("✅ PAYMENT AUTHORIZED"));
        assert_eq!(payment.field("Amount"), Some("$179.98"));

        let update = dispatcher.on_inbound(&message(&authorized[1]), &registry());
        assert_eq!(update.field("Status Change"), Some("created → paid"));
        assert_eq!(update.field("Reason"), Some("payment_received"));

        let declined = sim.settle_payment(&placed.pending, false).unwrap();
        let failed = dispatcher.on_inbound(&message(&declined[0]), &registry());
        assert_eq!(failed.headline, Some("❌ PAYMENT FAILED"));
        assert_eq!(failed.field("Reason"), Some("insufficient_funds"));

        let cancelled = dispatcher.on_inbound(&message(&declined[1]), &registry());
        assert_eq!(cancelled.field("Previous Status"), Some("created"));
        assert_eq!(cancelled.field("Reason"), Some("payment_failed"));
    }

    #[test]
    fn test_customer_rendering() {
        let mut sim = simulator();
        let publication = sim.simulate_registration().unwrap();
        let mut dispatcher = Dispatcher::new();

        let presentation = dispatcher.on_inbound(&message(&publication), &registry());
        assert_eq!(presentation.category, Some(Category::Customers));
        assert_eq!(presentation.headline, Some("✨ NEW CUSTOMER"));
        assert!(presentation.field("ID").unwrap().starts_with('c'));
        assert!(presentation.to_string().contains("👤 CUSTOMER EVENT:"));
    }

    #[test]
    fn test_malformed_body_degrades() {
        let topic = Topic::parse("ecommerce/orders/created").unwrap();
        let message = Message::raw(topic, "not json {");
        let mut dispatcher = Dispatcher::new();

        let presentation = dispatcher.on_inbound(&message, &registry());
        assert!(presentation.is_parse_failure());
        assert_eq!(presentation.raw.as_deref(), Some("not json {"));
        assert_eq!(presentation.category, Some(Category::Orders));
        assert!(presentation.fields.is_empty());
        assert!(presentation.to_string().contains("   Raw: not json {"));
        assert_eq!(dispatcher.stats().parse_failures, 1);
    }

    #[test]
    fn test_payload_not_matching_topic_degrades() {
        let topic = Topic::parse("ecommerce/orders/created").unwrap();
        let envelope = Envelope::new("OrderCreated", serde_json::json!({"orderId": 7}));
        let message = Message::from_envelope(topic, &envelope).unwrap();
        let mut dispatcher = Dispatcher::new();

        let presentation = dispatcher.on_inbound(&message, &registry());
        assert!(presentation.is_parse_failure());
        assert_eq!(presentation.event_type.as_deref(), Some("OrderCreated"));
    }

    #[test]
    fn test_uncategorized_topic_rendered_generically() {
        let topic = Topic::parse("ecommerce/shipping/label-printed").unwrap();
        let envelope = Envelope::new("LabelPrinted", serde_json::json!({"labelId": "l1"}));
        let message = Message::from_envelope(topic, &envelope).unwrap();
        let mut dispatcher = Dispatcher::new();

        let presentation = dispatcher.on_inbound(&message, &registry());
        assert_eq!(presentation.category, None);
        assert_eq!(presentation.field("Data"), Some(r#"{"labelId":"l1"}"#));
        assert_eq!(presentation.matched_subscriptions, vec!["ecommerce/>"]);
        assert!(presentation.to_string().contains("📨 UNCATEGORIZED EVENT:"));
        assert_eq!(dispatcher.stats().uncategorized, 1);
    }

    #[test]
    fn test_leaf_without_tailored_view() {
        let topic = TopicKind::OrderShipped.topic().unwrap();
        let envelope = Envelope::new("OrderShipped", serde_json::json!({}));
        let message = Message::from_envelope(topic, &envelope).unwrap();

        let presentation = Dispatcher::new().on_inbound(&message, &SubscriptionRegistry::new());
        assert_eq!(presentation.category, Some(Category::Orders));
        assert!(presentation.fields.is_empty());
        assert!(!presentation.is_parse_failure());
        assert!(presentation.matched_subscriptions.is_empty());
    }

    #[test]
    fn test_structured_output() {
        let mut sim = simulator();
        let placed = sim.place_order("c101", &[("p1001", 1)]).unwrap();
        let presentation = Dispatcher::new().on_inbound(&message(&placed.publication), &registry());

        let json = serde_json::to_value(&presentation).unwrap();
        assert_eq!(json["category"], "orders");
        assert_eq!(json["kind"], "order_created");
        assert_eq!(json["fields"][2]["label"], "Total");
        assert!(json.get("parseError").is_none());
    }

    #[test]
    fn test_render_subscriptions() {
        assert!(render_subscriptions(&[]).contains("No subscriptions."));

        let mut registry = registry();
        registry
            .confirm(&SubscriptionPattern::parse("ecommerce/>").unwrap())
            .unwrap();
        let report = render_subscriptions(&registry.snapshot());
        assert!(report.contains("❌ ecommerce/orders/* - All Order Events"));
        assert!(report.contains("✅ ecommerce/> - All E-commerce Events"));
    }
}
