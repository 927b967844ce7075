//! Order Registry Module
//!
//! Correlates submitted orders with the venue that acknowledged them.
//! Venue access layers (or the strategies wrapping them) call
//! [`OrderRegistry::on_submit`] as soon as an order is accepted; later
//! venue events can then be matched back to the submission and to the
//! caller's own context.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Order status as reported in a submission acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().replace(|c: char| c == '_' || c == ' ', "").as_str() {
            "NEW" | "OPEN" | "ACTIVE" => OrderStatus::New,
            "PARTIALLYFILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        }
    }
}

/// Venue acknowledgement of an accepted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub raw_response: Option<serde_json::Value>,
    pub received_at: DateTime<Utc>,
}

impl SubmitResponse {
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        SubmitResponse {
            order_id: order_id.into(),
            status,
            client_order_id: None,
            message: None,
            raw_response: None,
            received_at: Utc::now(),
        }
    }

    /// Build an acknowledgement from a venue's raw JSON reply.
    ///
    /// Venues disagree on field names, so the usual spellings are tried in
    /// turn. Returns `None` when no order id can be found.
    pub fn from_json(raw: serde_json::Value) -> Option<Self> {
        let order_id = raw
            .get("orderId")
            .or_else(|| raw.get("order_id"))
            .or_else(|| raw.get("id"))
            .or_else(|| raw.get("data").and_then(|d| d.get("orderId")))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })?;

        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(OrderStatus::from)
            .unwrap_or(OrderStatus::New);

        let client_order_id = raw
            .get("clientOrderId")
            .or_else(|| raw.get("customTag"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let message = raw
            .get("message")
            .or_else(|| raw.get("errorMessage"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(SubmitResponse {
            order_id,
            status,
            client_order_id,
            message,
            raw_response: Some(raw),
            received_at: Utc::now(),
        })
    }
}

/// (venue, order id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub venue: String,
    pub order_id: String,
}

impl OrderKey {
    pub fn new(venue: impl Into<String>, order_id: impl Into<String>) -> Self {
        OrderKey {
            venue: venue.into(),
            order_id: order_id.into(),
        }
    }
}

/// What was recorded for one submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderValue<U> {
    pub response: SubmitResponse,
    pub context: U,
}

/// Concurrent (venue, order id) → submission map.
///
/// Writes to unrelated keys land on different shards, so many strategies can
/// submit to many venues without contending on one lock.
#[derive(Debug)]
pub struct OrderRegistry<U = serde_json::Value> {
    orders: DashMap<OrderKey, OrderValue<U>>,
}

impl<U> OrderRegistry<U> {
    pub fn new() -> Self {
        OrderRegistry {
            orders: DashMap::new(),
        }
    }

    /// Record an accepted order.
    ///
    /// A resubmission under the same key replaces the earlier entry; the
    /// replaced value is returned.
    pub fn on_submit(
        &self,
        venue: &str,
        response: SubmitResponse,
        context: U,
    ) -> Option<OrderValue<U>> {
        let key = OrderKey::new(venue, response.order_id.clone());
        tracing::trace!(
            venue = %venue,
            order_id = %key.order_id,
            status = ?response.status,
            "order submitted"
        );

        let previous = self.orders.insert(key, OrderValue { response, context });
        if let Some(ref previous) = previous {
            tracing::debug!(
                venue = %venue,
                order_id = %previous.response.order_id,
                "order resubmitted, previous entry replaced"
            );
        }
        previous
    }

    pub fn contains(&self, venue: &str, order_id: &str) -> bool {
        self.orders.contains_key(&OrderKey::new(venue, order_id))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl<U: Clone> OrderRegistry<U> {
    pub fn get(&self, venue: &str, order_id: &str) -> Option<OrderValue<U>> {
        self.orders
            .get(&OrderKey::new(venue, order_id))
            .map(|entry| entry.value().clone())
    }

    /// Every order recorded for `venue`, in no particular order
    pub fn for_venue(&self, venue: &str) -> Vec<(String, OrderValue<U>)> {
        self.orders
            .iter()
            .filter(|entry| entry.key().venue == venue)
            .map(|entry| (entry.key().order_id.clone(), entry.value().clone()))
            .collect()
    }
}

impl<U> Default for OrderRegistry<U> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_status_parsing() {
        assert_eq!(OrderStatus::from("new"), OrderStatus::New);
        assert_eq!(OrderStatus::from("partially_filled"), OrderStatus::PartiallyFilled);
        assert_eq!(OrderStatus::from("Canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from("???"), OrderStatus::Unknown);
    }

    #[test]
    fn test_response_from_json() {
        let ack = SubmitResponse::from_json(json!({
            "orderId": 42,
            "status": "FILLED",
            "customTag": "grid-1"
        }))
        .unwrap();
        assert_eq!(ack.order_id, "42");
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.client_order_id.as_deref(), Some("grid-1"));
        assert!(ack.raw_response.is_some());

        let nested = SubmitResponse::from_json(json!({"data": {"orderId": "abc"}})).unwrap();
        assert_eq!(nested.order_id, "abc");
        assert_eq!(nested.status, OrderStatus::New);

        assert!(SubmitResponse::from_json(json!({"success": false})).is_none());
    }

    #[test]
    fn test_submit_then_get() {
        let registry = OrderRegistry::new();
        let ack = SubmitResponse::new("1", OrderStatus::New);
        assert!(registry.on_submit("binance", ack.clone(), json!({"leg": 1})).is_none());

        let value = registry.get("binance", "1").unwrap();
        assert_eq!(value.response, ack);
        assert_eq!(value.context, json!({"leg": 1}));
        assert!(registry.get("kraken", "1").is_none());
    }

    #[test]
    fn test_resubmission_keeps_last_value() {
        let registry = OrderRegistry::new();
        registry.on_submit("binance", SubmitResponse::new("7", OrderStatus::New), json!("first"));
        let previous = registry
            .on_submit("binance", SubmitResponse::new("7", OrderStatus::Filled), json!("second"))
            .unwrap();

        assert_eq!(previous.context, json!("first"));
        assert_eq!(registry.len(), 1);
        let value = registry.get("binance", "7").unwrap();
        assert_eq!(value.context, json!("second"));
        assert_eq!(value.response.status, OrderStatus::Filled);
    }

    #[test]
    fn test_same_id_on_two_venues() {
        let registry: OrderRegistry<u32> = OrderRegistry::new();
        registry.on_submit("binance", SubmitResponse::new("7", OrderStatus::New), 1);
        registry.on_submit("kraken", SubmitResponse::new("7", OrderStatus::New), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.for_venue("kraken").len(), 1);
        assert_eq!(registry.for_venue("kraken")[0].1.context, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_are_not_lost() {
        let registry: Arc<OrderRegistry<usize>> = Arc::new(OrderRegistry::new());
        let venues = ["binance", "kraken", "bitstamp", "okx"];
        let per_venue = 250;

        let mut handles = Vec::new();
        for venue in venues {
            for chunk in 0..4 {
                let registry = Arc::clone(&registry);
                handles.push(tokio::spawn(async move {
                    for i in (chunk..per_venue).step_by(4) {
                        let ack = SubmitResponse::new(i.to_string(), OrderStatus::New);
                        registry.on_submit(venue, ack, i);
                    }
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), venues.len() * per_venue);
        for venue in venues {
            for i in 0..per_venue {
                let value = registry.get(venue, &i.to_string()).unwrap();
                assert_eq!(value.context, i);
            }
        }
    }
}
