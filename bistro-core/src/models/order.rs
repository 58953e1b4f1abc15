//! Incoming orders and their kitchen workflow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an order is in the kitchen workflow.
///
/// Orders only move forward, one step at a time:
/// `pending -> preparing -> ready -> delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Delivered,
}

impl OrderStatus {
    /// The status that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    /// True if `target` is exactly the next step.
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Preparing => write!(f, "preparing"),
            OrderStatus::Ready => write!(f, "ready"),
            OrderStatus::Delivered => write!(f, "delivered"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "delivered" => Ok(OrderStatus::Delivered),
            _ => Err(format!(
                "Invalid order status '{}'. Valid options: pending, preparing, ready, delivered",
                s
            )),
        }
    }
}

/// A line of an order.
///
/// Orders are written by an outside producer, so quantities and prices are
/// read from either numbers or numeric text. A quantity must still be a whole
/// number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    #[serde(deserialize_with = "lenient::quantity")]
    pub quantity: u32,
    #[serde(
        serialize_with = "lenient::serialize_price",
        deserialize_with = "lenient::price"
    )]
    pub price: Decimal,
}

mod lenient {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::codec::{amount_cell, amount_from_value};

    pub fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(deserializer)?;
        amount_from_value(&value)
            .filter(|q| q.fract().is_zero())
            .and_then(|q| q.to_u32())
            .ok_or_else(|| D::Error::custom(format!("invalid quantity {}", value)))
    }

    pub fn price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let value = Value::deserialize(deserializer)?;
        amount_from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid price {}", value)))
    }

    pub fn serialize_price<S: Serializer>(price: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        amount_cell(*price).serialize(serializer)
    }
}

impl OrderItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
        }
    }

    /// Unit price times quantity.
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An order placed by a customer.
///
/// Orders are produced outside this application; the admin panel only reads
/// them and moves them through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer: Option<String>,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: i64, items: Vec<OrderItem>) -> Self {
        let total = items.iter().map(OrderItem::subtotal).sum();
        let now = Utc::now();
        Self {
            id,
            customer: None,
            items,
            total,
            status: OrderStatus::Pending,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self.updated_at = Some(created_at);
        self
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Order #{} [{}]", self.id, self.status.label())?;
        writeln!(
            f,
            "Customer: {}",
            self.customer.as_deref().unwrap_or("Not provided")
        )?;
        for item in &self.items {
            writeln!(
                f,
                "  {}x {:<24} {:>10.2}",
                item.quantity,
                item.name,
                item.subtotal()
            )?;
        }
        writeln!(f, "Total: {:.2}", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_only() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_advance_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_advance_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_advance_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            OrderStatus::from_str("Preparing").unwrap(),
            OrderStatus::Preparing
        );
        assert!(OrderStatus::from_str("cancelled").is_err());
    }

    #[test]
    fn test_item_subtotal() {
        let item = OrderItem::new("Soup", 3, Decimal::new(1250, 2));
        assert_eq!(item.subtotal(), Decimal::new(3750, 2));
    }

    #[test]
    fn test_new_order_total() {
        let order = Order::new(
            1001,
            vec![
                OrderItem::new("Soup", 2, Decimal::new(1250, 2)),
                OrderItem::new("Juice", 1, Decimal::new(600, 2)),
            ],
        );
        assert_eq!(order.total, Decimal::new(3100, 2));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_items_json_uses_numbers() {
        let items = vec![OrderItem::new("Soup", 2, Decimal::new(1250, 2))];
        let json = serde_json::to_string(&items).unwrap();
        assert_eq!(json, r#"[{"name":"Soup","quantity":2,"price":12.5}]"#);

        let parsed: Vec<OrderItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, items);
    }

    #[test]
    fn test_items_accept_numeric_text_and_whole_floats() {
        let json = r#"[{"name":"Soup","quantity":2.0,"price":"12.50"},{"name":"Tea","quantity":"3","price":4}]"#;
        let parsed: Vec<OrderItem> = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            vec![
                OrderItem::new("Soup", 2, Decimal::new(1250, 2)),
                OrderItem::new("Tea", 3, Decimal::new(4, 0)),
            ]
        );

        for bad in [
            r#"[{"name":"Soup","quantity":1.5,"price":1}]"#,
            r#"[{"name":"Soup","quantity":-1,"price":1}]"#,
            r#"[{"name":"Soup","quantity":1,"price":"cheap"}]"#,
        ] {
            assert!(serde_json::from_str::<Vec<OrderItem>>(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_order_display() {
        let order = Order::new(7, vec![OrderItem::new("Soup", 2, Decimal::new(1250, 2))])
            .with_customer("Ana");
        let output = format!("{}", order);
        assert!(output.contains("Order #7"));
        assert!(output.contains("Ana"));
        assert!(output.contains("25.00"));
    }
}
