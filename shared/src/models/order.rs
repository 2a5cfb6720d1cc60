//! Order Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::ProductUnit;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Served,
    Paid,
    Cancelled,
}

impl OrderStatus {
    /// Open orders still bound to their table
    pub const ACTIVE: [OrderStatus; 3] =
        [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Served];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Served => "served",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Order line
///
/// Name and unit price are snapshots taken when the line was added; later
/// product edits never touch them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Client-temporary id in a cart, server id once saved
    pub id: String,
    /// Source product (None once the product is gone)
    #[serde(default)]
    pub product_id: Option<String>,
    pub product_name: String,
    /// Kilograms for weighed lines, a count otherwise
    pub quantity: f64,
    pub unit_price: f64,
    /// quantity x unit_price
    pub total_price: f64,
    pub unit: ProductUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Persisted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// None for a quick sale
    #[serde(default)]
    pub table_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Always the sum of item totals
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub order_number: String,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Order as held by a session before/after saving
///
/// This is both the local order shell and the upsert payload: header
/// fields plus the full item list that replaces whatever the backend had.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderDraft {
    /// None until the first successful save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub table_id: Option<String>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

impl OrderDraft {
    /// Empty pending shell for a table (or a quick sale with `None`)
    pub fn for_table(table_id: Option<String>) -> Self {
        Self {
            id: None,
            order_number: None,
            table_id,
            status: OrderStatus::Pending,
            items: Vec::new(),
            total_amount: 0.0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

impl From<Order> for OrderDraft {
    fn from(order: Order) -> Self {
        Self {
            id: Some(order.id),
            order_number: Some(order.order_number),
            table_id: order.table_id,
            status: order.status,
            items: order.items,
            total_amount: order.total_amount,
        }
    }
}
