//! Backend row contract
//!
//! Strict row types for the REST backend. Every row is mapped into the
//! shared models through `TryFrom`, so shape drift surfaces as
//! `InvalidResponse` at the boundary instead of deep inside the till.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use shared::models::{
    DiningTable, DiningTableUpsert, Order, OrderDraft, OrderItem, OrderStatus, Product,
    ProductCategory, ProductKind, ProductUnit, ProductUpsert, TableStatus,
};

use crate::money;
use crate::{ClientError, ClientResult};

// ==================== Column helpers ====================

/// Numeric columns arrive as JSON numbers or as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid numeric value '{}'", s))),
        }
    }
}

fn decimal_column<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Numeric::deserialize(deserializer)?.into_f64::<D::Error>()
}

fn optional_decimal_column<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Option::<Numeric>::deserialize(deserializer)?
        .map(|n| n.into_f64::<D::Error>())
        .transpose()
}

/// Parse a text column through the model's serde names
fn parse_enum<T: DeserializeOwned>(value: &str, column: &str) -> ClientResult<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        ClientError::InvalidResponse(format!("unknown {} value '{}'", column, value))
    })
}

// ==================== Products ====================

#[derive(Debug, Deserialize)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "decimal_column")]
    pub price: f64,
    pub unit: String,
    #[serde(default, rename = "product_type", alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "optional_decimal_column")]
    pub stock: Option<f64>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl TryFrom<ProductRow> for Product {
    type Error = ClientError;

    fn try_from(row: ProductRow) -> ClientResult<Self> {
        let unit: ProductUnit = parse_enum(&row.unit, "unit")?;
        let kind = match row.kind.as_deref() {
            Some(kind) => parse_enum(kind, "product_type")?,
            None if unit.is_weighed() => ProductKind::Retail,
            None => ProductKind::Service,
        };
        let category = match row.category.as_deref() {
            Some(category) if !category.is_empty() => parse_enum(category, "category")?,
            _ => ProductCategory::Other,
        };

        Ok(Product {
            id: row.id,
            name: row.name,
            price: row.price,
            unit,
            kind,
            category,
            image: row.image.filter(|i| !i.is_empty()),
            stock: row.stock,
            sort_order: row.sort_order,
        })
    }
}

/// Product insert/patch body
#[derive(Debug, Serialize)]
pub struct ProductWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<ProductUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ProductCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}

impl From<ProductUpsert> for ProductWrite {
    fn from(p: ProductUpsert) -> Self {
        Self {
            name: p.name,
            price: p.price,
            unit: p.unit,
            product_type: p.kind,
            category: p.category,
            image: p.image,
            stock: p.stock,
            sort_order: p.sort_order,
        }
    }
}

// ==================== Tables ====================

#[derive(Debug, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_order_id: Option<String>,
    #[serde(default)]
    pub needs_service: Option<bool>,
}

impl TryFrom<TableRow> for DiningTable {
    type Error = ClientError;

    fn try_from(row: TableRow) -> ClientResult<Self> {
        let status = match row.status.as_deref() {
            Some(status) => parse_enum(status, "status")?,
            None => TableStatus::Available,
        };

        let mut current_order_id = row.current_order_id.filter(|id| !id.is_empty());
        if status != TableStatus::Occupied && current_order_id.is_some() {
            tracing::warn!(
                table_id = %row.id,
                ?status,
                "Dropping order reference on a table that is not occupied"
            );
            current_order_id = None;
        }

        Ok(DiningTable {
            id: row.id,
            name: row.name,
            status,
            current_order_id,
            needs_service: row.needs_service.unwrap_or(false),
        })
    }
}

/// Table insert/patch body
#[derive(Debug, Serialize)]
pub struct TableWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TableStatus>,
    /// Always sent with a status change so the pair stays consistent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_order_id: Option<Option<String>>,
}

impl From<DiningTableUpsert> for TableWrite {
    fn from(t: DiningTableUpsert) -> Self {
        let current_order_id = match t.status {
            Some(TableStatus::Occupied) | None => None,
            Some(_) => Some(None),
        };
        Self {
            name: t.name,
            status: t.status,
            current_order_id,
        }
    }
}

// ==================== Orders ====================

#[derive(Debug, Deserialize)]
pub struct OrderItemRow {
    pub id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(deserialize_with = "decimal_column")]
    pub quantity: f64,
    #[serde(deserialize_with = "decimal_column")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "optional_decimal_column")]
    pub total_price: Option<f64>,
    pub unit: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = ClientError;

    fn try_from(row: OrderItemRow) -> ClientResult<Self> {
        let unit = parse_enum(&row.unit, "unit")?;
        let total_price = money::line_total(row.quantity, row.unit_price);
        if let Some(stored) = row.total_price
            && !money::amounts_match(stored, total_price)
        {
            return Err(ClientError::InvalidResponse(format!(
                "order item {} total {} != {} x {}",
                row.id, stored, row.quantity, row.unit_price
            )));
        }

        Ok(OrderItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name.unwrap_or_default(),
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price,
            unit,
            notes: row.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderRow {
    pub id: String,
    /// SERIAL column or preformatted text
    pub order_number: serde_json::Value,
    #[serde(default)]
    pub table_id: Option<String>,
    pub status: String,
    #[serde(default, deserialize_with = "optional_decimal_column")]
    pub total_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub order_items: Option<Vec<OrderItemRow>>,
}

fn format_order_number(value: &serde_json::Value) -> ClientResult<String> {
    match value {
        serde_json::Value::Number(n) => Ok(format!("ORD-{}", n)),
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(ClientError::InvalidResponse(format!(
            "invalid order_number {}",
            other
        ))),
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = ClientError;

    fn try_from(row: OrderRow) -> ClientResult<Self> {
        let status: OrderStatus = parse_enum(&row.status, "status")?;
        let order_number = format_order_number(&row.order_number)?;
        let items = row
            .order_items
            .unwrap_or_default()
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<ClientResult<Vec<_>>>()?;

        let total_amount = money::items_total(&items);
        if let Some(stored) = row.total_amount
            && !money::amounts_match(stored, total_amount)
        {
            tracing::warn!(
                order_id = %row.id,
                stored,
                derived = total_amount,
                "Order total differs from its items, using the derived total"
            );
        }

        Ok(Order {
            id: row.id,
            table_id: row.table_id,
            status,
            items,
            total_amount,
            created_at: row.created_at,
            order_number,
            is_deleted: row.is_deleted.unwrap_or(false),
        })
    }
}

/// Order header insert/patch body
#[derive(Debug, Serialize)]
pub struct OrderHeaderWrite {
    pub table_id: Option<String>,
    pub status: OrderStatus,
    pub total_amount: f64,
}

impl OrderHeaderWrite {
    pub fn from_draft(draft: &OrderDraft) -> Self {
        Self {
            table_id: draft.table_id.clone(),
            status: draft.status,
            total_amount: money::items_total(&draft.items),
        }
    }
}

/// Line insert body; `total_price` is computed by the backend
#[derive(Debug, Serialize)]
pub struct OrderItemWrite {
    pub order_id: String,
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub unit: ProductUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderItemWrite {
    pub fn new(order_id: &str, item: &OrderItem) -> Self {
        Self {
            order_id: order_id.to_string(),
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            unit: item.unit,
            notes: item.notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_row_accepts_text_numerics() {
        let row: ProductRow = serde_json::from_value(json!({
            "id": "p1",
            "name": "Pistachio",
            "price": "650.00",
            "unit": "kg",
            "product_type": "retail",
            "category": "nuts",
            "stock": "12.500"
        }))
        .unwrap();
        let product = Product::try_from(row).unwrap();
        assert_eq!(product.price, 650.0);
        assert_eq!(product.stock, Some(12.5));
        assert_eq!(product.category, ProductCategory::Nuts);
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        let row: ProductRow = serde_json::from_value(json!({
            "id": "p1", "name": "Mystery", "price": 1, "unit": "litre"
        }))
        .unwrap();
        assert!(matches!(
            Product::try_from(row),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_table_row_defaults_and_drops_dangling_order() {
        let row: TableRow = serde_json::from_value(json!({
            "id": "t1", "name": "Table 1", "status": "available", "current_order_id": "o9"
        }))
        .unwrap();
        let table = DiningTable::try_from(row).unwrap();
        assert!(table.current_order_id.is_none());
        assert!(!table.needs_service);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_order_row_hydrates_items_and_total() {
        let row: OrderRow = serde_json::from_value(json!({
            "id": "o1",
            "order_number": 1042,
            "table_id": "t3",
            "status": "pending",
            "total_amount": "192.50",
            "created_at": "2026-03-14T10:00:00Z",
            "order_items": [
                {"id": "i1", "product_id": "p1", "product_name": "Pistachio",
                 "quantity": "0.250", "unit_price": "650.00", "total_price": "162.50", "unit": "kg"},
                {"id": "i2", "product_id": "p5", "product_name": "Tea",
                 "quantity": 2, "unit_price": 15, "unit": "qty"}
            ]
        }))
        .unwrap();
        let order = Order::try_from(row).unwrap();
        assert_eq!(order.order_number, "ORD-1042");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_amount, 192.5);
        assert!(!order.is_deleted);
    }

    #[test]
    fn test_item_total_mismatch_is_rejected() {
        let row: OrderItemRow = serde_json::from_value(json!({
            "id": "i1", "quantity": 2, "unit_price": 15, "total_price": 45, "unit": "qty"
        }))
        .unwrap();
        assert!(matches!(
            OrderItem::try_from(row),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_release_write_clears_order_reference() {
        let upsert = DiningTableUpsert::rename("t1", "Patio").with_status(TableStatus::Available);
        let write = TableWrite::from(upsert);
        let body = serde_json::to_value(&write).unwrap();
        assert_eq!(body["current_order_id"], serde_json::Value::Null);
        assert_eq!(body["status"], "available");
    }
}
