//! Backend data gateway
//!
//! One trait, two interchangeable implementations selected once at startup
//! by [`crate::ClientConfig::build_gateway`]:
//! - [`MemoryGateway`]: in-process fake with the demo catalog
//! - [`RestGateway`]: PostgREST-style HTTP backend
//!
//! Order writes use full replacement: the header is upserted, every
//! existing line item is deleted and the current set is re-inserted.

mod memory;
mod rest;
pub mod rows;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use shared::message::ChangeNotification;
use shared::models::{
    DiningTable, DiningTableUpsert, Order, OrderDraft, Product, ProductUpsert, TableStatus,
};
use tokio::sync::broadcast;

use crate::{ClientError, ClientResult};

/// Backend operations used by the till
#[async_trait]
pub trait Gateway: Send + Sync {
    // ========== Products ==========

    async fn list_products(&self) -> ClientResult<Vec<Product>>;

    async fn upsert_product(&self, product: ProductUpsert) -> ClientResult<Product>;

    async fn delete_product(&self, id: &str) -> ClientResult<()>;

    // ========== Tables ==========

    async fn list_tables(&self) -> ClientResult<Vec<DiningTable>>;

    async fn upsert_table(&self, table: DiningTableUpsert) -> ClientResult<DiningTable>;

    async fn delete_table(&self, id: &str) -> ClientResult<()>;

    /// Raise or clear the waiter-call flag
    async fn set_table_service_flag(&self, id: &str, needs_service: bool) -> ClientResult<()>;

    /// Update occupancy and the bound order together
    async fn set_table_occupancy(
        &self,
        id: &str,
        status: TableStatus,
        order_id: Option<&str>,
    ) -> ClientResult<()>;

    // ========== Orders ==========

    /// Orders in pending/preparing/served with items loaded
    async fn list_active_orders(&self) -> ClientResult<Vec<Order>>;

    /// Orders created on `day` (local time), soft-deleted ones included
    async fn list_orders_for_day(&self, day: NaiveDate) -> ClientResult<Vec<Order>>;

    /// Upsert header, replace all items, return the hydrated order
    async fn upsert_order(&self, draft: OrderDraft) -> ClientResult<Order>;

    /// Mark paid and free the bound table
    async fn close_order(&self, id: &str) -> ClientResult<Order>;

    async fn set_order_deleted(&self, id: &str, deleted: bool) -> ClientResult<()>;

    // ========== Change feed ==========

    /// Subscribe to change notifications for orders, tables and products
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification>;
}

/// Capacity of every gateway change channel
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// An order id requires `occupied`; `available` carries no order
pub(crate) fn check_occupancy(status: TableStatus, order_id: Option<&str>) -> ClientResult<()> {
    match (status, order_id) {
        (TableStatus::Occupied, _) => Ok(()),
        (_, None) => Ok(()),
        (other, Some(order_id)) => Err(ClientError::Validation(format!(
            "table cannot reference order {} while {:?}",
            order_id, other
        ))),
    }
}

/// UTC bounds `[start, end)` of a local calendar day
pub(crate) fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(day);
    let end = day
        .succ_opt()
        .map(local_midnight)
        .unwrap_or(start + chrono::Duration::days(1));
    (start, end)
}

fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
