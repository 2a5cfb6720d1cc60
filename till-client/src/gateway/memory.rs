//! In-memory gateway
//!
//! Stand-in backend used for demos and tests. Behaves like the real
//! backend where the till can observe it: sequential order numbers, fresh
//! item ids on every save, server-side total recompute and a change
//! notification after every write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use shared::message::{ChangeAction, ChangeNotification, ChangeResource};
use shared::models::{
    DiningTable, DiningTableUpsert, Order, OrderDraft, OrderItem, OrderStatus, Product,
    ProductCategory, ProductKind, ProductUnit, ProductUpsert, TableStatus,
};
use tokio::sync::broadcast;

use super::{CHANGE_CHANNEL_CAPACITY, Gateway, check_occupancy, day_bounds};
use crate::money;
use crate::{ClientError, ClientResult};

const FIRST_ORDER_NUMBER: u32 = 1001;
const DEMO_TABLE_COUNT: usize = 12;

#[derive(Debug, Default)]
struct Store {
    products: Vec<Product>,
    tables: Vec<DiningTable>,
    orders: Vec<Order>,
    next_order_number: u32,
}

#[derive(Debug, Clone, Copy)]
enum WriteTarget {
    Product,
    Table,
    Order,
}

/// In-process backend
pub struct MemoryGateway {
    store: RwLock<Store>,
    events: broadcast::Sender<ChangeNotification>,
    latency: Mutex<Option<Duration>>,
    pending_failures: AtomicUsize,
    calls: AtomicUsize,
    product_writes: AtomicUsize,
    table_writes: AtomicUsize,
    order_writes: AtomicUsize,
}

impl MemoryGateway {
    /// Empty backend
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store: RwLock::new(Store {
                next_order_number: FIRST_ORDER_NUMBER,
                ..Default::default()
            }),
            events,
            latency: Mutex::new(None),
            pending_failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            product_writes: AtomicUsize::new(0),
            table_writes: AtomicUsize::new(0),
            order_writes: AtomicUsize::new(0),
        }
    }

    /// Backend holding the demo café catalog and twelve tables
    pub fn seeded() -> Self {
        let tables = (1..=DEMO_TABLE_COUNT)
            .map(|n| DiningTable::new(format!("t{}", n), format!("Table {}", n)))
            .collect();
        Self::new().with_catalog(demo_products(), tables)
    }

    /// Replace products and tables wholesale
    pub fn with_catalog(self, products: Vec<Product>, tables: Vec<DiningTable>) -> Self {
        {
            let mut store = self.store.write();
            store.products = products;
            store.tables = tables;
        }
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Make the next `count` write calls fail with a backend error
    pub fn fail_next_writes(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    // ========== Inspection ==========

    /// Every gateway call, reads included
    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn order_writes(&self) -> usize {
        self.order_writes.load(Ordering::SeqCst)
    }

    pub fn table_writes(&self) -> usize {
        self.table_writes.load(Ordering::SeqCst)
    }

    pub fn total_writes(&self) -> usize {
        self.product_writes.load(Ordering::SeqCst) + self.table_writes() + self.order_writes()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.store.read().orders.iter().find(|o| o.id == id).cloned()
    }

    pub fn table(&self, id: &str) -> Option<DiningTable> {
        self.store.read().tables.iter().find(|t| t.id == id).cloned()
    }

    /// Edit a table row directly, the way another terminal would
    pub fn update_table_row(&self, id: &str, update: impl FnOnce(&mut DiningTable)) {
        let found = {
            let mut store = self.store.write();
            match store.tables.iter_mut().find(|t| t.id == id) {
                Some(table) => {
                    update(table);
                    true
                }
                None => false,
            }
        };
        if found {
            self.publish(ChangeResource::Tables, ChangeAction::Update, id);
        }
    }

    // ========== Internals ==========

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn begin_write(&self, target: WriteTarget) -> ClientResult<()> {
        let counter = match target {
            WriteTarget::Product => &self.product_writes,
            WriteTarget::Table => &self.table_writes,
            WriteTarget::Order => &self.order_writes,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.enter().await;

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(?target, "Injected write failure");
            return Err(ClientError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }

    fn publish(&self, resource: ChangeResource, action: ChangeAction, id: &str) {
        // No subscribers is fine
        let _ = self
            .events
            .send(ChangeNotification::new(resource, action, id));
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot items with fresh server ids and recomputed totals
fn materialize_items(items: Vec<OrderItem>) -> Vec<OrderItem> {
    items
        .into_iter()
        .map(|item| OrderItem {
            id: uuid::Uuid::new_v4().to_string(),
            total_price: money::line_total(item.quantity, item.unit_price),
            ..item
        })
        .collect()
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_products(&self) -> ClientResult<Vec<Product>> {
        self.enter().await;
        Ok(self.store.read().products.clone())
    }

    async fn upsert_product(&self, product: ProductUpsert) -> ClientResult<Product> {
        self.begin_write(WriteTarget::Product).await?;

        let (saved, action) = {
            let mut store = self.store.write();
            match product.id.clone() {
                Some(id) => {
                    let existing = store
                        .products
                        .iter_mut()
                        .find(|p| p.id == id)
                        .ok_or_else(|| ClientError::NotFound(format!("product {}", id)))?;
                    product.apply_to(existing);
                    (existing.clone(), ChangeAction::Update)
                }
                None => {
                    let created = product
                        .into_product(uuid::Uuid::new_v4().to_string())
                        .ok_or_else(|| {
                            ClientError::Validation(
                                "name, price and unit are required".to_string(),
                            )
                        })?;
                    store.products.push(created.clone());
                    (created, ChangeAction::Insert)
                }
            }
        };

        self.publish(ChangeResource::Products, action, &saved.id);
        Ok(saved)
    }

    async fn delete_product(&self, id: &str) -> ClientResult<()> {
        self.begin_write(WriteTarget::Product).await?;
        self.store.write().products.retain(|p| p.id != id);
        self.publish(ChangeResource::Products, ChangeAction::Delete, id);
        Ok(())
    }

    async fn list_tables(&self) -> ClientResult<Vec<DiningTable>> {
        self.enter().await;
        Ok(self.store.read().tables.clone())
    }

    async fn upsert_table(&self, table: DiningTableUpsert) -> ClientResult<DiningTable> {
        self.begin_write(WriteTarget::Table).await?;

        let (saved, action) = {
            let mut store = self.store.write();
            match table.id {
                Some(id) => {
                    let existing = store
                        .tables
                        .iter_mut()
                        .find(|t| t.id == id)
                        .ok_or_else(|| ClientError::NotFound(format!("table {}", id)))?;
                    if let Some(name) = table.name {
                        existing.name = name;
                    }
                    if let Some(status) = table.status {
                        existing.status = status;
                        if status != TableStatus::Occupied {
                            existing.current_order_id = None;
                        }
                    }
                    (existing.clone(), ChangeAction::Update)
                }
                None => {
                    let name = table
                        .name
                        .ok_or_else(|| ClientError::Validation("name is required".to_string()))?;
                    let mut created = DiningTable::new(uuid::Uuid::new_v4().to_string(), name);
                    if let Some(status) = table.status.filter(|s| *s != TableStatus::Occupied) {
                        created.status = status;
                    }
                    store.tables.push(created.clone());
                    (created, ChangeAction::Insert)
                }
            }
        };

        self.publish(ChangeResource::Tables, action, &saved.id);
        Ok(saved)
    }

    async fn delete_table(&self, id: &str) -> ClientResult<()> {
        self.begin_write(WriteTarget::Table).await?;
        self.store.write().tables.retain(|t| t.id != id);
        self.publish(ChangeResource::Tables, ChangeAction::Delete, id);
        Ok(())
    }

    async fn set_table_service_flag(&self, id: &str, needs_service: bool) -> ClientResult<()> {
        self.begin_write(WriteTarget::Table).await?;
        {
            let mut store = self.store.write();
            let table = store
                .tables
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("table {}", id)))?;
            table.needs_service = needs_service;
        }
        self.publish(ChangeResource::Tables, ChangeAction::Update, id);
        Ok(())
    }

    async fn set_table_occupancy(
        &self,
        id: &str,
        status: TableStatus,
        order_id: Option<&str>,
    ) -> ClientResult<()> {
        check_occupancy(status, order_id)?;
        self.begin_write(WriteTarget::Table).await?;
        {
            let mut store = self.store.write();
            let table = store
                .tables
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("table {}", id)))?;
            match (status, order_id) {
                (TableStatus::Occupied, Some(order_id)) => table.occupy(order_id),
                (TableStatus::Occupied, None) => table.status = TableStatus::Occupied,
                (TableStatus::Available, _) => table.release(),
                (other, _) => {
                    table.status = other;
                    table.current_order_id = None;
                }
            }
        }
        self.publish(ChangeResource::Tables, ChangeAction::Update, id);
        Ok(())
    }

    async fn list_active_orders(&self) -> ClientResult<Vec<Order>> {
        self.enter().await;
        Ok(self
            .store
            .read()
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect())
    }

    async fn list_orders_for_day(&self, day: NaiveDate) -> ClientResult<Vec<Order>> {
        self.enter().await;
        let (start, end) = day_bounds(day);
        let mut orders: Vec<Order> = self
            .store
            .read()
            .orders
            .iter()
            .filter(|o| o.created_at >= start && o.created_at < end)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn upsert_order(&self, draft: OrderDraft) -> ClientResult<Order> {
        self.begin_write(WriteTarget::Order).await?;

        let items = materialize_items(draft.items);
        let total_amount = money::items_total(&items);

        let (order, action, occupied_table) = {
            let mut store = self.store.write();
            match draft.id {
                Some(id) => {
                    let existing = store
                        .orders
                        .iter_mut()
                        .find(|o| o.id == id)
                        .ok_or_else(|| ClientError::NotFound(format!("order {}", id)))?;
                    existing.table_id = draft.table_id;
                    existing.status = draft.status;
                    existing.items = items;
                    existing.total_amount = total_amount;
                    (existing.clone(), ChangeAction::Update, None)
                }
                None => {
                    let number = store.next_order_number;
                    store.next_order_number += 1;
                    let order = Order {
                        id: uuid::Uuid::new_v4().to_string(),
                        table_id: draft.table_id,
                        status: draft.status,
                        items,
                        total_amount,
                        created_at: Utc::now(),
                        order_number: format!("ORD-{}", number),
                        is_deleted: false,
                    };
                    store.orders.push(order.clone());

                    let mut occupied = None;
                    if let Some(table_id) = order.table_id.as_deref()
                        && let Some(table) = store.tables.iter_mut().find(|t| t.id == table_id)
                    {
                        table.occupy(order.id.clone());
                        occupied = Some(table.id.clone());
                    }
                    (order, ChangeAction::Insert, occupied)
                }
            }
        };

        tracing::debug!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = order.items.len(),
            "Order saved"
        );
        self.publish(ChangeResource::Orders, action, &order.id);
        if let Some(table_id) = occupied_table {
            self.publish(ChangeResource::Tables, ChangeAction::Update, &table_id);
        }
        Ok(order)
    }

    async fn close_order(&self, id: &str) -> ClientResult<Order> {
        self.begin_write(WriteTarget::Order).await?;

        let (order, released_table) = {
            let mut store = self.store.write();
            let order = store
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("order {}", id)))?;
            order.status = OrderStatus::Paid;
            let order = order.clone();

            let mut released = None;
            if let Some(table_id) = order.table_id.as_deref()
                && let Some(table) = store.tables.iter_mut().find(|t| t.id == table_id)
            {
                table.release();
                released = Some(table.id.clone());
            }
            (order, released)
        };

        self.publish(ChangeResource::Orders, ChangeAction::Update, id);
        if let Some(table_id) = released_table {
            self.publish(ChangeResource::Tables, ChangeAction::Update, &table_id);
        }
        Ok(order)
    }

    async fn set_order_deleted(&self, id: &str, deleted: bool) -> ClientResult<()> {
        self.begin_write(WriteTarget::Order).await?;
        {
            let mut store = self.store.write();
            let order = store
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("order {}", id)))?;
            order.is_deleted = deleted;
        }
        self.publish(ChangeResource::Orders, ChangeAction::Update, id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.events.subscribe()
    }
}

/// Demo café catalog: nuts, dried fruit and lokum by weight, drinks by count
fn demo_products() -> Vec<Product> {
    let entries: [(&str, f64, ProductUnit, ProductCategory); 9] = [
        ("Pistachio", 650.0, ProductUnit::Kg, ProductCategory::Nuts),
        ("Cashew", 600.0, ProductUnit::Kg, ProductCategory::Nuts),
        ("Deluxe Mix", 750.0, ProductUnit::Kg, ProductCategory::Nuts),
        ("Raisins", 200.0, ProductUnit::Kg, ProductCategory::DriedFruit),
        ("Tea", 15.0, ProductUnit::Qty, ProductCategory::Drinks),
        ("Turkish Coffee", 60.0, ProductUnit::Qty, ProductCategory::Drinks),
        ("Water (0.5L)", 15.0, ProductUnit::Qty, ProductCategory::Drinks),
        ("Soda", 20.0, ProductUnit::Qty, ProductCategory::Drinks),
        ("Rose Lokum", 400.0, ProductUnit::Kg, ProductCategory::Dessert),
    ];

    entries
        .into_iter()
        .enumerate()
        .map(|(i, (name, price, unit, category))| Product {
            id: format!("p{}", i + 1),
            name: name.to_string(),
            price,
            unit,
            kind: if unit.is_weighed() {
                ProductKind::Retail
            } else {
                ProductKind::Service
            },
            category,
            image: None,
            stock: None,
            sort_order: Some(i as i32 + 1),
        })
        .collect()
}
