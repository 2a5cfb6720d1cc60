#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use till_client::{
    AlertSink, ChangeNotification, ClientConfig, ClientResult, DiningTable, DiningTableUpsert,
    Gateway, MemoryGateway, Order, OrderDraft, Product, ProductUpsert, TableStatus,
    TillController,
};
use tokio::sync::broadcast;

pub const PISTACHIO: &str = "p1";
pub const TEA: &str = "p5";
pub const COFFEE: &str = "p6";

/// Seeded in-memory backend plus one terminal with its catalog loaded
pub async fn setup() -> (Arc<MemoryGateway>, TillController) {
    setup_with(MemoryGateway::seeded(), ClientConfig::memory()).await
}

pub async fn setup_with(
    gateway: MemoryGateway,
    config: ClientConfig,
) -> (Arc<MemoryGateway>, TillController) {
    let gateway = Arc::new(gateway);
    let till = terminal(&gateway, &config).await;
    (gateway, till)
}

/// Another terminal on the same backend
pub async fn terminal(gateway: &Arc<MemoryGateway>, config: &ClientConfig) -> TillController {
    let till = TillController::new(gateway.clone(), config);
    till.refresh_catalog().await.unwrap();
    till
}

/// 250 g pistachio plus two teas, total 192.50
pub async fn build_example_cart(till: &TillController, table_id: Option<&str>) {
    till.open_table(table_id).await.unwrap();
    till.add_weighed(PISTACHIO, 250.0).unwrap();
    till.add_product(TEA, 1.0).unwrap();
    till.add_product(TEA, 1.0).unwrap();
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[derive(Default)]
pub struct CountingAlert {
    fired: AtomicUsize,
}

impl CountingAlert {
    pub fn count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

impl AlertSink for CountingAlert {
    fn service_requested(&self, _table: &DiningTable) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend whose active-order listing is read at once but answered late
///
/// Lets a save commit between the read and the moment the caller sees it.
pub struct LateActiveOrders {
    pub inner: Arc<MemoryGateway>,
    pub delay: Duration,
}

#[async_trait]
impl Gateway for LateActiveOrders {
    async fn list_products(&self) -> ClientResult<Vec<Product>> {
        self.inner.list_products().await
    }

    async fn upsert_product(&self, product: ProductUpsert) -> ClientResult<Product> {
        self.inner.upsert_product(product).await
    }

    async fn delete_product(&self, id: &str) -> ClientResult<()> {
        self.inner.delete_product(id).await
    }

    async fn list_tables(&self) -> ClientResult<Vec<DiningTable>> {
        self.inner.list_tables().await
    }

    async fn upsert_table(&self, table: DiningTableUpsert) -> ClientResult<DiningTable> {
        self.inner.upsert_table(table).await
    }

    async fn delete_table(&self, id: &str) -> ClientResult<()> {
        self.inner.delete_table(id).await
    }

    async fn set_table_service_flag(&self, id: &str, needs_service: bool) -> ClientResult<()> {
        self.inner.set_table_service_flag(id, needs_service).await
    }

    async fn set_table_occupancy(
        &self,
        id: &str,
        status: TableStatus,
        order_id: Option<&str>,
    ) -> ClientResult<()> {
        self.inner.set_table_occupancy(id, status, order_id).await
    }

    async fn list_active_orders(&self) -> ClientResult<Vec<Order>> {
        let orders = self.inner.list_active_orders().await;
        tokio::time::sleep(self.delay).await;
        orders
    }

    async fn list_orders_for_day(&self, day: NaiveDate) -> ClientResult<Vec<Order>> {
        self.inner.list_orders_for_day(day).await
    }

    async fn upsert_order(&self, draft: OrderDraft) -> ClientResult<Order> {
        self.inner.upsert_order(draft).await
    }

    async fn close_order(&self, id: &str) -> ClientResult<Order> {
        self.inner.close_order(id).await
    }

    async fn set_order_deleted(&self, id: &str, deleted: bool) -> ClientResult<()> {
        self.inner.set_order_deleted(id, deleted).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.inner.subscribe()
    }
}
