//! Public menu
//!
//! Read-only customer view of the catalog for one table, plus the
//! waiter-call button that raises the table's service flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shared::models::{DiningTable, Product, ProductCategory};

use crate::catalog::sort_products;
use crate::gateway::Gateway;
use crate::{ClientError, ClientResult};

/// How long the "called" confirmation stays before the button re-arms
pub const CALLED_CONFIRMATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Idle,
    /// Request in flight
    Calling,
    /// Staff notified
    Called,
}

#[derive(Debug, Clone, Copy)]
enum CallState {
    Idle,
    Calling,
    Called { at: Instant },
}

pub struct PublicMenu {
    gateway: Arc<dyn Gateway>,
    products: Vec<Product>,
    table: Option<DiningTable>,
    category: Option<ProductCategory>,
    call: Mutex<CallState>,
}

impl PublicMenu {
    /// Fetch the catalog and resolve `table_id`
    ///
    /// An id that matches no table still loads the menu; only the
    /// waiter call is unavailable then.
    pub async fn load(gateway: Arc<dyn Gateway>, table_id: Option<&str>) -> ClientResult<Self> {
        let (products, tables) = tokio::join!(gateway.list_products(), gateway.list_tables());
        let mut products = products?;
        sort_products(&mut products);

        let table = match table_id {
            Some(id) => {
                let table = tables?.into_iter().find(|t| t.id == id);
                if table.is_none() {
                    tracing::warn!(table_id = id, "Public menu opened for unknown table");
                }
                table
            }
            None => None,
        };

        Ok(Self {
            gateway,
            products,
            table,
            category: None,
            call: Mutex::new(CallState::Idle),
        })
    }

    pub fn table(&self) -> Option<&DiningTable> {
        self.table.as_ref()
    }

    /// Restrict the listing to one category (`None` for all)
    pub fn filter(&mut self, category: Option<ProductCategory>) {
        self.category = category;
    }

    pub fn category(&self) -> Option<ProductCategory> {
        self.category
    }

    pub fn visible_products(&self) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|p| self.category.is_none_or(|c| p.category == c))
            .collect()
    }

    pub fn call_status(&self) -> CallStatus {
        self.status_at(Instant::now())
    }

    /// Ask staff to come to the table
    ///
    /// Pressing again while a call is in flight or still confirmed does
    /// nothing. A failed call re-arms the button.
    pub async fn call_waiter(&self) -> ClientResult<CallStatus> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| ClientError::Validation("menu is not bound to a table".to_string()))?;

        {
            let mut call = self.call.lock();
            let current = Self::resolve(*call, Instant::now());
            if current != CallStatus::Idle {
                return Ok(current);
            }
            *call = CallState::Calling;
        }

        match self.gateway.set_table_service_flag(&table.id, true).await {
            Ok(()) => {
                *self.call.lock() = CallState::Called { at: Instant::now() };
                tracing::info!(table_id = %table.id, "Waiter call sent");
                Ok(CallStatus::Called)
            }
            Err(e) => {
                *self.call.lock() = CallState::Idle;
                tracing::warn!(table_id = %table.id, error = %e, "Waiter call failed");
                Err(e)
            }
        }
    }

    fn status_at(&self, now: Instant) -> CallStatus {
        Self::resolve(*self.call.lock(), now)
    }

    fn resolve(state: CallState, now: Instant) -> CallStatus {
        match state {
            CallState::Idle => CallStatus::Idle,
            CallState::Calling => CallStatus::Calling,
            CallState::Called { at } if now.duration_since(at) < CALLED_CONFIRMATION => {
                CallStatus::Called
            }
            CallState::Called { .. } => CallStatus::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn test_menu_sorted_and_filtered() {
        let gateway = Arc::new(MemoryGateway::seeded());
        let mut menu = PublicMenu::load(gateway, Some("t1")).await.unwrap();
        let orders: Vec<Option<i32>> = menu.visible_products().iter().map(|p| p.sort_order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);

        menu.filter(Some(ProductCategory::Drinks));
        assert!(!menu.visible_products().is_empty());
        assert!(
            menu.visible_products()
                .iter()
                .all(|p| p.category == ProductCategory::Drinks)
        );
    }

    #[tokio::test]
    async fn test_called_expires() {
        let gateway = Arc::new(MemoryGateway::seeded());
        let menu = PublicMenu::load(gateway, Some("t1")).await.unwrap();
        assert_eq!(menu.call_waiter().await.unwrap(), CallStatus::Called);
        let later = Instant::now() + CALLED_CONFIRMATION;
        assert_eq!(menu.status_at(later), CallStatus::Idle);
    }

    #[tokio::test]
    async fn test_unknown_table_cannot_call() {
        let gateway = Arc::new(MemoryGateway::seeded());
        let menu = PublicMenu::load(gateway.clone(), Some("t99")).await.unwrap();
        assert!(menu.table().is_none());
        let writes = gateway.total_writes();
        assert!(matches!(menu.call_waiter().await, Err(ClientError::Validation(_))));
        assert_eq!(gateway.total_writes(), writes);
    }
}
