//! Order Reconciliation Controller
//!
//! Keeps the cart, the persisted order and table occupancy consistent
//! across local edits, explicit saves and remote change notifications.
//!
//! # Conflict policy
//!
//! Saves replace the whole item list of an order. A remote notification
//! that finds a persisted order for the active table overwrites the local
//! cart unconditionally, so an unsaved edit can be lost when another
//! terminal saves the same table first. There is no merge and no warning;
//! the last full fetch wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use shared::message::{ChangeNotification, ChangeResource};
use shared::models::{Order, OrderDraft, OrderItem, PaymentMethod, Product, TableStatus};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cart::Cart;
use crate::catalog::CatalogStore;
use crate::config::ClientConfig;
use crate::gateway::Gateway;
use crate::service_alert::{AlertSink, BellAlert, ServiceCallDetector};
use crate::session::{AppState, LiveState, SessionPhase, SessionTarget, View};
use crate::settlement::{PaymentOutcome, Settlement};
use crate::{ClientError, ClientResult};

/// Where a settlement stands after a payment entry
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentProgress {
    /// Balance still open
    Pending { remaining: f64 },
    /// Order closed and table released
    Settled { order: Order, change: f64 },
}

/// What a remote change did to the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMerge {
    /// No table session, or only the catalog changed
    Skipped,
    /// Local order and cart replaced by the fetched version
    Overwritten,
    /// Known order vanished remotely, session reset to an empty shell
    Reset,
    /// No persisted order yet, local cart left alone
    Unchanged,
}

#[derive(Clone)]
pub struct TillController {
    gateway: Arc<dyn Gateway>,
    catalog: Arc<CatalogStore>,
    state: LiveState,
    detector: Arc<Mutex<ServiceCallDetector>>,
    alerts: Arc<dyn AlertSink>,
    request_timeout: Duration,
}

impl TillController {
    pub fn new(gateway: Arc<dyn Gateway>, config: &ClientConfig) -> Self {
        Self {
            gateway,
            catalog: Arc::new(CatalogStore::new()),
            state: LiveState::default(),
            detector: Arc::new(Mutex::new(ServiceCallDetector::new())),
            alerts: Arc::new(BellAlert),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn snapshot(&self) -> AppState {
        self.state.snapshot()
    }

    // ========== Catalog ==========

    /// Re-fetch products and tables concurrently
    ///
    /// Each list is only replaced when its own fetch succeeded. The first
    /// failure is returned after both results are applied.
    pub async fn refresh_catalog(&self) -> ClientResult<()> {
        let (products, tables) =
            tokio::join!(self.gateway.list_products(), self.gateway.list_tables());

        let mut failure = None;
        match products {
            Ok(products) => self.catalog.replace_products(products),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh products, keeping previous list");
                failure = Some(e);
            }
        }
        match tables {
            Ok(tables) => {
                let newly_flagged = self.detector.lock().observe(&tables);
                let previous = self.catalog.replace_tables(tables);
                tracing::debug!(previous = previous.len(), "Tables refreshed");
                for table in &newly_flagged {
                    self.alerts.service_requested(table);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh tables, keeping previous list");
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========== Views ==========

    pub async fn set_view(&self, view: View) -> ClientResult<()> {
        self.state.update(|s| s.view = view);
        if view == View::Orders {
            self.load_daily_orders().await?;
        }
        Ok(())
    }

    /// Load today's order history; the previous list survives a failure
    pub async fn load_daily_orders(&self) -> ClientResult<Vec<Order>> {
        let today = Local::now().date_naive();
        match self.gateway.list_orders_for_day(today).await {
            Ok(orders) => {
                self.state.update(|s| s.daily_orders = orders.clone());
                Ok(orders)
            }
            Err(e) => {
                tracing::warn!(error = %e, %today, "Failed to load daily orders");
                Err(e)
            }
        }
    }

    pub fn daily_orders(&self) -> Vec<Order> {
        self.state.read(|s| s.daily_orders.clone())
    }

    /// Soft delete or restore an order in the history view
    pub async fn toggle_order_deleted(&self, order_id: &str, deleted: bool) -> ClientResult<()> {
        self.gateway
            .set_order_deleted(order_id, deleted)
            .await
            .inspect_err(|e| tracing::error!(order_id, error = %e, "Failed to toggle order"))?;
        self.state.update(|s| {
            if let Some(order) = s.daily_orders.iter_mut().find(|o| o.id == order_id) {
                order.is_deleted = deleted;
            }
        });
        Ok(())
    }

    // ========== Session ==========

    /// Open a table session, or a quick sale with `None`
    ///
    /// A table with an open order hydrates the cart from it; otherwise the
    /// session starts from an empty pending shell. If the active orders
    /// cannot be fetched no session is opened.
    pub async fn open_table(&self, table_id: Option<&str>) -> ClientResult<()> {
        if self.state.read(|s| s.saving) {
            return Err(ClientError::Busy);
        }

        let target = SessionTarget::from_table_id(table_id);
        let draft = match table_id {
            Some(table_id) => {
                let orders = self.gateway.list_active_orders().await.inspect_err(|e| {
                    tracing::warn!(table_id, error = %e, "Failed to load active orders");
                })?;
                match self.find_table_order(orders, table_id) {
                    Some(order) => OrderDraft::from(order),
                    None => OrderDraft::for_table(Some(table_id.to_string())),
                }
            }
            None => OrderDraft::for_table(None),
        };

        tracing::info!(
            table_id = table_id.unwrap_or("quick-sale"),
            order_id = draft.id.as_deref().unwrap_or("new"),
            items = draft.items.len(),
            "Session opened"
        );
        self.state.update(|s| {
            if s.saving {
                return Err(ClientError::Busy);
            }
            s.start_session(target, draft);
            Ok(())
        })
    }

    /// Discard the local cart and return to table selection
    pub fn leave_session(&self) -> ClientResult<()> {
        self.state.update(|s| {
            if s.saving {
                return Err(ClientError::Busy);
            }
            if s.settlement.as_ref().is_some_and(|st| !st.payments().is_empty()) {
                tracing::warn!(
                    order_id = s.order.id.as_deref().unwrap_or_default(),
                    "Leaving session with collected payments"
                );
            }
            s.end_session();
            Ok(())
        })
    }

    /// Staff acknowledgement of a waiter call
    pub async fn clear_service_flag(&self, table_id: &str) -> ClientResult<()> {
        self.gateway
            .set_table_service_flag(table_id, false)
            .await
            .inspect_err(|e| tracing::warn!(table_id, error = %e, "Failed to clear service flag"))?;
        self.catalog.set_service_flag(table_id, false);
        Ok(())
    }

    // ========== Cart ==========

    pub fn add_product(&self, product_id: &str, quantity: f64) -> ClientResult<String> {
        let product = self.product(product_id)?;
        self.edit_cart(|cart| cart.add_line(&product, quantity))
    }

    /// Add a weighed portion from a scale reading in grams
    pub fn add_weighed(&self, product_id: &str, grams: f64) -> ClientResult<String> {
        let product = self.product(product_id)?;
        self.edit_cart(|cart| cart.add_weighed(&product, grams))
    }

    pub fn add_custom_priced(&self, product_id: &str, price: f64) -> ClientResult<String> {
        let product = self.product(product_id)?;
        if !product.category.accepts_custom_price() {
            return Err(ClientError::Validation(format!(
                "{} has a fixed price",
                product.name
            )));
        }
        self.edit_cart(|cart| cart.add_custom_priced(&product, price))
    }

    pub fn remove_line(&self, line_id: &str) -> ClientResult<()> {
        self.edit_cart(|cart| {
            cart.remove_line(line_id);
            Ok(())
        })
    }

    pub fn decrement_line(&self, product_id: &str) -> ClientResult<()> {
        self.edit_cart(|cart| {
            cart.decrement_line(product_id);
            Ok(())
        })
    }

    pub fn edit_line_quantity(&self, line_id: &str, quantity: f64) -> ClientResult<()> {
        self.edit_cart(|cart| cart.edit_line_quantity(line_id, quantity))
    }

    pub fn cart_lines(&self) -> Vec<OrderItem> {
        self.state.read(|s| s.cart.to_items())
    }

    pub fn cart_total(&self) -> f64 {
        self.state.read(|s| s.cart.total())
    }

    // ========== Save ==========

    /// Persist the whole cart as the order's item list
    ///
    /// At most one save runs per session; a second call while one is in
    /// flight fails with [`ClientError::Busy`] without touching the
    /// gateway. On failure the cart is kept and the session stays in
    /// `Editing`.
    pub async fn save_order(&self) -> ClientResult<Order> {
        let draft = self.state.update(|s| {
            if !s.has_session() {
                return Err(ClientError::NoSession);
            }
            if s.saving {
                return Err(ClientError::Busy);
            }
            if s.cart.is_empty() {
                return Err(ClientError::Validation("cart is empty".to_string()));
            }
            s.saving = true;
            s.phase = SessionPhase::Saving;
            Ok(OrderDraft {
                id: s.order.id.clone(),
                order_number: s.order.order_number.clone(),
                table_id: s.active_table_id().map(str::to_string),
                status: s.order.status,
                items: s.cart.to_items(),
                total_amount: s.cart.total(),
            })
        })?;
        let _saving = ResetOnDrop {
            state: &self.state,
            reset: |s| {
                s.saving = false;
                if s.phase == SessionPhase::Saving {
                    s.phase = SessionPhase::Editing;
                }
            },
        };

        let items = draft.items.len();
        let order = self
            .bounded("save order", self.gateway.upsert_order(draft))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to save order, cart kept"))?;

        self.state.update(|s| {
            s.phase = SessionPhase::Browsing;
            s.adopt_order(order.clone());
        });
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items,
            total = order.total_amount,
            "Order saved"
        );

        if let Some(table_id) = order.table_id.as_deref() {
            self.catalog.mark_occupied(table_id, &order.id);
            if let Err(e) = self
                .gateway
                .set_table_occupancy(table_id, TableStatus::Occupied, Some(&order.id))
                .await
            {
                tracing::warn!(table_id, order_id = %order.id, error = %e, "Failed to mark table occupied");
            }
        }

        Ok(order)
    }

    // ========== Settlement ==========

    /// Start collecting payment for the active order
    ///
    /// An unsaved or edited cart is saved first; payment only opens once
    /// that save succeeded. Re-opening returns the running settlement.
    pub async fn open_payment(&self) -> ClientResult<Settlement> {
        let (running, needs_save) = self.state.read(|s| {
            if !s.has_session() {
                return Err(ClientError::NoSession);
            }
            if s.saving {
                return Err(ClientError::Busy);
            }
            let needs_save = !s.order.is_persisted() || s.phase == SessionPhase::Editing;
            Ok((s.settlement.clone(), needs_save))
        })?;
        if let Some(running) = running {
            return Ok(running);
        }

        if needs_save {
            self.save_order().await?;
        }

        self.state.update(|s| {
            let order_id = s
                .order
                .id
                .clone()
                .ok_or_else(|| ClientError::Validation("order has not been saved".to_string()))?;
            let settlement = Settlement::new(order_id, s.order.total_amount);
            s.settlement = Some(settlement.clone());
            Ok(settlement)
        })
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.state.read(|s| s.settlement.clone())
    }

    pub fn begin_split_payment(&self) -> ClientResult<()> {
        self.with_settlement(Settlement::begin_split)
    }

    /// Abandon payment entry; only allowed before anything was collected
    pub fn cancel_payment(&self) -> ClientResult<()> {
        self.state.update(|s| {
            if s.settlement.as_ref().is_some_and(|st| !st.payments().is_empty()) {
                return Err(ClientError::Validation(
                    "payments were already collected".to_string(),
                ));
            }
            s.settlement = None;
            Ok(())
        })
    }

    /// Collect the whole remaining balance, completing the settlement
    pub async fn collect_full_payment(&self, method: PaymentMethod) -> ClientResult<PaymentProgress> {
        let outcome = self.with_settlement(|st| st.pay_full(method))?;
        self.advance(outcome).await
    }

    /// Collect an operator-typed amount; completes once the total is covered
    pub async fn collect_split_payment(
        &self,
        method: PaymentMethod,
        amount: &str,
    ) -> ClientResult<PaymentProgress> {
        let outcome = self.with_settlement(|st| st.pay_split(method, amount))?;
        self.advance(outcome).await
    }

    /// Close the order once fully paid and end the session
    ///
    /// Closing is claimed once; a failed close keeps the settlement and
    /// the cart so the operator can retry.
    pub async fn complete_settlement(&self) -> ClientResult<Order> {
        let order_id = self.with_settlement(|st| {
            st.begin_close()?;
            Ok(st.order_id().to_string())
        })?;
        let _closing = ResetOnDrop {
            state: &self.state,
            reset: |s| {
                if let Some(settlement) = s.settlement.as_mut() {
                    settlement.abort_close();
                }
            },
        };

        let order = self
            .bounded("close order", self.gateway.close_order(&order_id))
            .await
            .inspect_err(|e| tracing::error!(%order_id, error = %e, "Failed to close order"))?;

        if let Some(table_id) = order.table_id.as_deref() {
            self.catalog.mark_available(table_id);
        }
        self.state.update(|s| {
            if let Some(settlement) = s.settlement.as_mut() {
                settlement.mark_settled();
            }
            s.end_session();
        });
        tracing::info!(
            %order_id,
            order_number = %order.order_number,
            total = order.total_amount,
            "Order settled"
        );
        Ok(order)
    }

    // ========== Realtime ==========

    /// Apply a remote change notification to the live state
    ///
    /// Identifiers are read from the live state when the notification is
    /// processed and checked again before writing, so a session switched,
    /// saved or reloaded during the fetch is never touched. An open
    /// settlement follows the total of the adopted order.
    pub async fn on_remote_change(&self, notification: &ChangeNotification) -> ClientResult<RemoteMerge> {
        tracing::debug!(
            resource = %notification.resource,
            action = %notification.action,
            id = notification.id.as_deref().unwrap_or("*"),
            "Remote change"
        );
        // Failures are logged inside and leave the previous catalog
        let _ = self.refresh_catalog().await;

        if !notification.touches(ChangeResource::Orders) && !notification.touches(ChangeResource::Tables) {
            return Ok(RemoteMerge::Skipped);
        }

        if self.state.read(|s| s.view == View::Orders) {
            let _ = self.load_daily_orders().await;
        }

        // A save in flight publishes its own change once it commits
        let captured = self.state.read(|s| {
            s.active_table_id()
                .filter(|_| !s.saving)
                .map(|table_id| (table_id.to_string(), s.order_epoch))
        });
        let Some((table_id, epoch)) = captured else {
            return Ok(RemoteMerge::Skipped);
        };

        let orders = self.gateway.list_active_orders().await.inspect_err(|e| {
            tracing::warn!(%table_id, error = %e, "Failed to reload active orders");
        })?;
        let found = self.find_table_order(orders, &table_id);

        let merge = self.state.update(|s| {
            // Fetched rows are stale if the order moved on meanwhile
            if s.active_table_id() != Some(table_id.as_str())
                || s.saving
                || s.order_epoch != epoch
            {
                return RemoteMerge::Skipped;
            }
            match found {
                Some(order) => {
                    s.adopt_order(order);
                    RemoteMerge::Overwritten
                }
                None if s.order.is_persisted() => {
                    s.reset_to_empty_order();
                    RemoteMerge::Reset
                }
                None => RemoteMerge::Unchanged,
            }
        });
        tracing::debug!(%table_id, ?merge, "Remote change applied");
        Ok(merge)
    }

    /// Listen for gateway changes until `shutdown` fires or the handle drops
    pub fn spawn_realtime(&self, shutdown: CancellationToken) -> RealtimeHandle {
        let mut rx = self.gateway.subscribe();
        let token = shutdown.child_token();
        let cancelled = token.clone();
        let controller = self.clone();

        let task = tokio::spawn(async move {
            tracing::debug!("Realtime listener started");
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        tracing::debug!("Realtime listener stopped");
                        break;
                    }
                    received = rx.recv() => {
                        match received {
                            Ok(notification) => {
                                let notification = coalesce(&mut rx, notification);
                                if let Err(e) = controller.on_remote_change(&notification).await {
                                    tracing::warn!(error = %e, "Remote change not applied");
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Realtime listener lagged, reloading");
                                let reload = ChangeNotification::collection(ChangeResource::Orders);
                                if let Err(e) = controller.on_remote_change(&reload).await {
                                    tracing::warn!(error = %e, "Remote change not applied");
                                }
                            }
                            Err(RecvError::Closed) => {
                                tracing::info!("Change feed closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        RealtimeHandle {
            token,
            task: Some(task),
        }
    }

    // ========== Internals ==========

    fn product(&self, product_id: &str) -> ClientResult<Product> {
        self.catalog
            .product(product_id)
            .ok_or_else(|| ClientError::NotFound(format!("product {}", product_id)))
    }

    /// Open order for a table, preferring the id the table row points at
    fn find_table_order(&self, orders: Vec<Order>, table_id: &str) -> Option<Order> {
        let bound = self.catalog.table(table_id).and_then(|t| t.current_order_id);
        if let Some(bound) = bound
            && let Some(order) = orders.iter().find(|o| o.id == bound)
        {
            return Some(order.clone());
        }
        orders
            .into_iter()
            .find(|o| o.table_id.as_deref() == Some(table_id))
    }

    fn edit_cart<R>(&self, edit: impl FnOnce(&mut Cart) -> ClientResult<R>) -> ClientResult<R> {
        self.state.update(|s| {
            if !s.has_session() {
                return Err(ClientError::NoSession);
            }
            if s.saving {
                return Err(ClientError::Busy);
            }
            if s.settlement.is_some() {
                return Err(ClientError::Validation(
                    "finish or cancel the payment first".to_string(),
                ));
            }
            let out = edit(&mut s.cart)?;
            s.mark_edited();
            Ok(out)
        })
    }

    fn with_settlement<R>(
        &self,
        f: impl FnOnce(&mut Settlement) -> ClientResult<R>,
    ) -> ClientResult<R> {
        self.state.update(|s| {
            let settlement = s
                .settlement
                .as_mut()
                .ok_or_else(|| ClientError::Validation("no payment in progress".to_string()))?;
            f(settlement)
        })
    }

    async fn advance(&self, outcome: PaymentOutcome) -> ClientResult<PaymentProgress> {
        match outcome {
            PaymentOutcome::Partial { remaining } => Ok(PaymentProgress::Pending { remaining }),
            PaymentOutcome::FullyPaid { change } => {
                let order = self.complete_settlement().await?;
                Ok(PaymentProgress::Settled { order, change })
            }
        }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = ClientResult<T>>,
    ) -> ClientResult<T> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!(
                "{} after {:?}",
                what, self.request_timeout
            ))),
        }
    }
}

/// Merge a burst of queued notifications into one reload
fn coalesce(rx: &mut broadcast::Receiver<ChangeNotification>, first: ChangeNotification) -> ChangeNotification {
    let touches_session =
        |n: &ChangeNotification| n.touches(ChangeResource::Orders) || n.touches(ChangeResource::Tables);
    let mut merged = first;
    while let Ok(next) = rx.try_recv() {
        if !touches_session(&merged) && touches_session(&next) {
            merged = next;
        }
    }
    merged
}

/// Applies `reset` to the live state when dropped
struct ResetOnDrop<'a> {
    state: &'a LiveState,
    reset: fn(&mut AppState),
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.state.update(self.reset);
    }
}

/// Running realtime listener
///
/// Dropping the handle cancels the listener; [`RealtimeHandle::shutdown`]
/// also waits for it to finish.
pub struct RealtimeHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeHandle {
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Realtime listener ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use shared::message::ChangeAction;

    fn controller() -> (Arc<MemoryGateway>, TillController) {
        let gateway = Arc::new(MemoryGateway::seeded());
        let controller = TillController::new(gateway.clone(), &ClientConfig::memory());
        (gateway, controller)
    }

    #[tokio::test]
    async fn test_cart_requires_session() {
        let (_, controller) = controller();
        controller.refresh_catalog().await.unwrap();
        assert!(matches!(
            controller.add_product("p5", 1.0),
            Err(ClientError::NoSession)
        ));
        assert!(matches!(controller.save_order().await, Err(ClientError::NoSession)));
    }

    #[tokio::test]
    async fn test_empty_cart_save_makes_no_call() {
        let (gateway, controller) = controller();
        controller.open_table(Some("t1")).await.unwrap();
        let calls = gateway.total_calls();
        assert!(matches!(controller.save_order().await, Err(ClientError::Validation(_))));
        assert_eq!(gateway.total_calls(), calls);
        assert!(!controller.snapshot().saving);
    }

    #[tokio::test]
    async fn test_edit_moves_to_editing() {
        let (_, controller) = controller();
        controller.refresh_catalog().await.unwrap();
        controller.open_table(Some("t2")).await.unwrap();
        assert_eq!(controller.snapshot().phase, SessionPhase::Browsing);
        controller.add_product("p5", 1.0).unwrap();
        assert_eq!(controller.snapshot().phase, SessionPhase::Editing);
    }

    #[tokio::test]
    async fn test_custom_price_only_for_open_category() {
        let (_, controller) = controller();
        controller.refresh_catalog().await.unwrap();
        controller.open_table(None).await.unwrap();
        assert!(matches!(
            controller.add_custom_priced("p5", 20.0),
            Err(ClientError::Validation(_))
        ));
        assert!(controller.cart_lines().is_empty());
    }

    #[tokio::test]
    async fn test_products_change_skips_session_merge() {
        let (_, controller) = controller();
        let merge = controller
            .on_remote_change(&ChangeNotification::new(
                ChangeResource::Products,
                ChangeAction::Update,
                "p1",
            ))
            .await
            .unwrap();
        assert_eq!(merge, RemoteMerge::Skipped);
        assert!(!controller.catalog().products().is_empty());
    }

    #[tokio::test]
    async fn test_realtime_handle_drop_stops_listener() {
        let (_, controller) = controller();
        let shutdown = CancellationToken::new();
        let handle = controller.spawn_realtime(shutdown.clone());
        assert!(!shutdown.is_cancelled());
        handle.shutdown().await;
        // Parent token stays usable for other listeners
        assert!(!shutdown.is_cancelled());
    }
}
