//! Application state
//!
//! [`AppState`] is the single explicit state object for one till: the
//! current view, the active table session, its order draft and cart, and
//! the save/settlement flags. It lives behind [`LiveState`] so background
//! tasks always read the latest values instead of a captured copy.

use std::sync::Arc;

use parking_lot::Mutex;
use shared::models::{Order, OrderDraft};

use crate::cart::Cart;
use crate::settlement::Settlement;

/// Top-level till screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Tables,
    Pos,
    Orders,
    Management,
}

/// What the active session is selling to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    Table(String),
    /// Walk-up sale not bound to any table
    QuickSale,
}

impl SessionTarget {
    pub fn from_table_id(table_id: Option<&str>) -> Self {
        match table_id {
            Some(id) => SessionTarget::Table(id.to_string()),
            None => SessionTarget::QuickSale,
        }
    }

    pub fn table_id(&self) -> Option<&str> {
        match self {
            SessionTarget::Table(id) => Some(id),
            SessionTarget::QuickSale => None,
        }
    }
}

/// Session lifecycle
///
/// ```text
/// NoSession -> Browsing -> Editing -> Saving -> Browsing (ok)
///                                           \-> Editing  (failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    NoSession,
    /// Cart matches the last loaded/saved order
    Browsing,
    /// Cart diverges from the last saved order
    Editing,
    /// Save in flight
    Saving,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub view: View,
    pub session: Option<SessionTarget>,
    pub order: OrderDraft,
    pub cart: Cart,
    pub phase: SessionPhase,
    /// Busy flag, set for the whole duration of a save
    pub saving: bool,
    pub settlement: Option<Settlement>,
    /// Bumped whenever the order draft is replaced
    pub order_epoch: u64,
    /// Order history for the current day
    pub daily_orders: Vec<Order>,
}

impl AppState {
    pub fn active_table_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(SessionTarget::table_id)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Open a session on `order`, hydrating the cart from its items
    pub fn start_session(&mut self, target: SessionTarget, order: OrderDraft) {
        self.cart = Cart::from_items(order.items.clone());
        self.order = order;
        self.order_epoch += 1;
        self.session = Some(target);
        self.phase = SessionPhase::Browsing;
        self.settlement = None;
        self.view = View::Pos;
    }

    /// Replace order and cart with a persisted version
    ///
    /// An open settlement for the same order follows the new total; one
    /// for a different order is dropped.
    pub fn adopt_order(&mut self, order: Order) {
        if let Some(settlement) = self.settlement.as_mut() {
            if settlement.order_id() == order.id {
                settlement.set_total(order.total_amount);
            } else {
                tracing::warn!(
                    previous = settlement.order_id(),
                    order_id = %order.id,
                    collected = settlement.collected(),
                    "Order replaced during payment, settlement dropped"
                );
                self.settlement = None;
            }
        }
        self.cart = Cart::from_items(order.items.clone());
        self.order = OrderDraft::from(order);
        self.order_epoch += 1;
        if self.phase != SessionPhase::Saving {
            self.phase = SessionPhase::Browsing;
        }
    }

    /// Empty pending shell for the same target
    pub fn reset_to_empty_order(&mut self) {
        let table_id = self.active_table_id().map(str::to_string);
        self.order = OrderDraft::for_table(table_id);
        self.order_epoch += 1;
        self.cart.clear();
        self.settlement = None;
        if self.phase != SessionPhase::Saving {
            self.phase = SessionPhase::Browsing;
        }
    }

    /// Drop the session and return to table selection
    pub fn end_session(&mut self) {
        self.session = None;
        self.order = OrderDraft::default();
        self.order_epoch += 1;
        self.cart.clear();
        self.phase = SessionPhase::NoSession;
        self.settlement = None;
        self.view = View::Tables;
    }

    /// Record a local cart edit
    pub fn mark_edited(&mut self) {
        if self.phase == SessionPhase::Browsing {
            self.phase = SessionPhase::Editing;
        }
    }
}

/// Shared handle to the live [`AppState`]
///
/// The lock is only taken inside the closures passed to [`LiveState::read`]
/// and [`LiveState::update`], which keeps it from ever spanning an await.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    inner: Arc<Mutex<AppState>>,
}

impl LiveState {
    pub fn new(state: AppState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Cloned copy of the current state
    pub fn snapshot(&self) -> AppState {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::models::{OrderItem, OrderStatus, ProductUnit};

    fn persisted(table_id: &str) -> Order {
        Order {
            id: "o1".to_string(),
            table_id: Some(table_id.to_string()),
            status: OrderStatus::Pending,
            items: vec![OrderItem {
                id: "i1".to_string(),
                product_id: Some("p5".to_string()),
                product_name: "Tea".to_string(),
                quantity: 2.0,
                unit_price: 15.0,
                total_price: 30.0,
                unit: ProductUnit::Qty,
                notes: None,
            }],
            total_amount: 30.0,
            created_at: Utc::now(),
            order_number: "ORD-1001".to_string(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_start_session_hydrates_cart() {
        let mut state = AppState::default();
        let order = OrderDraft::from(persisted("t1"));
        state.start_session(SessionTarget::Table("t1".to_string()), order);
        assert_eq!(state.phase, SessionPhase::Browsing);
        assert_eq!(state.view, View::Pos);
        assert_eq!(state.cart.len(), 1);
        assert_eq!(state.active_table_id(), Some("t1"));
    }

    #[test]
    fn test_reset_keeps_table() {
        let mut state = AppState::default();
        state.start_session(
            SessionTarget::Table("t1".to_string()),
            OrderDraft::from(persisted("t1")),
        );
        state.reset_to_empty_order();
        assert!(state.cart.is_empty());
        assert!(!state.order.is_persisted());
        assert_eq!(state.order.table_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_adopt_updates_open_settlement() {
        let mut state = AppState::default();
        state.start_session(
            SessionTarget::Table("t1".to_string()),
            OrderDraft::from(persisted("t1")),
        );
        state.settlement = Some(Settlement::new("o1", 30.0));
        let epoch = state.order_epoch;

        let mut grown = persisted("t1");
        grown.total_amount = 90.0;
        state.adopt_order(grown);
        assert_eq!(state.settlement.as_ref().unwrap().total(), 90.0);
        assert!(state.order_epoch > epoch);

        let mut other = persisted("t1");
        other.id = "o2".to_string();
        state.adopt_order(other);
        assert!(state.settlement.is_none());
    }

    #[test]
    fn test_edit_only_moves_from_browsing() {
        let mut state = AppState::default();
        state.mark_edited();
        assert_eq!(state.phase, SessionPhase::NoSession);
        state.start_session(SessionTarget::QuickSale, OrderDraft::for_table(None));
        state.mark_edited();
        assert_eq!(state.phase, SessionPhase::Editing);
    }

    #[test]
    fn test_live_state_shares_updates() {
        let live = LiveState::default();
        let other = live.clone();
        other.update(|s| s.view = View::Orders);
        assert_eq!(live.read(|s| s.view), View::Orders);
    }
}
