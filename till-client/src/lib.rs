//! Till Client - point-of-sale core for a small café
//!
//! Builds orders for tables and quick sales, keeps them consistent with
//! the backend and other terminals, and settles payments.

pub mod cart;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod logger;
pub mod management;
pub mod money;
pub mod public_menu;
pub mod service_alert;
pub mod session;
pub mod settlement;

pub use cart::Cart;
pub use catalog::CatalogStore;
pub use config::{ClientConfig, GatewayKind};
pub use controller::{PaymentProgress, RealtimeHandle, RemoteMerge, TillController};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use gateway::{Gateway, MemoryGateway, RestGateway};
pub use public_menu::{CallStatus, PublicMenu};
pub use service_alert::{AlertSink, BellAlert, ServiceCallDetector};
pub use session::{AppState, LiveState, SessionPhase, SessionTarget, View};
pub use settlement::{PaymentOutcome, Settlement, SettlementPhase};

// Re-export shared types for convenience
pub use shared::message::{ChangeAction, ChangeNotification, ChangeResource};
pub use shared::models::{
    DiningTable, DiningTableUpsert, Order, OrderDraft, OrderItem, OrderStatus, PaymentMethod,
    Product, ProductCategory, ProductUnit, ProductUpsert, TableStatus,
};
