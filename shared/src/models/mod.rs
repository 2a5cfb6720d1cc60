//! Data models
//!
//! Shared between the till core and every backend implementation.
//! All IDs are `String` (backend-generated UUIDs or short ids).

pub mod dining_table;
pub mod order;
pub mod payment;
pub mod product;

// Re-exports
pub use dining_table::*;
pub use order::*;
pub use payment::*;
pub use product::*;
