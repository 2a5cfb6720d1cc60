//! Shared types for the till
//!
//! Domain models and change notification types used by the till core
//! and every backend gateway.

pub mod message;
pub mod models;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use message::{ChangeAction, ChangeNotification, ChangeResource};
