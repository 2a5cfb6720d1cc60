//! Change notification types
//!
//! Emitted by a backend gateway whenever a row in a watched collection
//! changes. Subscribers treat them as "something changed" signals and
//! re-fetch; the optional id only narrows what to look at.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Watched collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeResource {
    Orders,
    Tables,
    Products,
}

impl ChangeResource {
    /// Backend collection name
    pub fn table_name(self) -> &'static str {
        match self {
            ChangeResource::Orders => "orders",
            ChangeResource::Tables => "tables",
            ChangeResource::Products => "products",
        }
    }
}

impl fmt::Display for ChangeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Insert => write!(f, "insert"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

/// Change signal payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub resource: ChangeResource,
    pub action: ChangeAction,
    /// Changed row id, when the backend knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChangeNotification {
    pub fn new(resource: ChangeResource, action: ChangeAction, id: impl Into<String>) -> Self {
        Self {
            resource,
            action,
            id: Some(id.into()),
        }
    }

    /// Collection-level signal without a row id
    pub fn collection(resource: ChangeResource) -> Self {
        Self {
            resource,
            action: ChangeAction::Update,
            id: None,
        }
    }

    pub fn touches(&self, resource: ChangeResource) -> bool {
        self.resource == resource
    }
}
