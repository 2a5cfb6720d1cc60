//! Dining Table Model

use serde::{Deserialize, Serialize};

/// Table occupancy status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    #[default]
    Available,
    Occupied,
    Reserved,
}

/// Dining table entity
///
/// `current_order_id` is only ever set together with `status = occupied`;
/// use [`DiningTable::occupy`] / [`DiningTable::release`] to change both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiningTable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: TableStatus,
    #[serde(default)]
    pub current_order_id: Option<String>,
    /// Waiter-call flag raised from the public menu
    #[serde(default)]
    pub needs_service: bool,
}

impl DiningTable {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TableStatus::Available,
            current_order_id: None,
            needs_service: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status == TableStatus::Occupied
    }

    /// Bind an open order to this table
    pub fn occupy(&mut self, order_id: impl Into<String>) {
        self.status = TableStatus::Occupied;
        self.current_order_id = Some(order_id.into());
    }

    /// Free the table, dropping its order reference
    pub fn release(&mut self) {
        self.status = TableStatus::Available;
        self.current_order_id = None;
    }

    /// `current_order_id` implies `occupied`
    pub fn is_consistent(&self) -> bool {
        self.current_order_id.is_none() || self.status == TableStatus::Occupied
    }
}

/// Create/update dining table payload (`id: None` creates)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DiningTableUpsert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TableStatus>,
}

impl DiningTableUpsert {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            status: None,
        }
    }

    pub fn rename(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: TableStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_and_release() {
        let mut table = DiningTable::new("t1", "Table 1");
        table.occupy("o1");
        assert!(table.is_occupied());
        assert_eq!(table.current_order_id.as_deref(), Some("o1"));
        assert!(table.is_consistent());

        table.release();
        assert_eq!(table.status, TableStatus::Available);
        assert!(table.current_order_id.is_none());
    }

    #[test]
    fn test_missing_flags_default() {
        let table: DiningTable =
            serde_json::from_value(serde_json::json!({"id": "t2", "name": "Table 2"})).unwrap();
        assert!(!table.needs_service);
        assert_eq!(table.status, TableStatus::Available);
    }
}
