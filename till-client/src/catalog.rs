//! Catalog Store - in-memory products and tables
//!
//! Pure data refreshed from the gateway. Lists are replaced wholesale on
//! every successful fetch; a failed fetch leaves them untouched.

use std::cmp::Ordering;

use parking_lot::RwLock;
use shared::models::{DiningTable, Product, ProductCategory};

// =============================================================================
// Catalog order
// =============================================================================

/// `sort_order` ascending with missing values last, then by name
pub fn compare_products(a: &Product, b: &Product) -> Ordering {
    match (a.sort_order, b.sort_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_products(products: &mut [Product]) {
    products.sort_by(compare_products);
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
pub struct CatalogStore {
    products: RwLock<Vec<Product>>,
    tables: RwLock<Vec<DiningTable>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all products, keeping catalog order
    pub fn replace_products(&self, mut products: Vec<Product>) {
        sort_products(&mut products);
        *self.products.write() = products;
    }

    /// Replace all tables, returning the previous list
    pub fn replace_tables(&self, tables: Vec<DiningTable>) -> Vec<DiningTable> {
        std::mem::replace(&mut *self.tables.write(), tables)
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.read().clone()
    }

    /// Products of one category (`None` for all)
    pub fn products_in(&self, category: Option<ProductCategory>) -> Vec<Product> {
        self.products
            .read()
            .iter()
            .filter(|p| category.is_none_or(|c| p.category == c))
            .cloned()
            .collect()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.products.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn tables(&self) -> Vec<DiningTable> {
        self.tables.read().clone()
    }

    pub fn table(&self, id: &str) -> Option<DiningTable> {
        self.tables.read().iter().find(|t| t.id == id).cloned()
    }

    /// Local occupancy update after a successful save
    pub fn mark_occupied(&self, table_id: &str, order_id: &str) {
        if let Some(table) = self.tables.write().iter_mut().find(|t| t.id == table_id) {
            table.occupy(order_id);
        }
    }

    pub fn mark_available(&self, table_id: &str) {
        if let Some(table) = self.tables.write().iter_mut().find(|t| t.id == table_id) {
            table.release();
        }
    }

    pub fn set_service_flag(&self, table_id: &str, needs_service: bool) {
        if let Some(table) = self.tables.write().iter_mut().find(|t| t.id == table_id) {
            table.needs_service = needs_service;
        }
    }
}
