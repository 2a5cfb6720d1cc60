//! Catalog management
//!
//! Product and table maintenance from the management view. Every write
//! is validated locally first and followed by a catalog refresh.

use shared::models::{DiningTable, DiningTableUpsert, Product, ProductUpsert, TableStatus};

use crate::controller::TillController;
use crate::money;
use crate::{ClientError, ClientResult};

fn validate_product(product: &ProductUpsert) -> ClientResult<()> {
    if let Some(name) = &product.name
        && name.trim().is_empty()
    {
        return Err(ClientError::Validation("product name is required".to_string()));
    }
    if let Some(price) = product.price {
        money::validate_price(price, "price")?;
    }
    if let Some(stock) = product.stock {
        money::require_finite(stock, "stock")?;
    }
    if product.id.is_none() {
        if product.name.is_none() || product.price.is_none() {
            return Err(ClientError::Validation("name and price are required".to_string()));
        }
        if product.unit.is_none() {
            return Err(ClientError::Validation("unit is required".to_string()));
        }
    }
    Ok(())
}

fn validate_table(table: &DiningTableUpsert) -> ClientResult<()> {
    if let Some(name) = &table.name
        && name.trim().is_empty()
    {
        return Err(ClientError::Validation("table name is required".to_string()));
    }
    if table.id.is_none() && table.name.is_none() {
        return Err(ClientError::Validation("table name is required".to_string()));
    }
    if table.status == Some(TableStatus::Occupied) {
        return Err(ClientError::Validation(
            "tables become occupied by saving an order".to_string(),
        ));
    }
    Ok(())
}

impl TillController {
    /// Create (`id: None`) or patch a product
    pub async fn save_product(&self, product: ProductUpsert) -> ClientResult<Product> {
        validate_product(&product)?;
        let saved = self
            .gateway()
            .upsert_product(product)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to save product"))?;
        tracing::info!(product_id = %saved.id, name = %saved.name, "Product saved");
        self.refresh_after_write().await;
        Ok(saved)
    }

    pub async fn delete_product(&self, product_id: &str) -> ClientResult<()> {
        self.gateway()
            .delete_product(product_id)
            .await
            .inspect_err(|e| tracing::error!(product_id, error = %e, "Failed to delete product"))?;
        tracing::info!(product_id, "Product deleted");
        self.refresh_after_write().await;
        Ok(())
    }

    /// Create (`id: None`) or rename a table
    pub async fn save_table(&self, table: DiningTableUpsert) -> ClientResult<DiningTable> {
        validate_table(&table)?;
        let saved = self
            .gateway()
            .upsert_table(table)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to save table"))?;
        tracing::info!(table_id = %saved.id, name = %saved.name, "Table saved");
        self.refresh_after_write().await;
        Ok(saved)
    }

    /// Delete a table; an occupied table is refused without a gateway call
    pub async fn delete_table(&self, table_id: &str) -> ClientResult<()> {
        if let Some(table) = self.catalog().table(table_id)
            && table.is_occupied()
        {
            tracing::warn!(table_id, table = %table.name, "Refusing to delete occupied table");
            return Err(ClientError::Conflict(format!(
                "{} is occupied and cannot be deleted",
                table.name
            )));
        }

        self.gateway()
            .delete_table(table_id)
            .await
            .inspect_err(|e| tracing::error!(table_id, error = %e, "Failed to delete table"))?;
        tracing::info!(table_id, "Table deleted");
        self.refresh_after_write().await;
        Ok(())
    }

    async fn refresh_after_write(&self) {
        if let Err(e) = self.refresh_catalog().await {
            tracing::debug!(error = %e, "Catalog refresh after write failed");
        }
    }
}
