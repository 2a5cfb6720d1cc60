//! Cart Engine
//!
//! Client-local line items for the order being built. Nothing here talks
//! to the gateway; the controller persists the cart on an explicit save.
//!
//! Line totals are always recomputed as quantity x unit price, and the
//! cart total is summed from line totals on demand.

use shared::models::{OrderItem, Product};

use crate::money;
use crate::{ClientError, ClientResult};

/// Prefix of client-temporary line ids
pub const TEMP_ID_PREFIX: &str = "tmp-";

fn temp_line_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<OrderItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cart hydrated from persisted items (server ids kept)
    pub fn from_items(items: Vec<OrderItem>) -> Self {
        let lines = items
            .into_iter()
            .map(|item| OrderItem {
                total_price: money::line_total(item.quantity, item.unit_price),
                ..item
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[OrderItem] {
        &self.lines
    }

    pub fn line(&self, line_id: &str) -> Option<&OrderItem> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Items for a save payload
    pub fn to_items(&self) -> Vec<OrderItem> {
        self.lines.clone()
    }

    /// Add `quantity` of a product
    ///
    /// Count-based products merge into an existing line for the same
    /// product, keeping that line's unit price; every other unit appends a
    /// new line.
    /// Returns the id of the line that was created or grown.
    pub fn add_line(&mut self, product: &Product, quantity: f64) -> ClientResult<String> {
        money::validate_quantity(quantity)?;
        let quantity = money::round_quantity(quantity);

        if product.unit.merges_on_add()
            && let Some(line) = self
                .lines
                .iter_mut()
                .find(|l| l.product_id.as_deref() == Some(product.id.as_str()))
        {
            let merged = money::round_quantity(line.quantity + quantity);
            money::validate_quantity(merged)?;
            line.quantity = merged;
            line.total_price = money::line_total(line.quantity, line.unit_price);
            return Ok(line.id.clone());
        }

        Ok(self.push_line(product, quantity, product.price))
    }

    /// Add a weighed portion from a scale reading in grams
    pub fn add_weighed(&mut self, product: &Product, grams: f64) -> ClientResult<String> {
        if !product.unit.is_weighed() {
            return Err(ClientError::Validation(format!(
                "{} is not sold by weight",
                product.name
            )));
        }
        if !grams.is_finite() || grams <= 0.0 {
            return Err(ClientError::Validation(format!(
                "weight must be positive, got {} g",
                grams
            )));
        }
        let kg = money::grams_to_kg(grams);
        if kg <= 0.0 {
            return Err(ClientError::Validation(format!("{} g is too light to sell", grams)));
        }
        self.add_line(product, kg)
    }

    /// Add a single line at an operator-typed price
    pub fn add_custom_priced(&mut self, product: &Product, custom_price: f64) -> ClientResult<String> {
        money::validate_price(custom_price, "custom price")?;
        Ok(self.push_line(product, 1.0, custom_price))
    }

    /// Delete a line; missing ids are ignored
    pub fn remove_line(&mut self, line_id: &str) {
        self.lines.retain(|l| l.id != line_id);
    }

    /// Take one off the first count-based line for `product_id`
    ///
    /// The line is removed when its quantity reaches zero. Weighed lines
    /// are never decremented.
    pub fn decrement_line(&mut self, product_id: &str) {
        let Some(index) = self.lines.iter().position(|l| {
            l.product_id.as_deref() == Some(product_id) && !l.unit.is_weighed()
        }) else {
            return;
        };

        let line = &mut self.lines[index];
        let quantity = money::round_quantity(line.quantity - 1.0);
        if quantity <= 0.0 {
            self.lines.remove(index);
        } else {
            line.quantity = quantity;
            line.total_price = money::line_total(quantity, line.unit_price);
        }
    }

    /// Replace a line's quantity (must be > 0)
    pub fn edit_line_quantity(&mut self, line_id: &str, new_quantity: f64) -> ClientResult<()> {
        money::validate_quantity(new_quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| ClientError::NotFound(format!("cart line {}", line_id)))?;
        line.quantity = money::round_quantity(new_quantity);
        line.total_price = money::line_total(line.quantity, line.unit_price);
        Ok(())
    }

    pub fn total(&self) -> f64 {
        money::items_total(&self.lines)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn push_line(&mut self, product: &Product, quantity: f64, unit_price: f64) -> String {
        let id = temp_line_id();
        self.lines.push(OrderItem {
            id: id.clone(),
            product_id: Some(product.id.clone()),
            product_name: product.name.clone(),
            quantity,
            unit_price,
            total_price: money::line_total(quantity, unit_price),
            unit: product.unit,
            notes: None,
        });
        id
    }
}
