//! Product Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pricing unit of a product
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProductUnit {
    /// Sold by weight, price is per kilogram
    Kg,
    /// Sold by count
    Qty,
    /// Sold by the portion
    Portion,
}

impl ProductUnit {
    /// Weight-based unit (quantity is fractional kilograms)
    pub fn is_weighed(self) -> bool {
        matches!(self, ProductUnit::Kg)
    }

    /// Repeated adds of the same product merge into one line
    pub fn merges_on_add(self) -> bool {
        matches!(self, ProductUnit::Qty)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProductUnit::Kg => "kg",
            ProductUnit::Qty => "qty",
            ProductUnit::Portion => "portion",
        }
    }
}

impl fmt::Display for ProductUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retail goods (weighed at the counter) vs. table service items
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[default]
    Retail,
    Service,
}

/// Menu category tag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Nuts,
    DriedFruit,
    Drinks,
    Dessert,
    #[default]
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        ProductCategory::Nuts,
        ProductCategory::DriedFruit,
        ProductCategory::Drinks,
        ProductCategory::Dessert,
        ProductCategory::Other,
    ];

    /// Whether this category takes operator-typed prices
    pub fn accepts_custom_price(self) -> bool {
        matches!(self, ProductCategory::Other)
    }
}

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Unit price in currency unit (per kg for weighed products)
    pub price: f64,
    pub unit: ProductUnit,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub category: ProductCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Informational stock level, never decremented by sales
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}

/// Create/update product payload (`id: None` creates)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProductUpsert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<ProductUnit>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProductKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ProductCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}

impl ProductUpsert {
    /// Payload for a brand new product
    pub fn new(
        name: impl Into<String>,
        price: f64,
        unit: ProductUnit,
        category: ProductCategory,
    ) -> Self {
        Self {
            name: Some(name.into()),
            price: Some(price),
            unit: Some(unit),
            kind: Some(if unit.is_weighed() {
                ProductKind::Retail
            } else {
                ProductKind::Service
            }),
            category: Some(category),
            ..Default::default()
        }
    }

    /// Patch targeting an existing product
    pub fn existing(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Apply this patch on top of an existing product
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(unit) = self.unit {
            product.unit = unit;
        }
        if let Some(kind) = self.kind {
            product.kind = kind;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if self.image.is_some() {
            product.image = self.image.clone();
        }
        if self.stock.is_some() {
            product.stock = self.stock;
        }
        if self.sort_order.is_some() {
            product.sort_order = self.sort_order;
        }
    }

    /// Build a full product from a create payload, `None` if a required field is missing
    pub fn into_product(self, id: String) -> Option<Product> {
        Some(Product {
            id,
            name: self.name?,
            price: self.price?,
            unit: self.unit?,
            kind: self.kind.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            image: self.image,
            stock: self.stock,
            sort_order: self.sort_order,
        })
    }
}
