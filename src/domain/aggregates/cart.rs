//! Cart Aggregate
//!
//! A cart is the set of a user's [`CartItem`] lines, at most one per product.
//! Line totals follow the live catalogue price: every create or quantity
//! change re-prices the line from the product as it is at that moment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::product::{Product, ProductError};
use crate::domain::value_objects::{Money, MoneyError, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartItem {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "product")]
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn create(user_id: Uuid, product: &Product, quantity: Quantity) -> Result<Self, CartError> {
        let total_price = price_line(product, quantity)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), user_id, product_id: product.id(), quantity, total_price,
            created_at: now, updated_at: now,
        })
    }

    /// Sets a new quantity and re-prices from the product's current price.
    pub fn change_quantity(&mut self, product: &Product, quantity: Quantity) -> Result<(), CartError> {
        if product.id() != self.product_id { return Err(CartError::ProductMismatch); }
        self.total_price = price_line(product, quantity)?;
        self.quantity = quantity;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Validates stock and computes `product.price * quantity`.
pub fn price_line(product: &Product, quantity: Quantity) -> Result<Money, CartError> {
    product.ensure_available(quantity).map_err(CartError::Stock)?;
    product.price().multiply(quantity).map_err(CartError::Price)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { Stock(ProductError), Price(MoneyError), ProductMismatch }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stock(e) => write!(f, "{}", e),
            Self::Price(e) => write!(f, "line total invalid: {}", e),
            Self::ProductMismatch => write!(f, "a cart line cannot change product"),
        }
    }
}
