//! Persistence.
//!
//! [`Store`] serves reads; every write goes through a [`StoreTx`] obtained
//! from [`Store::begin`]. A transaction is the atomic unit: nothing it wrote
//! is visible until [`StoreTx::commit`], and dropping it uncommitted discards
//! everything. Rows read through `lock_*` stay locked against other writers
//! until the transaction ends.
//!
//! Cart and order access always takes an explicit [`Scope`]; an implementation
//! must never return or touch a row outside it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::Scope;
use crate::domain::aggregates::{AccessToken, CartItem, Order, OrderItem, Product, User};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Catalogue listing filter. Only active products are listed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductQuery {
    pub page: u32,
    pub per_page: u32,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self { page: 1, per_page: DEFAULT_PER_PAGE, category: None, search: None }
    }
}

impl ProductQuery {
    pub fn new(page: Option<u32>, per_page: Option<u32>, category: Option<String>, search: Option<String>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
            category: category.filter(|c| !c.trim().is_empty()),
            search: search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Any product by id, archived ones included.
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>>;

    async fn cart_items(&self, scope: &Scope) -> Result<Vec<CartItem>>;
    async fn cart_item(&self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>>;

    async fn orders(&self, scope: &Scope) -> Result<Vec<Order>>;
    async fn order(&self, scope: &Scope, id: Uuid) -> Result<Option<Order>>;
    /// Items of every order owned by the scope.
    async fn order_items(&self, scope: &Scope) -> Result<Vec<OrderItem>>;
    async fn order_item(&self, scope: &Scope, id: Uuid) -> Result<Option<OrderItem>>;

    async fn user(&self, id: Uuid) -> Result<Option<User>>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>>;
    async fn insert_product(&mut self, product: &Product) -> Result<()>;
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    async fn lock_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>>;
    async fn cart_item_for_product(&mut self, scope: &Scope, product_id: Uuid) -> Result<Option<CartItem>>;
    async fn cart_items(&mut self, scope: &Scope) -> Result<Vec<CartItem>>;
    /// Inserts or updates by id.
    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()>;
    async fn delete_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<bool>;
    async fn clear_cart(&mut self, scope: &Scope) -> Result<u64>;
    async fn remove_product_from_carts(&mut self, product_id: Uuid) -> Result<u64>;

    async fn lock_order(&mut self, scope: &Scope, id: Uuid) -> Result<Option<Order>>;
    /// Writes the order together with all of its items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    /// Writes status, total and timestamps. Items are left alone.
    async fn update_order(&mut self, order: &Order) -> Result<()>;
    /// Deletes every stored item of the order, then writes `order.items()`.
    async fn replace_order_items(&mut self, order: &Order) -> Result<()>;
    async fn delete_order(&mut self, scope: &Scope, id: Uuid) -> Result<bool>;

    async fn insert_user(&mut self, user: &User) -> Result<()>;
    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<()>;
    /// Deletes every token that expired at or before `now`.
    async fn purge_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_query_bounds() {
        let q = ProductQuery::new(Some(0), Some(1000), Some(" ".into()), Some("  lamp ".into()));
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, MAX_PER_PAGE);
        assert_eq!(q.category, None);
        assert_eq!(q.search.as_deref(), Some("lamp"));
        assert_eq!(ProductQuery::new(Some(3), Some(10), None, None).offset(), 20);
    }
}
