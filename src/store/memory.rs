//! In-memory store.
//!
//! One mutex guards all tables. A transaction holds the lock for its whole
//! lifetime and works on a copy, which replaces the tables on commit. Writers
//! are therefore fully serialized and a dropped transaction leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Page, ProductQuery, Store, StoreTx};
use crate::access::Scope;
use crate::domain::aggregates::{AccessToken, CartItem, Order, OrderItem, Product, User};
use crate::{EcommerceError, Result};

#[derive(Clone, Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    cart_items: HashMap<Uuid, CartItem>,
    orders: HashMap<Uuid, Order>,
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, AccessToken>,
}

impl Tables {
    fn cart_items(&self, scope: &Scope) -> Vec<CartItem> {
        let mut items: Vec<CartItem> = self.cart_items.values().filter(|i| scope.permits(i.user_id)).cloned().collect();
        items.sort_by_key(|i| (i.created_at, i.id));
        items
    }

    fn order(&self, scope: &Scope, id: Uuid) -> Option<Order> {
        self.orders.get(&id).filter(|o| scope.permits(o.user_id)).cloned()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let tables = self.tables.lock().await;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<&Product> = tables
            .products
            .values()
            .filter(|p| p.is_active())
            .filter(|p| query.category.as_ref().map_or(true, |c| p.category() == c))
            .filter(|p| {
                needle.as_ref().map_or(true, |n| {
                    p.name().to_lowercase().contains(n) || p.description().to_lowercase().contains(n)
                })
            })
            .collect();
        matching.sort_by(|a, b| (b.created_at(), b.id()).cmp(&(a.created_at(), a.id())));
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    async fn cart_items(&self, scope: &Scope) -> Result<Vec<CartItem>> {
        Ok(self.tables.lock().await.cart_items(scope))
    }

    async fn cart_item(&self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>> {
        let tables = self.tables.lock().await;
        Ok(tables.cart_items.get(&id).filter(|i| scope.permits(i.user_id)).cloned())
    }

    async fn orders(&self, scope: &Scope) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables.orders.values().filter(|o| scope.permits(o.user_id)).cloned().collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(orders)
    }

    async fn order(&self, scope: &Scope, id: Uuid) -> Result<Option<Order>> {
        Ok(self.tables.lock().await.order(scope, id))
    }

    async fn order_items(&self, scope: &Scope) -> Result<Vec<OrderItem>> {
        let tables = self.tables.lock().await;
        let mut items: Vec<OrderItem> = tables
            .orders
            .values()
            .filter(|o| scope.permits(o.user_id))
            .flat_map(|o| o.items.iter().cloned())
            .collect();
        items.sort_by_key(|i| (i.created_at, i.id));
        Ok(items)
    }

    async fn order_item(&self, scope: &Scope, id: Uuid) -> Result<Option<OrderItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| scope.permits(o.user_id))
            .flat_map(|o| o.items.iter())
            .find(|i| i.id == id)
            .cloned())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        Ok(self.tables.lock().await.tokens.get(token).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

/// Stored copies never carry pending domain events.
fn stored_product(product: &Product) -> Product {
    let mut product = product.clone();
    product.events.clear();
    product
}

fn stored_order(order: &Order) -> Order {
    let mut order = order.clone();
    order.events.clear();
    order
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.work.products.insert(product.id(), stored_product(product));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let slot = self.work.products.get_mut(&product.id()).ok_or(EcommerceError::NotFound("product"))?;
        *slot = stored_product(product);
        Ok(())
    }

    async fn lock_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>> {
        Ok(self.work.cart_items.get(&id).filter(|i| scope.permits(i.user_id)).cloned())
    }

    async fn cart_item_for_product(&mut self, scope: &Scope, product_id: Uuid) -> Result<Option<CartItem>> {
        Ok(self
            .work
            .cart_items
            .values()
            .find(|i| scope.permits(i.user_id) && i.product_id == product_id)
            .cloned())
    }

    async fn cart_items(&mut self, scope: &Scope) -> Result<Vec<CartItem>> {
        Ok(self.work.cart_items(scope))
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()> {
        self.work.cart_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<bool> {
        match self.work.cart_items.get(&id) {
            Some(item) if scope.permits(item.user_id) => {
                self.work.cart_items.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_cart(&mut self, scope: &Scope) -> Result<u64> {
        let before = self.work.cart_items.len();
        self.work.cart_items.retain(|_, i| !scope.permits(i.user_id));
        Ok((before - self.work.cart_items.len()) as u64)
    }

    async fn remove_product_from_carts(&mut self, product_id: Uuid) -> Result<u64> {
        let before = self.work.cart_items.len();
        self.work.cart_items.retain(|_, i| i.product_id != product_id);
        Ok((before - self.work.cart_items.len()) as u64)
    }

    async fn lock_order(&mut self, scope: &Scope, id: Uuid) -> Result<Option<Order>> {
        Ok(self.work.order(scope, id))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.work.orders.insert(order.id(), stored_order(order));
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let stored = self.work.orders.get_mut(&order.id()).ok_or(EcommerceError::NotFound("order"))?;
        stored.status = order.status;
        stored.total_price = order.total_price;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn replace_order_items(&mut self, order: &Order) -> Result<()> {
        let stored = self.work.orders.get_mut(&order.id()).ok_or(EcommerceError::NotFound("order"))?;
        stored.items = order.items.clone();
        Ok(())
    }

    async fn delete_order(&mut self, scope: &Scope, id: Uuid) -> Result<bool> {
        match self.work.orders.get(&id) {
            Some(order) if scope.permits(order.user_id) => {
                self.work.orders.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        if self.work.users.values().any(|u| u.username == user.username) {
            return Err(EcommerceError::validation("username", "a user with that username already exists"));
        }
        self.work.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<()> {
        self.work.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn purge_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let before = self.work.tokens.len();
        self.work.tokens.retain(|_, t| t.expires_at > now);
        Ok((before - self.work.tokens.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
