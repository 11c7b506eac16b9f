//! Postgres store on `sqlx`.
//!
//! Writers lock the rows they intend to change with `SELECT ... FOR UPDATE`,
//! so a stock check and the write that depends on it cannot interleave with
//! another request touching the same product.

use std::collections::HashMap;
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use super::{Page, ProductQuery, Store, StoreTx};
use crate::access::Scope;
use crate::domain::aggregates::{AccessToken, CartItem, Order, OrderItem, OrderStatus, Product, ProductStatus, User};
use crate::domain::value_objects::{Money, Quantity};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EcommerceError::Storage(format!("migration failed: {}", e)))
    }
}

// =============================================================================
// Rows
// =============================================================================

fn corrupt(table: &str, detail: impl Display) -> EcommerceError {
    EcommerceError::Storage(format!("corrupt {} row: {}", table, detail))
}

fn money(value: Decimal, table: &str) -> Result<Money> {
    Money::new(value).map_err(|e| corrupt(table, e))
}

fn quantity(value: i64, table: &str) -> Result<Quantity> {
    let value = u32::try_from(value).map_err(|e| corrupt(table, e))?;
    Quantity::new(value).map_err(|e| corrupt(table, e))
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    stock: i64,
    category: String,
    image_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(row: ProductRow) -> Result<Self> {
        let status = ProductStatus::parse(&row.status).ok_or_else(|| corrupt("products", &row.status))?;
        Ok(Product {
            id: row.id,
            name: row.name,
            description: row.description,
            price: money(row.price, "products")?,
            stock: u32::try_from(row.stock).map_err(|e| corrupt("products", e))?,
            category: row.category,
            image_url: row.image_url,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

#[derive(FromRow)]
struct CartItemRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = EcommerceError;
    fn try_from(row: CartItemRow) -> Result<Self> {
        Ok(CartItem {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: quantity(row.quantity, "cart_items")?,
            total_price: money(row.total_price, "cart_items")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    order_date: DateTime<Utc>,
    status: String,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = EcommerceError;
    fn try_from(row: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: quantity(row.quantity, "order_items")?,
            price: money(row.price, "order_items")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    is_staff: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            is_staff: row.is_staff,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AccessTokenRow {
    token: String,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        AccessToken { token: row.token, user_id: row.user_id, issued_at: row.issued_at, expires_at: row.expires_at }
    }
}

// =============================================================================
// Shared queries
// =============================================================================

const ORDER_ITEMS_FOR_ORDERS: &str =
    "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY created_at, id";

/// Loads the items of `rows` and assembles full orders, keeping row order.
async fn assemble_orders(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let item_rows = sqlx::query_as::<_, OrderItemRow>(ORDER_ITEMS_FOR_ORDERS)
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
        let item = OrderItem::try_from(row)?;
        items.entry(item.order_id).or_default().push(item);
    }
    rows.into_iter()
        .map(|row| -> Result<Order> {
            let status = row.status.parse::<OrderStatus>().map_err(|e| corrupt("orders", e))?;
            Ok(Order {
                id: row.id,
                user_id: row.user_id,
                order_date: row.order_date,
                status,
                total_price: money(row.total_price, "orders")?,
                items: items.remove(&row.id).unwrap_or_default(),
                created_at: row.created_at,
                updated_at: row.updated_at,
                events: vec![],
            })
        })
        .collect()
}

async fn insert_order_items(conn: &mut PgConnection, items: &[OrderItem]) -> Result<()> {
    for item in items {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(i64::from(item.quantity.value()))
        .bind(item.price.amount())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// `ILIKE` pattern matching `term` literally anywhere in the value.
fn contains_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        const FILTER: &str = "WHERE status = 'active' \
             AND ($1::text IS NULL OR category = $1) \
             AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)";
        let pattern = query.search.as_deref().map(contains_pattern);
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products {} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            FILTER
        ))
        .bind(&query.category)
        .bind(&pattern)
        .bind(i64::from(query.per_page))
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {}", FILTER))
            .bind(&query.category)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;
        let items = rows.into_iter().map(Product::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total: total.max(0) as u64 })
    }

    async fn cart_items(&self, scope: &Scope) -> Result<Vec<CartItem>> {
        sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at, id")
            .bind(scope.owner())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CartItem::try_from)
            .collect()
    }

    async fn cart_item(&self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>> {
        sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(scope.owner())
            .fetch_optional(&self.pool)
            .await?
            .map(CartItem::try_from)
            .transpose()
    }

    async fn orders(&self, scope: &Scope) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(scope.owner())
            .fetch_all(&mut *conn)
            .await?;
        assemble_orders(&mut *conn, rows).await
    }

    async fn order(&self, scope: &Scope, id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(scope.owner())
            .fetch_all(&mut *conn)
            .await?;
        Ok(assemble_orders(&mut *conn, rows).await?.pop())
    }

    async fn order_items(&self, scope: &Scope) -> Result<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItemRow>(
            "SELECT oi.* FROM order_items oi JOIN orders o ON o.id = oi.order_id \
             WHERE o.user_id = $1 ORDER BY oi.created_at, oi.id",
        )
        .bind(scope.owner())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(OrderItem::try_from)
        .collect()
    }

    async fn order_item(&self, scope: &Scope, id: Uuid) -> Result<Option<OrderItem>> {
        sqlx::query_as::<_, OrderItemRow>(
            "SELECT oi.* FROM order_items oi JOIN orders o ON o.id = oi.order_id \
             WHERE oi.id = $1 AND o.user_id = $2",
        )
        .bind(id)
        .bind(scope.owner())
        .fetch_optional(&self.pool)
        .await?
        .map(OrderItem::try_from)
        .transpose()
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let row = sqlx::query_as::<_, AccessTokenRow>("SELECT * FROM access_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AccessToken::from))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn insert_product(&mut self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, description, price, stock, category, image_url, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(p.id())
        .bind(p.name())
        .bind(p.description())
        .bind(p.price().amount())
        .bind(i64::from(p.stock()))
        .bind(p.category())
        .bind(p.image_url())
        .bind(p.status().as_str())
        .bind(p.created_at())
        .bind(p.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_product(&mut self, p: &Product) -> Result<()> {
        let done = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, stock = $5, category = $6, \
             image_url = $7, status = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(p.id())
        .bind(p.name())
        .bind(p.description())
        .bind(p.price().amount())
        .bind(i64::from(p.stock()))
        .bind(p.category())
        .bind(p.image_url())
        .bind(p.status().as_str())
        .bind(p.updated_at())
        .execute(&mut *self.tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound("product"));
        }
        Ok(())
    }

    async fn lock_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<Option<CartItem>> {
        sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(scope.owner())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(CartItem::try_from)
            .transpose()
    }

    async fn cart_item_for_product(&mut self, scope: &Scope, product_id: Uuid) -> Result<Option<CartItem>> {
        sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE user_id = $1 AND product_id = $2 FOR UPDATE")
            .bind(scope.owner())
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(CartItem::try_from)
            .transpose()
    }

    async fn cart_items(&mut self, scope: &Scope) -> Result<Vec<CartItem>> {
        sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at, id FOR UPDATE")
            .bind(scope.owner())
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(CartItem::try_from)
            .collect()
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO cart_items (id, user_id, product_id, quantity, total_price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity, \
             total_price = EXCLUDED.total_price, updated_at = EXCLUDED.updated_at",
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.product_id)
        .bind(i64::from(item.quantity.value()))
        .bind(item.total_price.amount())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_cart_item(&mut self, scope: &Scope, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(scope.owner())
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, scope: &Scope) -> Result<u64> {
        let done = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(scope.owner())
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn remove_product_from_carts(&mut self, product_id: Uuid) -> Result<u64> {
        let done = sqlx::query("DELETE FROM cart_items WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn lock_order(&mut self, scope: &Scope, id: Uuid) -> Result<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(scope.owner())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(assemble_orders(&mut *self.tx, rows).await?.pop())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, order_date, status, total_price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(order.order_date())
        .bind(order.status().as_str())
        .bind(order.total_price().amount())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;
        insert_order_items(&mut *self.tx, order.items()).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let done = sqlx::query("UPDATE orders SET status = $2, total_price = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id())
            .bind(order.status().as_str())
            .bind(order.total_price().amount())
            .bind(order.updated_at())
            .execute(&mut *self.tx)
            .await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound("order"));
        }
        Ok(())
    }

    async fn replace_order_items(&mut self, order: &Order) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id())
            .execute(&mut *self.tx)
            .await?;
        insert_order_items(&mut *self.tx, order.items()).await
    }

    async fn delete_order(&mut self, scope: &Scope, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(scope.owner())
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, is_staff, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_staff)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                EcommerceError::validation("username", "a user with that username already exists")
            }
            other => other.into(),
        })?;
        Ok(())
    }

    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<()> {
        sqlx::query("INSERT INTO access_tokens (token, user_id, issued_at, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(&token.token)
            .bind(token.user_id)
            .bind(token.issued_at)
            .bind(token.expires_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn purge_expired_tokens(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
