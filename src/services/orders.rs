//! Orders, order items and checkout.
//!
//! Every order line reserves stock from its product. Stock goes back when a
//! pending order's items are replaced, and when an order that has not shipped
//! yet is cancelled or deleted. Products are always locked in ascending id
//! order, after the order row and before any cart line.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::access::Principal;
use crate::domain::aggregates::{Order, OrderError, OrderItem, OrderStatus, Product};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::Quantity;
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{Store, StoreTx};
use crate::{EcommerceError, Result};

/// Checkouts that see their cart change under them start over this many
/// times at most.
const CHECKOUT_ATTEMPTS: u32 = 3;

/// One requested `(product, quantity)` line. The price is never taken from
/// the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

/// Partial order update. Items are replaced before the status is applied.
#[derive(Clone, Debug, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub items: Option<Vec<OrderLine>>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn list_orders(&self, principal: &Principal) -> Result<Vec<Order>> {
        self.store.orders(&principal.scope()).await
    }

    pub async fn get_order(&self, principal: &Principal, id: Uuid) -> Result<Order> {
        self.store
            .order(&principal.scope(), id)
            .await?
            .ok_or(EcommerceError::NotFound("order"))
    }

    pub async fn list_order_items(&self, principal: &Principal) -> Result<Vec<OrderItem>> {
        self.store.order_items(&principal.scope()).await
    }

    pub async fn get_order_item(&self, principal: &Principal, id: Uuid) -> Result<OrderItem> {
        self.store
            .order_item(&principal.scope(), id)
            .await?
            .ok_or(EcommerceError::NotFound("order item"))
    }

    /// Places a pending order owned by the caller, pricing every line from
    /// the product's current price.
    ///
    /// Every line reserves its quantity from the product's stock. A line
    /// asking for more than is in stock fails with a validation error on
    /// `items[i].quantity` and nothing is written.
    #[instrument(skip(self, lines), fields(user_id = %principal.user_id, lines = lines.len()))]
    pub async fn create_order(&self, principal: &Principal, lines: Vec<OrderLine>) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut locked = LockedProducts::default();
        locked.lock(tx.as_mut(), lines.iter().map(|l| l.product_id)).await?;
        locked.reserve(&lines)?;
        let mut order = Order::place(principal.user_id, locked.lines(&lines))?;
        tx.insert_order(&order).await?;
        let mut events = locked.persist(tx.as_mut()).await?;
        tx.commit().await?;

        info!(order_id = %order.id(), total = %order.total_price(), "order placed");
        events.extend(order.take_events());
        publish_all(&self.publisher, events).await;
        Ok(order)
    }

    #[instrument(skip(self, update), fields(user_id = %principal.user_id))]
    pub async fn update_order(&self, principal: &Principal, id: Uuid, update: OrderUpdate) -> Result<Order> {
        let scope = principal.scope();
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(&scope, id).await?.ok_or(EcommerceError::NotFound("order"))?;

        let mut locked = LockedProducts::default();
        let requested = update.items.iter().flatten().map(|l| l.product_id);
        locked.lock(tx.as_mut(), order.items().iter().map(|i| i.product_id).chain(requested)).await?;

        let replaced = match &update.items {
            Some(lines) => {
                if order.status() != OrderStatus::Pending {
                    return Err(OrderError::NotEditable(order.status()).into());
                }
                locked.release(order.items());
                locked.reserve(lines)?;
                order.replace_items(locked.lines(lines))?;
                true
            }
            None => false,
        };

        if let Some(next) = update.status {
            let reserved = order.has_reserved_stock();
            if order.transition(next)? && reserved && next == OrderStatus::Cancelled {
                locked.release(order.items());
            }
        }

        tx.update_order(&order).await?;
        if replaced {
            tx.replace_order_items(&order).await?;
        }
        let mut events = locked.persist(tx.as_mut()).await?;
        tx.commit().await?;

        info!(order_id = %id, status = %order.status(), total = %order.total_price(), "order updated");
        events.extend(order.take_events());
        publish_all(&self.publisher, events).await;
        Ok(order)
    }

    /// Deletes the order and its items. Stock of an order that has not
    /// shipped is given back.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn delete_order(&self, principal: &Principal, id: Uuid) -> Result<()> {
        let scope = principal.scope();
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(&scope, id).await?.ok_or(EcommerceError::NotFound("order"))?;

        let mut locked = LockedProducts::default();
        if order.has_reserved_stock() {
            locked.lock(tx.as_mut(), order.items().iter().map(|i| i.product_id)).await?;
            locked.release(order.items());
        }
        tx.delete_order(&scope, id).await?;
        let mut events = locked.persist(tx.as_mut()).await?;
        tx.commit().await?;

        info!(order_id = %id, "order deleted");
        order.mark_deleted();
        events.extend(order.take_events());
        publish_all(&self.publisher, events).await;
        Ok(())
    }

    /// Turns the caller's cart into a pending order at current prices and
    /// empties the cart.
    ///
    /// Products are locked from a cart read taken before the transaction. If
    /// the cart gained a product in between, the transaction is dropped and
    /// the checkout starts over from the newer cart so that locks are still
    /// taken in ascending id order.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn checkout(&self, principal: &Principal) -> Result<Order> {
        let scope = principal.scope();
        let mut preview = self.store.cart_items(&scope).await?;

        for attempt in 1..=CHECKOUT_ATTEMPTS {
            if preview.is_empty() {
                return Err(EcommerceError::validation("cart", "cart is empty"));
            }

            let mut tx = self.store.begin().await?;
            let mut locked = LockedProducts::default();
            locked.lock(tx.as_mut(), preview.iter().map(|i| i.product_id)).await?;
            let cart = tx.cart_items(&scope).await?;
            if cart.iter().any(|i| !preview.iter().any(|p| p.product_id == i.product_id)) {
                debug!(attempt, "cart changed before checkout locked it, retrying");
                drop(tx);
                preview = cart;
                continue;
            }
            if cart.is_empty() {
                return Err(EcommerceError::validation("cart", "cart is empty"));
            }

            let lines: Vec<OrderLine> = cart.iter().map(|i| OrderLine { product_id: i.product_id, quantity: i.quantity }).collect();
            locked.reserve(&lines)?;
            let mut order = Order::place(principal.user_id, locked.lines(&lines))?;
            tx.insert_order(&order).await?;
            tx.clear_cart(&scope).await?;
            let mut events = locked.persist(tx.as_mut()).await?;
            tx.commit().await?;

            info!(order_id = %order.id(), total = %order.total_price(), lines = lines.len(), "cart checked out");
            events.extend(order.take_events());
            events.push(DomainEvent::Cart(CartEvent::CheckedOut { user_id: principal.user_id, order_id: order.id() }));
            publish_all(&self.publisher, events).await;
            return Ok(order);
        }

        Err(EcommerceError::validation("cart", "cart kept changing during checkout, try again"))
    }
}

/// Products locked by one transaction, keyed (and therefore locked) in
/// ascending id order.
#[derive(Default)]
struct LockedProducts {
    products: BTreeMap<Uuid, Product>,
}

impl LockedProducts {
    /// Locks every id not locked yet. Missing ids are skipped; lines that
    /// refer to them fail in [`reserve`](Self::reserve).
    async fn lock(&mut self, tx: &mut dyn StoreTx, ids: impl Iterator<Item = Uuid>) -> Result<()> {
        let mut wanted: Vec<Uuid> = ids.filter(|id| !self.products.contains_key(id)).collect();
        wanted.sort();
        wanted.dedup();
        for id in wanted {
            if let Some(product) = tx.lock_product(id).await? {
                self.products.insert(id, product);
            }
        }
        Ok(())
    }

    /// Takes each line's quantity out of stock. Lines must name active
    /// products.
    fn reserve(&mut self, lines: &[OrderLine]) -> Result<()> {
        for (index, line) in lines.iter().enumerate() {
            let product = self
                .products
                .get_mut(&line.product_id)
                .filter(|p| p.is_active())
                .ok_or(EcommerceError::NotFound("product"))?;
            product
                .reserve(line.quantity)
                .map_err(|e| EcommerceError::validation(format!("items[{}].quantity", index), e.to_string()))?;
        }
        Ok(())
    }

    fn release(&mut self, items: &[OrderItem]) {
        for item in items {
            if let Some(product) = self.products.get_mut(&item.product_id) {
                product.release(item.quantity);
            }
        }
    }

    /// `(product, quantity)` pairs for lines that passed [`reserve`](Self::reserve).
    fn lines<'a>(&'a self, lines: &'a [OrderLine]) -> impl Iterator<Item = (&'a Product, Quantity)> + 'a {
        lines
            .iter()
            .filter_map(move |line| self.products.get(&line.product_id).map(|p| (p, line.quantity)))
    }

    /// Writes back every product whose stock changed and returns their events.
    async fn persist(&mut self, tx: &mut dyn StoreTx) -> Result<Vec<DomainEvent>> {
        let mut events = Vec::new();
        for product in self.products.values_mut() {
            let changed = product.take_events();
            if !changed.is_empty() {
                tx.update_product(product).await?;
                events.extend(changed);
            }
        }
        Ok(events)
    }
}
