//! Shopping cart lines of the calling user.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::access::Principal;
use crate::domain::aggregates::{CartItem, Product};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::Quantity;
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{Store, StoreTx};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn list_items(&self, principal: &Principal) -> Result<Vec<CartItem>> {
        self.store.cart_items(&principal.scope()).await
    }

    pub async fn get_item(&self, principal: &Principal, id: Uuid) -> Result<CartItem> {
        self.store
            .cart_item(&principal.scope(), id)
            .await?
            .ok_or(EcommerceError::NotFound("cart item"))
    }

    /// Puts `quantity` of a product in the cart. A product already in the cart
    /// keeps its line and gets the new quantity. Returns the line and whether
    /// it was newly created.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn add_or_update_item(&self, principal: &Principal, product_id: Uuid, quantity: Quantity) -> Result<(CartItem, bool)> {
        let scope = principal.scope();
        let mut tx = self.store.begin().await?;
        let product = lock_active(tx.as_mut(), product_id).await?;
        let (item, created) = match tx.cart_item_for_product(&scope, product_id).await? {
            Some(mut item) => {
                item.change_quantity(&product, quantity)?;
                (item, false)
            }
            None => (CartItem::create(principal.user_id, &product, quantity)?, true),
        };
        tx.save_cart_item(&item).await?;
        tx.commit().await?;
        info!(item_id = %item.id, quantity = %item.quantity, total = %item.total_price, created, "cart line saved");
        publish_all(&self.publisher, vec![saved(&item)]).await;
        Ok((item, created))
    }

    /// Changes the quantity of an existing line and re-prices it.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn update_item(&self, principal: &Principal, id: Uuid, quantity: Quantity) -> Result<CartItem> {
        let scope = principal.scope();
        // Products are locked before cart lines everywhere, so find the
        // product first and re-read the line under lock.
        let product_id = self.get_item(principal, id).await?.product_id;
        let mut tx = self.store.begin().await?;
        let product = lock_active(tx.as_mut(), product_id).await?;
        let mut item = tx
            .lock_cart_item(&scope, id)
            .await?
            .ok_or(EcommerceError::NotFound("cart item"))?;
        item.change_quantity(&product, quantity)?;
        tx.save_cart_item(&item).await?;
        tx.commit().await?;
        info!(item_id = %id, quantity = %item.quantity, total = %item.total_price, "cart line updated");
        publish_all(&self.publisher, vec![saved(&item)]).await;
        Ok(item)
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn remove_item(&self, principal: &Principal, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_cart_item(&principal.scope(), id).await? {
            return Err(EcommerceError::NotFound("cart item"));
        }
        tx.commit().await?;
        info!(item_id = %id, "cart line removed");
        let event = DomainEvent::Cart(CartEvent::ItemRemoved { user_id: principal.user_id, item_id: id });
        publish_all(&self.publisher, vec![event]).await;
        Ok(())
    }
}

fn saved(item: &CartItem) -> DomainEvent {
    DomainEvent::Cart(CartEvent::ItemSaved {
        user_id: item.user_id,
        item_id: item.id,
        product_id: item.product_id,
        quantity: item.quantity,
        total_price: item.total_price,
    })
}

async fn lock_active(tx: &mut dyn StoreTx, id: Uuid) -> Result<Product> {
    tx.lock_product(id)
        .await?
        .filter(Product::is_active)
        .ok_or(EcommerceError::NotFound("product"))
}
