//! Catalogue reads and staff-only catalogue writes.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::access::{require_privileged, Principal};
use crate::domain::aggregates::{Product, ProductDraft, ProductPatch};
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{Page, ProductQuery, Store, StoreTx};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        self.store.products(query).await
    }

    /// Active products only; archived ones read as missing.
    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.store
            .product(id)
            .await?
            .filter(Product::is_active)
            .ok_or(EcommerceError::NotFound("product"))
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, principal: Option<&Principal>, draft: ProductDraft) -> Result<Product> {
        require_privileged(principal)?;
        let mut product = Product::create(draft)?;
        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;
        info!(product_id = %product.id(), "product created");
        publish_all(&self.publisher, product.take_events()).await;
        Ok(product)
    }

    #[instrument(skip(self, draft))]
    pub async fn replace_product(&self, principal: Option<&Principal>, id: Uuid, draft: ProductDraft) -> Result<Product> {
        require_privileged(principal)?;
        self.modify(id, |product| product.replace(draft).map_err(Into::into)).await
    }

    #[instrument(skip(self, patch))]
    pub async fn patch_product(&self, principal: Option<&Principal>, id: Uuid, patch: ProductPatch) -> Result<Product> {
        require_privileged(principal)?;
        self.modify(id, |product| product.apply(patch).map_err(Into::into)).await
    }

    /// Archives the product and drops it from every cart. Existing order items
    /// keep referring to it.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, principal: Option<&Principal>, id: Uuid) -> Result<()> {
        require_privileged(principal)?;
        let mut tx = self.store.begin().await?;
        let mut product = lock_active(tx.as_mut(), id).await?;
        product.archive();
        tx.update_product(&product).await?;
        let removed = tx.remove_product_from_carts(id).await?;
        tx.commit().await?;
        info!(product_id = %id, cart_lines_removed = removed, "product archived");
        publish_all(&self.publisher, product.take_events()).await;
        Ok(())
    }

    async fn modify(&self, id: Uuid, change: impl FnOnce(&mut Product) -> Result<()> + Send) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = lock_active(tx.as_mut(), id).await?;
        change(&mut product)?;
        tx.update_product(&product).await?;
        tx.commit().await?;
        info!(product_id = %id, price = %product.price(), stock = product.stock(), "product updated");
        publish_all(&self.publisher, product.take_events()).await;
        Ok(product)
    }
}

async fn lock_active(tx: &mut dyn StoreTx, id: Uuid) -> Result<Product> {
    tx.lock_product(id)
        .await?
        .filter(Product::is_active)
        .ok_or(EcommerceError::NotFound("product"))
}
