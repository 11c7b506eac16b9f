//! Application services.
//!
//! Each service runs one operation inside one store transaction and hands the
//! aggregates' events to the publisher once the transaction has committed.
//! A service never reads through [`Store`] while it holds a [`StoreTx`].
//!
//! [`StoreTx`]: crate::store::StoreTx

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod orders;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::publisher::EventPublisher;
use crate::store::Store;

pub use accounts::{AccountService, IssuedToken, Registration};
pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::{OrderLine, OrderService, OrderUpdate};

/// Every service, wired to the same store and publisher.
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderService,
    pub accounts: AccountService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>, config: &AppConfig) -> Self {
        Self {
            catalog: CatalogService::new(store.clone(), publisher.clone()),
            carts: CartService::new(store.clone(), publisher.clone()),
            orders: OrderService::new(store.clone(), publisher),
            accounts: AccountService::new(store, chrono::Duration::seconds(config.token_ttl_secs)),
        }
    }
}
