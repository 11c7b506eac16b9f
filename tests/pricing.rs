//! Pricing, stock and scoping behaviour of the services over the in-memory store.

use std::sync::Arc;

use storefront::domain::aggregates::{OrderStatus, ProductDraft, ProductPatch};
use storefront::domain::value_objects::{Money, Quantity};
use storefront::publisher::LogPublisher;
use storefront::services::{OrderLine, OrderUpdate, Services};
use storefront::store::{MemoryStore, Store};
use storefront::{AppConfig, EcommerceError, Principal};
use uuid::Uuid;

struct Shop {
    services: Services,
    store: Arc<dyn Store>,
    staff: Principal,
}

fn shop() -> Shop {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let services = Services::new(store.clone(), Arc::new(LogPublisher), &AppConfig::default());
    Shop { services, store, staff: Principal::new(Uuid::new_v4(), true) }
}

fn customer() -> Principal {
    Principal::new(Uuid::new_v4(), false)
}

fn money(cents: i64) -> Money {
    Money::from_cents(cents).unwrap()
}

fn qty(n: u32) -> Quantity {
    Quantity::new(n).unwrap()
}

fn line(product_id: Uuid, n: u32) -> OrderLine {
    OrderLine { product_id, quantity: qty(n) }
}

impl Shop {
    async fn product(&self, name: &str, cents: i64, stock: u32) -> Uuid {
        let draft = ProductDraft {
            name: name.into(),
            description: String::new(),
            price: money(cents),
            stock,
            category: "general".into(),
            image_url: None,
        };
        self.services.catalog.create_product(Some(&self.staff), draft).await.unwrap().id()
    }

    async fn stock(&self, id: Uuid) -> u32 {
        self.store.product(id).await.unwrap().unwrap().stock()
    }

    async fn set_price(&self, id: Uuid, cents: i64) {
        let patch = ProductPatch { price: Some(money(cents)), ..Default::default() };
        self.services.catalog.patch_product(Some(&self.staff), id, patch).await.unwrap();
    }
}

#[tokio::test]
async fn test_cart_line_follows_price_and_stock() {
    let shop = shop();
    let user = customer();
    let widget = shop.product("Widget", 1000, 3).await;
    let carts = &shop.services.carts;

    let (item, created) = carts.add_or_update_item(&user, widget, qty(2)).await.unwrap();
    assert!(created);
    assert_eq!(item.total_price, money(2000));

    let item = carts.update_item(&user, item.id, qty(3)).await.unwrap();
    assert_eq!(item.total_price, money(3000));

    let err = carts.add_or_update_item(&user, widget, qty(4)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation { ref field, .. } if field == "quantity"));
    assert_eq!(carts.get_item(&user, item.id).await.unwrap().quantity, qty(3));

    // cart lines do not reserve stock
    assert_eq!(shop.stock(widget).await, 3);
}

#[tokio::test]
async fn test_cart_stock_boundary() {
    let shop = shop();
    let user = customer();
    let product = shop.product("Boundary", 100, 5).await;

    assert!(shop.services.carts.add_or_update_item(&user, product, qty(6)).await.is_err());
    assert!(shop.services.carts.list_items(&user).await.unwrap().is_empty());
    let (item, _) = shop.services.carts.add_or_update_item(&user, product, qty(5)).await.unwrap();
    assert_eq!(item.total_price, money(500));
}

#[tokio::test]
async fn test_adding_same_product_updates_the_line() {
    let shop = shop();
    let user = customer();
    let product = shop.product("Mug", 450, 10).await;
    let carts = &shop.services.carts;

    let (first, _) = carts.add_or_update_item(&user, product, qty(1)).await.unwrap();
    shop.set_price(product, 500).await;
    let (second, created) = carts.add_or_update_item(&user, product, qty(4)).await.unwrap();

    assert!(!created);
    assert_eq!(second.id, first.id);
    assert_eq!(second.total_price, money(2000));
    assert_eq!(carts.list_items(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cart_total_goes_stale_until_next_mutation() {
    let shop = shop();
    let user = customer();
    let product = shop.product("Kettle", 1000, 10).await;
    let (item, _) = shop.services.carts.add_or_update_item(&user, product, qty(2)).await.unwrap();

    shop.set_price(product, 1500).await;
    assert_eq!(shop.services.carts.get_item(&user, item.id).await.unwrap().total_price, money(2000));

    let item = shop.services.carts.update_item(&user, item.id, qty(2)).await.unwrap();
    assert_eq!(item.total_price, money(3000));
}

#[tokio::test]
async fn test_order_total_and_replacement() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let b = shop.product("B", 300, 10).await;
    let orders = &shop.services.orders;

    let order = orders.create_order(&user, vec![line(a, 2), line(b, 1)]).await.unwrap();
    assert_eq!(order.total_price(), money(1300));
    assert_eq!(order.items().len(), 2);
    assert!(order.items().iter().any(|i| i.product_id == a && i.price == money(500)));
    assert_eq!(shop.stock(a).await, 8);
    assert_eq!(shop.stock(b).await, 9);

    let old_items: Vec<Uuid> = order.items().iter().map(|i| i.id).collect();
    let update = OrderUpdate { items: Some(vec![line(a, 1)]), ..Default::default() };
    let order = orders.update_order(&user, order.id(), update).await.unwrap();
    assert_eq!(order.total_price(), money(500));
    assert_eq!(order.items().len(), 1);
    for id in old_items {
        assert!(matches!(orders.get_order_item(&user, id).await, Err(EcommerceError::NotFound(_))));
    }
    assert_eq!(shop.stock(a).await, 9);
    assert_eq!(shop.stock(b).await, 10);

    let stored = orders.get_order(&user, order.id()).await.unwrap();
    assert_eq!(stored.total_price(), money(500));
    assert_eq!(stored.items().len(), 1);
}

#[tokio::test]
async fn test_order_price_is_a_snapshot() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let orders = &shop.services.orders;

    let order = orders.create_order(&user, vec![line(a, 2)]).await.unwrap();
    shop.set_price(a, 900).await;

    // a status change alone keeps the old total
    let update = OrderUpdate { status: Some(OrderStatus::Paid), ..Default::default() };
    let paid = orders.update_order(&user, order.id(), update).await.unwrap();
    assert_eq!(paid.total_price(), money(1000));
    assert_eq!(orders.list_order_items(&user).await.unwrap()[0].price, money(500));
}

#[tokio::test]
async fn test_empty_orders_total_zero() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let orders = &shop.services.orders;

    let empty = orders.create_order(&user, vec![]).await.unwrap();
    assert_eq!(empty.total_price(), Money::ZERO);

    let order = orders.create_order(&user, vec![line(a, 3)]).await.unwrap();
    let update = OrderUpdate { items: Some(vec![]), ..Default::default() };
    let cleared = orders.update_order(&user, order.id(), update).await.unwrap();
    assert_eq!(cleared.total_price(), Money::ZERO);
    assert!(cleared.items().is_empty());
    assert_eq!(shop.stock(a).await, 10);
}

#[tokio::test]
async fn test_failed_create_persists_nothing() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let b = shop.product("B", 300, 1).await;
    let orders = &shop.services.orders;

    let err = orders.create_order(&user, vec![line(a, 2), line(Uuid::new_v4(), 1)]).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound("product")));

    let err = orders.create_order(&user, vec![line(a, 2), line(b, 2)]).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation { ref field, .. } if field == "items[1].quantity"));

    assert!(orders.list_orders(&user).await.unwrap().is_empty());
    assert!(orders.list_order_items(&user).await.unwrap().is_empty());
    assert_eq!(shop.stock(a).await, 10);
    assert_eq!(shop.stock(b).await, 1);
}

#[tokio::test]
async fn test_failed_replacement_keeps_old_items() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let orders = &shop.services.orders;

    let order = orders.create_order(&user, vec![line(a, 2)]).await.unwrap();
    let update = OrderUpdate { items: Some(vec![line(a, 1), line(Uuid::new_v4(), 1)]), ..Default::default() };
    assert!(orders.update_order(&user, order.id(), update).await.is_err());

    let update = OrderUpdate { items: Some(vec![line(a, 11)]), ..Default::default() };
    assert!(orders.update_order(&user, order.id(), update).await.is_err());

    let stored = orders.get_order(&user, order.id()).await.unwrap();
    assert_eq!(stored.items(), order.items());
    assert_eq!(stored.total_price(), money(1000));
    assert_eq!(shop.stock(a).await, 8);
}

#[tokio::test]
async fn test_replacement_can_reuse_released_stock() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 3).await;
    let orders = &shop.services.orders;

    let order = orders.create_order(&user, vec![line(a, 3)]).await.unwrap();
    assert_eq!(shop.stock(a).await, 0);
    let update = OrderUpdate { items: Some(vec![line(a, 2)]), ..Default::default() };
    orders.update_order(&user, order.id(), update).await.unwrap();
    assert_eq!(shop.stock(a).await, 1);
}

#[tokio::test]
async fn test_status_transitions_and_stock_release() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let orders = &shop.services.orders;
    let status = |s| OrderUpdate { status: Some(s), ..Default::default() };

    let order = orders.create_order(&user, vec![line(a, 4)]).await.unwrap();
    let err = orders.update_order(&user, order.id(), status(OrderStatus::Delivered)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation { ref field, .. } if field == "status"));

    orders.update_order(&user, order.id(), status(OrderStatus::Paid)).await.unwrap();
    let items = OrderUpdate { items: Some(vec![line(a, 1)]), ..Default::default() };
    assert!(orders.update_order(&user, order.id(), items).await.is_err());

    let cancelled = orders.update_order(&user, order.id(), status(OrderStatus::Cancelled)).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(shop.stock(a).await, 10);

    // deleting a cancelled order must not release twice
    orders.delete_order(&user, order.id()).await.unwrap();
    assert_eq!(shop.stock(a).await, 10);
}

#[tokio::test]
async fn test_delete_releases_unshipped_stock_only() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let orders = &shop.services.orders;
    let status = |s| OrderUpdate { status: Some(s), ..Default::default() };

    let pending = orders.create_order(&user, vec![line(a, 2)]).await.unwrap();
    orders.delete_order(&user, pending.id()).await.unwrap();
    assert_eq!(shop.stock(a).await, 10);
    assert!(matches!(orders.get_order(&user, pending.id()).await, Err(EcommerceError::NotFound("order"))));

    let shipped = orders.create_order(&user, vec![line(a, 3)]).await.unwrap();
    orders.update_order(&user, shipped.id(), status(OrderStatus::Paid)).await.unwrap();
    orders.update_order(&user, shipped.id(), status(OrderStatus::Shipped)).await.unwrap();
    orders.delete_order(&user, shipped.id()).await.unwrap();
    assert_eq!(shop.stock(a).await, 7);
}

#[tokio::test]
async fn test_checkout_snapshots_current_prices_and_empties_cart() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    let b = shop.product("B", 300, 10).await;
    let carts = &shop.services.carts;

    let err = shop.services.orders.checkout(&user).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation { ref field, .. } if field == "cart"));

    carts.add_or_update_item(&user, a, qty(2)).await.unwrap();
    carts.add_or_update_item(&user, b, qty(1)).await.unwrap();
    shop.set_price(a, 600).await;

    let order = shop.services.orders.checkout(&user).await.unwrap();
    assert_eq!(order.total_price(), money(1500));
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(carts.list_items(&user).await.unwrap().is_empty());
    assert_eq!(shop.stock(a).await, 8);
    assert_eq!(shop.stock(b).await, 9);
}

#[tokio::test]
async fn test_failed_checkout_keeps_cart() {
    let shop = shop();
    let user = customer();
    let other = customer();
    let a = shop.product("A", 500, 3).await;

    shop.services.carts.add_or_update_item(&user, a, qty(3)).await.unwrap();
    shop.services.orders.create_order(&other, vec![line(a, 2)]).await.unwrap();

    let err = shop.services.orders.checkout(&user).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation { .. }));
    assert_eq!(shop.services.carts.list_items(&user).await.unwrap().len(), 1);
    assert_eq!(shop.stock(a).await, 1);
}

#[tokio::test]
async fn test_rows_are_invisible_to_other_users() {
    let shop = shop();
    let alice = customer();
    let bob = customer();
    let a = shop.product("A", 500, 10).await;

    let (item, _) = shop.services.carts.add_or_update_item(&alice, a, qty(1)).await.unwrap();
    let order = shop.services.orders.create_order(&alice, vec![line(a, 1)]).await.unwrap();
    let order_item = order.items()[0].id;

    assert!(shop.services.carts.list_items(&bob).await.unwrap().is_empty());
    assert!(shop.services.orders.list_orders(&bob).await.unwrap().is_empty());
    assert!(shop.services.orders.list_order_items(&bob).await.unwrap().is_empty());

    let not_found = |r: Result<_, EcommerceError>| matches!(r, Err(EcommerceError::NotFound(_)));
    assert!(not_found(shop.services.carts.get_item(&bob, item.id).await.map(|_| ())));
    assert!(not_found(shop.services.carts.update_item(&bob, item.id, qty(1)).await.map(|_| ())));
    assert!(not_found(shop.services.carts.remove_item(&bob, item.id).await));
    assert!(not_found(shop.services.orders.get_order(&bob, order.id()).await.map(|_| ())));
    assert!(not_found(shop.services.orders.get_order_item(&bob, order_item).await.map(|_| ())));
    assert!(not_found(shop.services.orders.delete_order(&bob, order.id()).await));
    let cancel = OrderUpdate { status: Some(OrderStatus::Cancelled), ..Default::default() };
    assert!(not_found(shop.services.orders.update_order(&bob, order.id(), cancel).await.map(|_| ())));

    // privilege does not widen scope
    assert!(shop.services.orders.list_orders(&shop.staff).await.unwrap().is_empty());
    assert_eq!(shop.services.orders.list_orders(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_catalogue_writes_need_staff() {
    let shop = shop();
    let a = shop.product("A", 500, 10).await;
    let catalog = &shop.services.catalog;

    let patch = || ProductPatch { stock: Some(1), ..Default::default() };
    assert!(matches!(catalog.patch_product(None, a, patch()).await, Err(EcommerceError::Unauthenticated(_))));
    assert!(matches!(catalog.patch_product(Some(&customer()), a, patch()).await, Err(EcommerceError::Forbidden)));
    assert!(matches!(catalog.delete_product(Some(&customer()), a).await, Err(EcommerceError::Forbidden)));
    assert_eq!(shop.stock(a).await, 10);
}

#[tokio::test]
async fn test_archived_product_leaves_carts_and_catalogue() {
    let shop = shop();
    let user = customer();
    let a = shop.product("A", 500, 10).await;
    shop.services.carts.add_or_update_item(&user, a, qty(1)).await.unwrap();
    let order = shop.services.orders.create_order(&user, vec![line(a, 1)]).await.unwrap();

    shop.services.catalog.delete_product(Some(&shop.staff), a).await.unwrap();

    assert!(matches!(shop.services.catalog.get_product(a).await, Err(EcommerceError::NotFound("product"))));
    assert!(shop.services.carts.list_items(&user).await.unwrap().is_empty());
    assert!(matches!(
        shop.services.carts.add_or_update_item(&user, a, qty(1)).await,
        Err(EcommerceError::NotFound("product"))
    ));
    assert!(matches!(
        shop.services.orders.create_order(&user, vec![line(a, 1)]).await,
        Err(EcommerceError::NotFound("product"))
    ));
    // the snapshot survives
    let stored = shop.services.orders.get_order(&user, order.id()).await.unwrap();
    assert_eq!(stored.items()[0].price, money(500));
}
