//! HTTP surface.

pub mod error;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

pub fn router(state: AppState) -> Router {
    use handlers::{accounts, cart, order_items, orders, products};

    let api = Router::new()
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/products", get(products::list_products).post(products::create_product))
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::replace_product)
                .patch(products::patch_product)
                .delete(products::delete_product),
        )
        .route("/cart", get(cart::list_items).post(cart::add_item))
        .route(
            "/cart/:id",
            get(cart::get_item).put(cart::update_item).patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:id",
            get(orders::get_order).put(orders::update_order).patch(orders::update_order).delete(orders::delete_order),
        )
        .route("/checkout", post(orders::checkout))
        .route("/order-items", get(order_items::list_order_items))
        .route("/order-items/:id", get(order_items::get_order_item));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
