use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::quantity;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::http::{
    extract::{CurrentPrincipal, ValidJson},
    AppState,
};
use crate::services::{OrderLine, OrderUpdate};
use crate::Result;

/// One submitted order line. Prices are never accepted from the client, so
/// any extra field (such as `price`) makes the body malformed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLineBody {
    pub product: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderBody {
    #[serde(default)]
    pub items: Vec<OrderLineBody>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderBody {
    pub status: Option<String>,
    pub items: Option<Vec<OrderLineBody>>,
}

fn order_lines(items: Vec<OrderLineBody>) -> Result<Vec<OrderLine>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            Ok(OrderLine { product_id: line.product, quantity: quantity(format!("items[{}].quantity", i), line.quantity)? })
        })
        .collect()
}

pub async fn list_orders(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.list_orders(&p).await?))
}

pub async fn get_order(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.services.orders.get_order(&p, id).await?))
}

pub async fn create_order(
    State(s): State<AppState>,
    CurrentPrincipal(p): CurrentPrincipal,
    ValidJson(body): ValidJson<CreateOrderBody>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = s.services.orders.create_order(&p, order_lines(body.items)?).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `items`, when present, replaces the whole item set.
pub async fn update_order(
    State(s): State<AppState>,
    CurrentPrincipal(p): CurrentPrincipal,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<UpdateOrderBody>,
) -> Result<Json<Order>> {
    let update = OrderUpdate {
        status: body.status.as_deref().map(str::parse::<OrderStatus>).transpose()?,
        items: body.items.map(order_lines).transpose()?,
    };
    Ok(Json(s.services.orders.update_order(&p, id, update).await?))
}

pub async fn delete_order(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services.orders.delete_order(&p, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn checkout(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal) -> Result<(StatusCode, Json<Order>)> {
    let order = s.services.orders.checkout(&p).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
