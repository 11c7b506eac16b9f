use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::domain::aggregates::OrderItem;
use crate::http::{extract::CurrentPrincipal, AppState};
use crate::Result;

pub async fn list_order_items(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal) -> Result<Json<Vec<OrderItem>>> {
    Ok(Json(s.services.orders.list_order_items(&p).await?))
}

pub async fn get_order_item(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<OrderItem>> {
    Ok(Json(s.services.orders.get_order_item(&p, id).await?))
}
