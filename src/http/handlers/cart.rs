use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::quantity;
use crate::domain::aggregates::CartItem;
use crate::http::{
    extract::{CurrentPrincipal, ValidJson},
    AppState,
};
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct CartItemBody {
    pub product: Uuid,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CartQuantityBody {
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: u32,
}

pub async fn list_items(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal) -> Result<Json<Vec<CartItem>>> {
    Ok(Json(s.services.carts.list_items(&p).await?))
}

pub async fn get_item(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<CartItem>> {
    Ok(Json(s.services.carts.get_item(&p, id).await?))
}

/// Adds a product, or sets the quantity of the line already holding it.
pub async fn add_item(
    State(s): State<AppState>,
    CurrentPrincipal(p): CurrentPrincipal,
    ValidJson(body): ValidJson<CartItemBody>,
) -> Result<(StatusCode, Json<CartItem>)> {
    let qty = quantity("quantity", body.quantity)?;
    let (item, created) = s.services.carts.add_or_update_item(&p, body.product, qty).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(item)))
}

pub async fn update_item(
    State(s): State<AppState>,
    CurrentPrincipal(p): CurrentPrincipal,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<CartQuantityBody>,
) -> Result<Json<CartItem>> {
    let qty = quantity("quantity", body.quantity)?;
    Ok(Json(s.services.carts.update_item(&p, id, qty).await?))
}

pub async fn remove_item(State(s): State<AppState>, CurrentPrincipal(p): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services.carts.remove_item(&p, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
