use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::double_option;
use crate::domain::aggregates::{Product, ProductDraft, ProductPatch};
use crate::domain::value_objects::Money;
use crate::http::{
    extract::{MaybePrincipal, ValidJson},
    AppState,
};
use crate::store::ProductQuery;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductBody {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
    #[validate(length(min = 1, max = 50, message = "must be 1 to 50 characters"))]
    pub category: String,
    #[validate(url(message = "must be a valid URL"))]
    pub image_url: Option<String>,
}

impl ProductBody {
    fn into_draft(self) -> Result<ProductDraft> {
        Ok(ProductDraft {
            name: self.name,
            description: self.description,
            price: Money::new(self.price)?,
            stock: self.stock,
            category: self.category,
            image_url: self.image_url,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductPatchBody {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<u32>,
    #[validate(length(min = 1, max = 50, message = "must be 1 to 50 characters"))]
    pub category: Option<String>,
    /// `null` clears the image.
    #[serde(default, deserialize_with = "double_option")]
    #[validate(url(message = "must be a valid URL"))]
    pub image_url: Option<Option<String>>,
}

impl ProductPatchBody {
    fn into_patch(self) -> Result<ProductPatch> {
        Ok(ProductPatch {
            name: self.name,
            description: self.description,
            price: self.price.map(Money::new).transpose()?,
            stock: self.stock,
            category: self.category,
            image_url: self.image_url,
        })
    }
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Product>>> {
    let query = ProductQuery::new(p.page, p.per_page, p.category, p.search);
    let page = s.services.catalog.list_products(&query).await?;
    Ok(Json(PaginatedResponse { data: page.items, total: page.total, page: query.page }))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.get_product(id).await?))
}

pub async fn create_product(
    State(s): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    ValidJson(body): ValidJson<ProductBody>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = s.services.catalog.create_product(principal.as_ref(), body.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn replace_product(
    State(s): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<ProductBody>,
) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.replace_product(principal.as_ref(), id, body.into_draft()?).await?))
}

pub async fn patch_product(
    State(s): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<ProductPatchBody>,
) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.patch_product(principal.as_ref(), id, body.into_patch()?).await?))
}

pub async fn delete_product(
    State(s): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    s.services.catalog.delete_product(principal.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
