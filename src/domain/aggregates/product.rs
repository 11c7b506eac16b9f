//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};
use crate::domain::events::{DomainEvent, ProductEvent};

pub const NAME_MAX_LEN: usize = 255;
pub const CATEGORY_MAX_LEN: usize = 50;

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) price: Money,
    pub(crate) stock: u32,
    pub(crate) category: String,
    pub(crate) image_url: Option<String>,
    pub(crate) status: ProductStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductStatus { #[default] Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::Archived => "archived" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s { "active" => Some(Self::Active), "archived" => Some(Self::Archived), _ => None }
    }
}

/// Validated input for a new product, or a full replacement.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub image_url: Option<String>,
}

/// Partial update; `None` leaves the field as is.
#[derive(Clone, Debug, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<u32>,
    pub category: Option<String>,
    pub image_url: Option<Option<String>>,
}

impl Product {
    pub fn create(draft: ProductDraft) -> Result<Self, ProductError> {
        check_name(&draft.name)?;
        check_category(&draft.category)?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, name: draft.name, description: draft.description, price: draft.price,
            stock: draft.stock, category: draft.category, image_url: draft.image_url,
            status: ProductStatus::Active, created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id, price: product.price, stock: product.stock }));
        Ok(product)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> Money { self.price }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn category(&self) -> &str { &self.category }
    pub fn image_url(&self) -> Option<&str> { self.image_url.as_deref() }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn replace(&mut self, draft: ProductDraft) -> Result<(), ProductError> {
        self.apply(ProductPatch {
            name: Some(draft.name),
            description: Some(draft.description),
            price: Some(draft.price),
            stock: Some(draft.stock),
            category: Some(draft.category),
            image_url: Some(draft.image_url),
        })
    }

    pub fn apply(&mut self, patch: ProductPatch) -> Result<(), ProductError> {
        if let Some(name) = &patch.name { check_name(name)?; }
        if let Some(category) = &patch.category { check_category(category)?; }
        if let Some(name) = patch.name { self.name = name; }
        if let Some(description) = patch.description { self.description = description; }
        if let Some(price) = patch.price { self.price = price; }
        if let Some(stock) = patch.stock { self.stock = stock; }
        if let Some(category) = patch.category { self.category = category; }
        if let Some(image_url) = patch.image_url { self.image_url = image_url; }
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Updated { product_id: self.id, price: self.price, stock: self.stock }));
        Ok(())
    }

    /// Soft delete. Archived products are invisible to catalogue reads.
    pub fn archive(&mut self) {
        if self.status == ProductStatus::Archived { return; }
        self.status = ProductStatus::Archived;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Archived { product_id: self.id }));
    }

    /// Checks a line quantity against the current stock without consuming it.
    pub fn ensure_available(&self, qty: Quantity) -> Result<(), ProductError> {
        if qty.value() > self.stock {
            return Err(ProductError::InsufficientStock { requested: qty.value(), available: self.stock });
        }
        Ok(())
    }

    pub fn reserve(&mut self, qty: Quantity) -> Result<(), ProductError> {
        self.ensure_available(qty)?;
        self.stock -= qty.value();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReserved { product_id: self.id, quantity: qty, remaining: self.stock }));
        Ok(())
    }

    pub fn release(&mut self, qty: Quantity) {
        self.stock = self.stock.saturating_add(qty.value());
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReleased { product_id: self.id, quantity: qty, remaining: self.stock }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn check_name(name: &str) -> Result<(), ProductError> {
    let len = name.trim().chars().count();
    if len == 0 || len > NAME_MAX_LEN { return Err(ProductError::InvalidName); }
    Ok(())
}

fn check_category(category: &str) -> Result<(), ProductError> {
    let len = category.trim().chars().count();
    if len == 0 || len > CATEGORY_MAX_LEN { return Err(ProductError::InvalidCategory); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { InvalidName, InvalidCategory, InsufficientStock { requested: u32, available: u32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name must be 1 to {} characters", NAME_MAX_LEN),
            Self::InvalidCategory => write!(f, "category must be 1 to {} characters", CATEGORY_MAX_LEN),
            Self::InsufficientStock { requested, available } => {
                write!(f, "not enough stock available (requested {}, available {})", requested, available)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn draft(name: &str, cents: i64, stock: u32) -> ProductDraft {
        ProductDraft {
            name: name.into(), description: String::new(), price: Money::from_cents(cents).unwrap(),
            stock, category: "general".into(), image_url: None,
        }
    }

    #[test]
    fn test_product_create() {
        let mut p = Product::create(draft("Test Product", 1999, 4)).unwrap();
        assert_eq!(p.name(), "Test Product");
        assert!(p.is_active());
        assert_eq!(p.take_events().len(), 1);
        assert!(Product::create(draft("  ", 100, 1)).is_err());
    }

    #[test]
    fn test_stock_reservation() {
        let mut p = Product::create(draft("P", 1000, 5)).unwrap();
        let five = Quantity::new(5).unwrap();
        let six = Quantity::new(6).unwrap();
        assert!(p.ensure_available(five).is_ok());
        assert_eq!(p.ensure_available(six), Err(ProductError::InsufficientStock { requested: 6, available: 5 }));
        p.reserve(five).unwrap();
        assert_eq!(p.stock(), 0);
        assert!(p.reserve(Quantity::new(1).unwrap()).is_err());
        p.release(five);
        assert_eq!(p.stock(), 5);
    }

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let mut p = Product::create(draft("P", 1000, 5)).unwrap();
        p.apply(ProductPatch { price: Some(Money::from_cents(1200).unwrap()), ..Default::default() }).unwrap();
        assert_eq!(p.price(), Money::from_cents(1200).unwrap());
        assert_eq!(p.stock(), 5);
        assert_eq!(p.name(), "P");
        assert_eq!(p.apply(ProductPatch { category: Some(String::new()), ..Default::default() }), Err(ProductError::InvalidCategory));
    }

    #[test]
    fn test_archive_is_idempotent() {
        let mut p = Product::create(draft("P", 1000, 5)).unwrap();
        p.take_events();
        p.archive();
        p.archive();
        assert!(!p.is_active());
        assert_eq!(p.take_events().len(), 1);
    }
}
