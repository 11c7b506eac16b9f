//! Domain model: aggregates, value objects and the events they raise.
pub mod aggregates;
pub mod events;
pub mod value_objects;

use crate::EcommerceError;
use aggregates::{CartError, OrderError, ProductError};
use value_objects::{MoneyError, QuantityError};

impl From<MoneyError> for EcommerceError {
    fn from(e: MoneyError) -> Self {
        EcommerceError::validation("price", e.to_string())
    }
}

impl From<QuantityError> for EcommerceError {
    fn from(e: QuantityError) -> Self {
        EcommerceError::validation("quantity", e.to_string())
    }
}

impl From<ProductError> for EcommerceError {
    fn from(e: ProductError) -> Self {
        let field = match e {
            ProductError::InvalidName => "name",
            ProductError::InvalidCategory => "category",
            ProductError::InsufficientStock { .. } => "quantity",
        };
        EcommerceError::validation(field, e.to_string())
    }
}

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::Stock(inner) => inner.into(),
            CartError::Price(_) => EcommerceError::validation("total_price", e.to_string()),
            CartError::ProductMismatch => EcommerceError::validation("product", e.to_string()),
        }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        let field = match e {
            OrderError::InvalidTransition { .. } | OrderError::UnknownStatus(_) => "status",
            OrderError::NotEditable(_) => "items",
            OrderError::Total(_) => "total_price",
        };
        EcommerceError::validation(field, e.to_string())
    }
}
