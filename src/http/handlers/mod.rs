//! Route handlers and their request bodies.

pub mod accounts;
pub mod cart;
pub mod order_items;
pub mod orders;
pub mod products;

use serde::{Deserialize, Deserializer};

use crate::domain::value_objects::Quantity;
use crate::{EcommerceError, Result};

/// Validates a raw quantity, reporting failures against `field`.
pub(crate) fn quantity(field: impl Into<String>, raw: u32) -> Result<Quantity> {
    Quantity::new(raw).map_err(|e| EcommerceError::validation(field, e.to_string()))
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
