//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;

pub use product::{Product, ProductDraft, ProductError, ProductPatch, ProductStatus};
pub use order::{Order, OrderError, OrderItem, OrderStatus};
pub use cart::{CartError, CartItem};
pub use user::{AccessToken, User};
