//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Money, Quantity};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, price: Money, stock: u32 },
    Updated { product_id: Uuid, price: Money, stock: u32 },
    Archived { product_id: Uuid },
    StockReserved { product_id: Uuid, quantity: Quantity, remaining: u32 },
    StockReleased { product_id: Uuid, quantity: Quantity, remaining: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    ItemSaved { user_id: Uuid, item_id: Uuid, product_id: Uuid, quantity: Quantity, total_price: Money },
    ItemRemoved { user_id: Uuid, item_id: Uuid },
    CheckedOut { user_id: Uuid, order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Money },
    ItemsReplaced { order_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Deleted { order_id: Uuid },
}

impl DomainEvent {
    /// Message-bus subject suffix, e.g. `order.placed`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            DomainEvent::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Updated { .. } => "updated",
                ProductEvent::Archived { .. } => "archived",
                ProductEvent::StockReserved { .. } => "stock_reserved",
                ProductEvent::StockReleased { .. } => "stock_released",
            }),
            DomainEvent::Cart(e) => ("cart", match e {
                CartEvent::ItemSaved { .. } => "item_saved",
                CartEvent::ItemRemoved { .. } => "item_removed",
                CartEvent::CheckedOut { .. } => "checked_out",
            }),
            DomainEvent::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::ItemsReplaced { .. } => "items_replaced",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::Deleted { .. } => "deleted",
            }),
        };
        format!("{}.{}", aggregate, name)
    }
}
