//! Order Aggregate
//!
//! An order owns its items. Each [`OrderItem`] snapshots the product price at
//! the moment it is created, and the order total is always the sum of
//! `price * quantity` over the current item set. Totals are only recomputed
//! when the item set is replaced as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, MoneyError, Quantity};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub(crate) id: Uuid,
    #[serde(rename = "user")]
    pub(crate) user_id: Uuid,
    pub(crate) order_date: DateTime<Utc>,
    pub(crate) status: OrderStatus,
    pub(crate) total_price: Money,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    #[serde(rename = "order")]
    pub order_id: Uuid,
    #[serde(rename = "product")]
    pub product_id: Uuid,
    pub quantity: Quantity,
    /// Unit price snapshotted from the product when the item was created.
    pub price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Pending, Paid, Shipped, Delivered, Cancelled }

/// Every allowed `(from, to)` status change. Anything else is rejected.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Paid),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Paid, OrderStatus::Shipped),
    (OrderStatus::Paid, OrderStatus::Cancelled),
    (OrderStatus::Shipped, OrderStatus::Delivered),
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Paid, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        TRANSITIONS.iter().any(|&(from, to)| from == *self && to == next)
    }

    /// Whether the items' stock is reserved but not yet shipped. Only such
    /// orders give stock back when cancelled or deleted.
    pub fn has_reserved_stock(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl OrderItem {
    /// Creates an item priced at the product's current price.
    pub fn snapshot(order_id: Uuid, product: &Product, quantity: Quantity) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), order_id, product_id: product.id(), quantity, price: product.price(), created_at: now, updated_at: now }
    }

    pub fn line_total(&self) -> Result<Money, MoneyError> { self.price.multiply(self.quantity) }
}

impl Order {
    /// Builds a pending order from `(product, quantity)` lines, snapshotting
    /// each product's price.
    pub fn place<'a>(user_id: Uuid, lines: impl IntoIterator<Item = (&'a Product, Quantity)>) -> Result<Self, OrderError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let items = lines.into_iter().map(|(product, qty)| OrderItem::snapshot(id, product, qty)).collect();
        let mut order = Self {
            id, user_id, order_date: now, status: OrderStatus::Pending, total_price: Money::ZERO,
            items, created_at: now, updated_at: now, events: vec![],
        };
        order.recalculate()?;
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id, total: order.total_price }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn order_date(&self) -> DateTime<Utc> { self.order_date }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn total_price(&self) -> Money { self.total_price }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Drops every existing item and snapshots a fresh set. Returns the
    /// removed items. Only pending orders can be edited.
    pub fn replace_items<'a>(&mut self, lines: impl IntoIterator<Item = (&'a Product, Quantity)>) -> Result<Vec<OrderItem>, OrderError> {
        if self.status != OrderStatus::Pending { return Err(OrderError::NotEditable(self.status)); }
        let fresh: Vec<OrderItem> = lines.into_iter().map(|(product, qty)| OrderItem::snapshot(self.id, product, qty)).collect();
        let total = total_of(&fresh)?;
        let removed = std::mem::replace(&mut self.items, fresh);
        self.total_price = total;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ItemsReplaced { order_id: self.id, total }));
        Ok(removed)
    }

    /// Moves to `next`. Returns `false` when the order already has that status.
    pub fn transition(&mut self, next: OrderStatus) -> Result<bool, OrderError> {
        if self.status == next { return Ok(false); }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = std::mem::replace(&mut self.status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(true)
    }

    pub fn has_reserved_stock(&self) -> bool { self.status.has_reserved_stock() }

    pub(crate) fn mark_deleted(&mut self) {
        self.raise_event(DomainEvent::Order(OrderEvent::Deleted { order_id: self.id }));
    }

    fn recalculate(&mut self) -> Result<(), OrderError> {
        self.total_price = total_of(&self.items)?;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn total_of(items: &[OrderItem]) -> Result<Money, OrderError> {
    let lines = items.iter().map(OrderItem::line_total).collect::<Result<Vec<_>, _>>().map_err(OrderError::Total)?;
    Money::sum(&lines).map_err(OrderError::Total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    NotEditable(OrderStatus),
    UnknownStatus(String),
    Total(MoneyError),
}
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => write!(f, "cannot move order from {} to {}", from, to),
            Self::NotEditable(status) => write!(f, "items of a {} order cannot be changed", status),
            Self::UnknownStatus(s) => write!(f, "unknown order status {:?}", s),
            Self::Total(e) => write!(f, "order total invalid: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::draft;

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }
    fn cents(c: i64) -> Money { Money::from_cents(c).unwrap() }

    #[test]
    fn test_order_total_from_snapshots() {
        let a = Product::create(draft("A", 500, 10)).unwrap();
        let b = Product::create(draft("B", 300, 10)).unwrap();
        let mut order = Order::place(Uuid::new_v4(), [(&a, qty(2)), (&b, qty(1))]).unwrap();
        assert_eq!(order.total_price(), cents(1300));
        assert_eq!(order.items()[0].price, cents(500));
        assert!(order.items().iter().all(|i| i.order_id == order.id()));
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn test_empty_order_totals_zero() {
        let order = Order::place(Uuid::new_v4(), std::iter::empty()).unwrap();
        assert_eq!(order.total_price(), Money::ZERO);
        assert!(order.items().is_empty());
    }

    #[test]
    fn test_replace_items() {
        let a = Product::create(draft("A", 500, 10)).unwrap();
        let b = Product::create(draft("B", 300, 10)).unwrap();
        let mut order = Order::place(Uuid::new_v4(), [(&a, qty(2)), (&b, qty(1))]).unwrap();
        let old_ids: Vec<Uuid> = order.items().iter().map(|i| i.id).collect();

        let removed = order.replace_items([(&a, qty(1))]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(order.total_price(), cents(500));
        assert_eq!(order.items().len(), 1);
        assert!(order.items().iter().all(|i| !old_ids.contains(&i.id)));
    }

    #[test]
    fn test_status_transitions() {
        let mut order = Order::place(Uuid::new_v4(), std::iter::empty()).unwrap();
        assert_eq!(order.transition(OrderStatus::Pending), Ok(false));
        assert_eq!(
            order.transition(OrderStatus::Delivered),
            Err(OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered })
        );
        assert_eq!(order.transition(OrderStatus::Paid), Ok(true));
        assert!(order.has_reserved_stock());
        assert_eq!(order.transition(OrderStatus::Shipped), Ok(true));
        assert!(!order.has_reserved_stock());
        assert_eq!(order.replace_items(std::iter::empty()), Err(OrderError::NotEditable(OrderStatus::Shipped)));
        assert!(order.transition(OrderStatus::Cancelled).is_err());
        assert_eq!(order.transition(OrderStatus::Delivered), Ok(true));
    }

    #[test]
    fn test_cancelled_releases_stock_and_is_terminal() {
        let mut order = Order::place(Uuid::new_v4(), std::iter::empty()).unwrap();
        order.transition(OrderStatus::Cancelled).unwrap();
        assert!(!order.has_reserved_stock());
        for next in OrderStatus::ALL.into_iter().filter(|s| *s != OrderStatus::Cancelled) {
            assert!(order.transition(next).is_err());
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("shipped?".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&OrderStatus::Paid).unwrap(), "\"Paid\"");
    }
}
