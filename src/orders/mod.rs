//! Dish orders.

pub mod store;

pub use store::{NewOrderItem, Order, OrderItem, OrderStatus, OrderStore, StatusUpdate};
