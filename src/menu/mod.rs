//! Dish catalogue.

pub mod store;

pub use store::{Category, Dish, DishFilter, DishStore, NewDish, SpiceLevel};
