//! Dish reviews.

pub mod store;

pub use store::{CreateReview, NewReview, Review, ReviewStore};
